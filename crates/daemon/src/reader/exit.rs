// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scan-mode exit handling.
//!
//! In tap mode removal does nothing. In hold mode removal stops the active
//! launcher, either immediately (`exit_delay == 0`) or after a one-shot
//! timer. While the timer is pending, a re-scan of any game card cancels it
//! and a command-only card cancels and re-arms it. The fired timer
//! re-validates the world before stopping anything: mode is still hold,
//! media is still running, a software token still owns it, and the media's
//! system is not on the ignore list.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::config::{Config, ScanMode};
use crate::platform::{SharedPlatform, StopIntent};
use crate::script::{has_media_command, ScriptEngine};
use crate::state::State;
use crate::token::Token;

pub struct ExitScheduler {
    config: Arc<Config>,
    platform: SharedPlatform,
    state: Arc<State>,
    clock: SharedClock,
    engine: Arc<ScriptEngine>,
    pending: Option<PendingExit>,
}

struct PendingExit {
    cancel: CancellationToken,
    /// The token whose removal armed the timer.
    removed: Token,
}

impl Drop for PendingExit {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl ExitScheduler {
    pub fn new(
        config: Arc<Config>,
        platform: SharedPlatform,
        state: Arc<State>,
        clock: SharedClock,
        engine: Arc<ScriptEngine>,
    ) -> Self {
        Self { config, platform, state, clock, engine, pending: None }
    }

    fn hold_mode(&self) -> bool {
        matches!(self.config.scan_mode_enum(), Ok(ScanMode::Hold))
    }

    /// A token arrived. Resolves any pending exit: game cards cancel it,
    /// command-only cards cancel and re-arm it. The scan proceeds to launch
    /// either way.
    pub fn on_new_token(&mut self, token: &Token) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if has_media_command(&token.text) {
            debug!(uid = token.uid.as_str(), "pending exit cancelled by game card");
            drop(pending);
        } else {
            debug!(uid = token.uid.as_str(), "pending exit re-armed by command card");
            let removed = pending.removed.clone();
            drop(pending);
            self.arm(removed);
        }
    }

    /// The active token was removed normally.
    pub async fn on_removal(&mut self, removed: Option<Token>) {
        if !self.hold_mode() {
            return;
        }
        let delay = self.config.exit_delay();
        if delay.is_zero() {
            stop_if_still_owed(&self.config, &self.platform, &self.state, &self.engine).await;
            return;
        }
        let Some(removed) = removed else {
            return;
        };
        self.arm(removed);
    }

    /// Drop any pending exit without stopping anything.
    pub fn cancel_pending(&mut self) {
        self.pending = None;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn arm(&mut self, removed: Token) {
        let cancel = CancellationToken::new();
        let delay = self.config.exit_delay();

        let config = Arc::clone(&self.config);
        let platform = Arc::clone(&self.platform);
        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);
        let engine = Arc::clone(&self.engine);
        let task_cancel = cancel.clone();
        let launch_ctx = self.state.launch_context();

        tokio::spawn(async move {
            tokio::select! {
                _ = task_cancel.cancelled() => return,
                // A newer launch supersedes this cleanup.
                _ = launch_ctx.cancelled() => return,
                _ = clock.sleep(delay) => {}
            }
            stop_if_still_owed(&config, &platform, &state, &engine).await;
        });

        self.pending = Some(PendingExit { cancel, removed });
    }
}

/// Re-validate and stop the active launcher. Shared by the immediate path
/// and the fired timer.
async fn stop_if_still_owed(
    config: &Arc<Config>,
    platform: &SharedPlatform,
    state: &Arc<State>,
    engine: &Arc<ScriptEngine>,
) {
    if !matches!(config.scan_mode_enum(), Ok(ScanMode::Hold)) {
        return;
    }
    let Some(media) = state.active_media() else {
        return;
    };
    if state.software_token().is_none() {
        // Media was started externally; removal does not own it.
        return;
    }
    if config.ignore_systems.iter().any(|s| s.eq_ignore_ascii_case(&media.system_id)) {
        debug!(system = media.system_id.as_str(), "system ignored, not stopping");
        return;
    }

    if let Some(hook) = config.before_exit_hooks.get(&media.system_id) {
        if let Err(e) = engine.run_hook(hook).await {
            warn!(system = media.system_id.as_str(), "before_exit hook failed: {e}");
        }
    }

    debug!(path = media.path.as_str(), "hold-mode exit stopping launcher");
    if let Err(e) = platform.stop_active_launcher(state, StopIntent::User) {
        warn!("stop launcher failed: {e}");
    }
}

#[cfg(test)]
#[path = "exit_tests.rs"]
mod tests;
