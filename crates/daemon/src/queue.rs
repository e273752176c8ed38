// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token queue worker and playlist controller.
//!
//! One select-loop consumes preprocessed tokens (`itq`) and playlist events
//! (`plq`). Scripts run on their own task under the launch guard so a
//! long-running script never starves the queue; outcomes that change the
//! playlist loop back through `plq`, which is how script commands and the
//! controller re-enter each other without owning each other.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::config::Config;
use crate::platform::SharedPlatform;
use crate::playlist::Playlist;
use crate::script::{has_media_command, ScriptEngine};
use crate::state::State;
use crate::token::{Token, TokenSource};

/// A playlist update; `None` clears the active playlist.
pub type PlaylistEvent = Option<Playlist>;

/// Minimum gap between audible script-failure cues.
const FAIL_SOUND_GAP: Duration = Duration::from_secs(1);

pub struct TokenQueue {
    config: Arc<Config>,
    platform: SharedPlatform,
    state: Arc<State>,
    clock: SharedClock,
    engine: Arc<ScriptEngine>,
    itq_rx: mpsc::Receiver<Token>,
    plq_rx: mpsc::Receiver<PlaylistEvent>,
    plq_tx: mpsc::Sender<PlaylistEvent>,
    last_fail_sound: Arc<Mutex<Option<Duration>>>,
}

impl TokenQueue {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        platform: SharedPlatform,
        state: Arc<State>,
        clock: SharedClock,
        engine: Arc<ScriptEngine>,
        itq_rx: mpsc::Receiver<Token>,
        plq_rx: mpsc::Receiver<PlaylistEvent>,
        plq_tx: mpsc::Sender<PlaylistEvent>,
    ) -> Self {
        Self {
            config,
            platform,
            state,
            clock,
            engine,
            itq_rx,
            plq_rx,
            plq_tx,
            last_fail_sound: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn run(mut self) {
        let cancel = self.state.cancellation();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                token = self.itq_rx.recv() => match token {
                    Some(token) => self.handle_token(token),
                    None => break,
                },
                event = self.plq_rx.recv() => match event {
                    Some(event) => self.handle_playlist(event),
                    None => break,
                },
            }
        }
    }

    fn handle_token(&self, token: Token) {
        if token.scan_time.is_none() {
            // Empty-event sentinel.
            debug!("token without scan time ignored");
            return;
        }
        self.spawn_script(token, self.state.active_playlist());
    }

    /// Apply a playlist event per controller semantics: clear, set, no-op
    /// when the `(current, playing)` pair is unchanged, or replace.
    fn handle_playlist(&self, event: PlaylistEvent) {
        let Some(playlist) = event else {
            debug!("clearing active playlist");
            self.state.set_active_playlist(None);
            return;
        };

        if let Some(active) = self.state.active_playlist() {
            if active.same_update(&playlist) {
                return;
            }
        }
        self.state.set_active_playlist(Some(playlist.clone()));

        if playlist.playing {
            if let Some(item) = playlist.current() {
                let token =
                    Token::synthetic(TokenSource::Playlist, &item.script, self.clock.now());
                self.spawn_script(token, Some(playlist.clone()));
            }
        }
    }

    /// Run a token's script on its own task under the launch guard.
    fn spawn_script(&self, token: Token, playlist: Option<Playlist>) {
        let config = Arc::clone(&self.config);
        let platform = Arc::clone(&self.platform);
        let state = Arc::clone(&self.state);
        let clock = Arc::clone(&self.clock);
        let engine = Arc::clone(&self.engine);
        let plq_tx = self.plq_tx.clone();
        let last_fail = Arc::clone(&self.last_fail_sound);

        tokio::spawn(async move {
            let _guard = match state.try_start_launch() {
                Ok(guard) => guard,
                Err(e) => {
                    warn!(uid = token.uid.as_str(), "token dropped: {e}");
                    return;
                }
            };
            // Only a media launch supersedes earlier launches' cleanup;
            // command-only scripts leave pending exit timers alone.
            if has_media_command(&token.text) {
                state.new_launch_context();
            }

            match engine.run_token(&token, playlist).await {
                Ok(outcome) => {
                    if outcome.playlist_changed {
                        let _ = plq_tx.send(outcome.playlist).await;
                    }
                }
                Err(e) => {
                    warn!(uid = token.uid.as_str(), "script failed: {e:#}");
                    if config.audio_feedback() {
                        let now = clock.mono();
                        let mut last = last_fail.lock();
                        let due = last
                            .map_or(true, |t| now.saturating_sub(t) >= FAIL_SOUND_GAP);
                        if due {
                            *last = Some(now);
                            drop(last);
                            platform.play_audio("fail");
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
