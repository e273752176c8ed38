// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Media history tracking.
//!
//! Subscribes to the notification bus and mirrors media sessions into the
//! user repository: one row per session, inserted on start with zero
//! playtime, extended once a minute while it runs, and closed on stop with
//! the monotonic elapsed seconds. Every write is skipped silently when no
//! row is open, so duplicate stops are harmless.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::bus::Method;
use crate::clock::{SharedClock, Ticker};
use crate::repo::{MediaHistoryEntry, UserRepo};
use crate::state::State;

/// Live-row extension cadence.
const EXTEND_PERIOD: Duration = Duration::from_secs(60);

pub struct HistoryTracker {
    state: Arc<State>,
    user_repo: Arc<dyn UserRepo>,
    clock: SharedClock,
    /// `(row id, monotonic start)` of the open session row.
    open: Option<(i64, Duration)>,
}

impl HistoryTracker {
    pub fn new(state: Arc<State>, user_repo: Arc<dyn UserRepo>, clock: SharedClock) -> Self {
        Self { state, user_repo, clock, open: None }
    }

    pub async fn run(mut self) {
        let cancel = self.state.cancellation();
        let (sub, _) = self.state.broker().subscribe(32);
        let mut extend = Ticker::new(Arc::clone(&self.clock), EXTEND_PERIOD);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                notification = sub.recv() => {
                    match notification {
                        None => break,
                        Some(n) => match n.method {
                            Method::MediaStarted => self.on_media_started(),
                            Method::MediaStopped => self.on_media_stopped(),
                            _ => {}
                        },
                    }
                }
                _ = extend.tick() => self.extend_open_row(),
            }
        }

        // Shutdown closes the live row so its playtime is not lost.
        self.on_media_stopped();
    }

    pub fn on_media_started(&mut self) {
        let Some(media) = self.state.active_media() else {
            debug!("media.started with no active media, skipping history row");
            return;
        };
        // A still-open row means the stop was lost; close it first.
        self.on_media_stopped();

        let entry = MediaHistoryEntry {
            dbid: 0,
            start_time: media.started,
            end_time: None,
            play_time_secs: 0,
            system_id: media.system_id,
            system_name: media.system_name,
            media_path: media.path,
            media_name: media.name,
            launcher_id: media.launcher_id,
        };
        match self.user_repo.add_media_history(&entry) {
            Ok(dbid) => self.open = Some((dbid, self.clock.mono())),
            Err(e) => warn!("media history insert failed: {e}"),
        }
    }

    pub fn on_media_stopped(&mut self) {
        let Some((dbid, start_mono)) = self.open.take() else {
            return;
        };
        let elapsed = self.clock.mono().saturating_sub(start_mono);
        if let Err(e) =
            self.user_repo.close_media_history(dbid, self.clock.now(), elapsed.as_secs() as i64)
        {
            warn!(dbid, "media history close failed: {e}");
        }
    }

    fn extend_open_row(&mut self) {
        let Some((dbid, start_mono)) = self.open else {
            return;
        };
        let elapsed = self.clock.mono().saturating_sub(start_mono);
        if let Err(e) = self.user_repo.update_media_history_time(dbid, elapsed.as_secs() as i64) {
            warn!(dbid, "media history extension failed: {e}");
        }
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
