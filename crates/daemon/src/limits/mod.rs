// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Playtime limits engine.
//!
//! Owns the session state machine (`Reset` → `Active` → `Cooldown`),
//! accounts cumulative playtime across cooldown resumptions, evaluates the
//! configured rules once a minute while active, and enforces breaches by
//! stopping the launcher. Session durations are computed from monotonic
//! clock reads only; the wall clock is consulted for civil-day accounting
//! and its own reliability check.

pub mod daily;
pub mod rules;

pub use rules::{DailyLimitRule, LimitRule, RuleContext, RuleOutcome, SessionLimitRule};

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDateTime};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bus::{Method, Notification};
use crate::clock::{SharedClock, Ticker};
use crate::config::Config;
use crate::platform::{SharedPlatform, StopIntent};
use crate::repo::{MediaHistoryEntry, UserRepo};
use crate::state::State;

/// Limit evaluation cadence while a session is active.
const CHECK_PERIOD: Duration = Duration::from_secs(60);

/// The wall clock is trusted from this year on; hosts without an RTC boot
/// at the epoch.
const MIN_RELIABLE_YEAR: i32 = 2024;

/// Media-history page size when summing daily usage.
const HISTORY_PAGE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Reset,
    Active,
    Cooldown,
}

/// Params for `playtime.limit.reached`.
#[derive(Debug, Clone, Serialize)]
pub struct LimitReachedParams {
    pub reason: &'static str,
}

/// Params for `playtime.limit.warning`.
#[derive(Debug, Clone, Serialize)]
pub struct LimitWarningParams {
    pub interval_secs: u64,
    pub remaining_secs: u64,
}

/// Point-in-time view of the limits engine.
#[derive(Debug, Clone)]
pub struct LimitsStatus {
    pub phase: SessionPhase,
    pub session_elapsed: Duration,
    pub session_remaining: Option<Duration>,
    /// `None` iff no daily limit is configured or the clock is unreliable.
    pub daily_used: Option<Duration>,
    pub daily_remaining: Option<Duration>,
}

struct SessionTracker {
    phase: SessionPhase,
    start_wall: Option<NaiveDateTime>,
    start_mono: Option<Duration>,
    /// Whether the wall clock was trustworthy when this session began.
    /// Sticky across cooldown resumptions.
    started_reliable: bool,
    /// Playtime accumulated by earlier segments of this session.
    cumulative: Duration,
    last_stop_mono: Option<Duration>,
    cooldown_deadline: Option<Duration>,
    warnings_given: Vec<Duration>,
}

impl SessionTracker {
    fn reset(&mut self) {
        self.phase = SessionPhase::Reset;
        self.start_wall = None;
        self.start_mono = None;
        self.started_reliable = false;
        self.cumulative = Duration::ZERO;
        self.last_stop_mono = None;
        self.cooldown_deadline = None;
        self.warnings_given.clear();
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Reset,
            start_wall: None,
            start_mono: None,
            started_reliable: false,
            cumulative: Duration::ZERO,
            last_stop_mono: None,
            cooldown_deadline: None,
            warnings_given: Vec::new(),
        }
    }
}

fn wall_reliable(now: NaiveDateTime) -> bool {
    now.year() >= MIN_RELIABLE_YEAR
}

/// Limits engine. Cheap to clone; all clones share the tracker.
#[derive(Clone)]
pub struct LimitsManager {
    config: Arc<Config>,
    platform: SharedPlatform,
    state: Arc<State>,
    user_repo: Arc<dyn UserRepo>,
    clock: SharedClock,
    tracker: Arc<Mutex<SessionTracker>>,
}

impl LimitsManager {
    pub fn new(
        config: Arc<Config>,
        platform: SharedPlatform,
        state: Arc<State>,
        user_repo: Arc<dyn UserRepo>,
        clock: SharedClock,
    ) -> Self {
        Self {
            config,
            platform,
            state,
            user_repo,
            clock,
            tracker: Arc::new(Mutex::new(SessionTracker::default())),
        }
    }

    /// Run until the root context cancels: media events drive the session
    /// machine, a minute ticker checks limits, and the cooldown timer
    /// expires sessions back to reset.
    pub async fn run(self) {
        let cancel = self.state.cancellation();
        let (sub, _) = self.state.broker().subscribe(32);
        let mut check = Ticker::new(Arc::clone(&self.clock), CHECK_PERIOD);

        loop {
            let cooldown_deadline = self.tracker.lock().cooldown_deadline;
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
                _ = check.tick() => {
                    if self.phase() == SessionPhase::Active {
                        self.check_limits();
                    }
                }
                _ = async {
                    match cooldown_deadline {
                        Some(deadline) => self.clock.sleep_until(deadline).await,
                        None => std::future::pending().await,
                    }
                }, if cooldown_deadline.is_some() => {
                    self.on_cooldown_expired();
                }
            }
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.tracker.lock().phase
    }

    /// Media began. `Reset → Active` starts a fresh session; `Cooldown →
    /// Active` resumes the previous one with its cumulative time (and its
    /// original clock-reliability verdict).
    pub fn on_media_started(&self) {
        let now = self.clock.now();
        let mono = self.clock.mono();
        let mut tracker = self.tracker.lock();
        match tracker.phase {
            SessionPhase::Reset => {
                tracker.phase = SessionPhase::Active;
                tracker.start_wall = Some(now);
                tracker.start_mono = Some(mono);
                tracker.started_reliable = wall_reliable(now);
                tracker.cumulative = Duration::ZERO;
                tracker.warnings_given.clear();
                debug!(reliable = tracker.started_reliable, "playtime session started");
            }
            SessionPhase::Cooldown => {
                tracker.phase = SessionPhase::Active;
                tracker.start_wall = Some(now);
                tracker.start_mono = Some(mono);
                tracker.cooldown_deadline = None;
                debug!(
                    cumulative_secs = tracker.cumulative.as_secs(),
                    "playtime session resumed from cooldown"
                );
            }
            SessionPhase::Active => {}
        }
    }

    /// Media stopped. Accumulates the segment and enters cooldown so a
    /// quick restart resumes instead of resetting.
    pub fn on_media_stopped(&self) {
        let mono = self.clock.mono();
        let mut tracker = self.tracker.lock();
        if tracker.phase != SessionPhase::Active {
            return;
        }
        let segment = tracker
            .start_mono
            .map(|start| mono.saturating_sub(start))
            .unwrap_or(Duration::ZERO);
        tracker.cumulative += segment;
        self.enter_cooldown(&mut tracker, mono);
    }

    fn enter_cooldown(&self, tracker: &mut SessionTracker, mono: Duration) {
        if tracker.cumulative.is_zero() {
            tracker.reset();
            return;
        }
        tracker.phase = SessionPhase::Cooldown;
        tracker.start_mono = None;
        tracker.last_stop_mono = Some(mono);
        tracker.cooldown_deadline = Some(mono + self.config.session_reset_timeout());
    }

    fn on_cooldown_expired(&self) {
        let mut tracker = self.tracker.lock();
        if tracker.phase == SessionPhase::Cooldown {
            debug!("cooldown expired, session reset");
            tracker.reset();
        }
    }

    /// Force the machine back to reset (limits disabled mid-session).
    pub fn reset_session(&self) {
        self.tracker.lock().reset();
    }

    /// One evaluation pass: first disallow wins and preempts the media;
    /// otherwise fire any newly crossed warning thresholds.
    pub fn check_limits(&self) {
        let now = self.clock.now();
        let mono = self.clock.mono();

        let (session_duration, reliable) = {
            let tracker = self.tracker.lock();
            if tracker.phase != SessionPhase::Active {
                return;
            }
            let segment = tracker
                .start_mono
                .map(|start| mono.saturating_sub(start))
                .unwrap_or(Duration::ZERO);
            (
                tracker.cumulative + segment,
                tracker.started_reliable && wall_reliable(now),
            )
        };

        let daily_usage_today = if self.config.daily_limit().is_some() && reliable {
            self.daily_usage(now, mono)
        } else {
            Duration::ZERO
        };

        let ctx = RuleContext { session_duration, daily_usage_today, clock_reliable: reliable };

        let mut remainings = Vec::new();
        for rule in self.rules() {
            let outcome = rule.evaluate(&ctx);
            if !outcome.allowed {
                self.on_breach(outcome.reason, mono);
                return;
            }
            if let Some(remaining) = outcome.remaining {
                remainings.push(remaining);
            }
        }

        let Some(min_remaining) = remainings.iter().filter(|r| **r > Duration::ZERO).min() else {
            return;
        };

        let fired: Vec<Duration> = {
            let mut tracker = self.tracker.lock();
            let mut fired = Vec::new();
            for interval in self.config.limit_warnings() {
                if interval >= *min_remaining && !tracker.warnings_given.contains(&interval) {
                    tracker.warnings_given.push(interval);
                    fired.push(interval);
                }
            }
            fired
        };
        if fired.is_empty() {
            return;
        }

        if self.config.audio_feedback() {
            self.platform.play_audio("limit");
        }
        for interval in fired {
            info!(
                interval_secs = interval.as_secs(),
                remaining_secs = min_remaining.as_secs(),
                "playtime warning"
            );
            self.state.broker().publish(Notification::new(
                Method::LimitWarning,
                LimitWarningParams {
                    interval_secs: interval.as_secs(),
                    remaining_secs: min_remaining.as_secs(),
                },
            ));
        }
    }

    fn on_breach(&self, reason: &'static str, mono: Duration) {
        info!(reason, "playtime limit reached, stopping media");
        self.state
            .broker()
            .publish(Notification::new(Method::LimitReached, LimitReachedParams { reason }));
        if self.config.audio_feedback() {
            self.platform.play_audio("limit");
        }
        if let Err(e) = self.platform.stop_active_launcher(&self.state, StopIntent::Preemption) {
            warn!("limit preemption failed to stop launcher: {e}");
        }

        let mut tracker = self.tracker.lock();
        if tracker.phase == SessionPhase::Active {
            let segment = tracker
                .start_mono
                .map(|start| mono.saturating_sub(start))
                .unwrap_or(Duration::ZERO);
            tracker.cumulative += segment;
            self.enter_cooldown(&mut tracker, mono);
        }
    }

    /// Today's completed usage from history plus the running segment's
    /// contribution (clamped to the part since midnight).
    fn daily_usage(&self, now: NaiveDateTime, mono: Duration) -> Duration {
        let completed = daily::usage_today(&self.fetch_recent_history(now), now);

        let tracker = self.tracker.lock();
        let segment = match (tracker.phase, tracker.start_mono) {
            (SessionPhase::Active, Some(start)) => mono.saturating_sub(start),
            _ => Duration::ZERO,
        };
        drop(tracker);

        let since_midnight = now
            .date()
            .and_hms_opt(0, 0, 0)
            .map(|midnight| (now - midnight).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(Duration::ZERO);

        completed + segment.min(since_midnight)
    }

    /// Page history newest-first until rows predate today.
    fn fetch_recent_history(&self, now: NaiveDateTime) -> Vec<MediaHistoryEntry> {
        let Some(midnight) = now.date().and_hms_opt(0, 0, 0) else {
            return Vec::new();
        };
        let mut collected = Vec::new();
        let mut last_id = None;
        loop {
            let rows = match self.user_repo.media_history(last_id, HISTORY_PAGE) {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("daily usage query failed, degrading to zero: {e}");
                    return Vec::new();
                }
            };
            let Some(last) = rows.last() else {
                break;
            };
            last_id = Some(last.dbid);
            let exhausted = rows.len() < HISTORY_PAGE
                || rows.iter().any(|r| r.end_time.is_some_and(|end| end < midnight));
            collected.extend(rows);
            if exhausted {
                break;
            }
        }
        collected
    }

    fn rules(&self) -> Vec<Box<dyn LimitRule>> {
        vec![
            Box::new(SessionLimitRule {
                limit: self.config.session_limit().unwrap_or(Duration::ZERO),
            }),
            Box::new(DailyLimitRule {
                limit: self.config.daily_limit().unwrap_or(Duration::ZERO),
            }),
        ]
    }

    /// Snapshot for status surfaces. Daily fields are `None` iff no daily
    /// limit is configured or the clock is (or was, at session start)
    /// unreliable.
    pub fn status(&self) -> LimitsStatus {
        let now = self.clock.now();
        let mono = self.clock.mono();

        let (phase, session_elapsed, started_reliable) = {
            let tracker = self.tracker.lock();
            let elapsed = match tracker.phase {
                SessionPhase::Active => {
                    let segment = tracker
                        .start_mono
                        .map(|start| mono.saturating_sub(start))
                        .unwrap_or(Duration::ZERO);
                    tracker.cumulative + segment
                }
                SessionPhase::Cooldown => tracker.cumulative,
                SessionPhase::Reset => Duration::ZERO,
            };
            let started_reliable =
                tracker.phase == SessionPhase::Reset || tracker.started_reliable;
            (tracker.phase, elapsed, started_reliable)
        };

        let session_remaining =
            self.config.session_limit().map(|limit| limit.saturating_sub(session_elapsed));

        let daily_reliable = started_reliable && wall_reliable(now);
        let (daily_used, daily_remaining) = match self.config.daily_limit() {
            Some(limit) if daily_reliable => {
                let used = self.daily_usage(now, mono);
                (Some(used), Some(limit.saturating_sub(used)))
            }
            _ => (None, None),
        };

        LimitsStatus { phase, session_elapsed, session_remaining, daily_used, daily_remaining }
    }
}

#[cfg(test)]
#[path = "limits_tests.rs"]
mod tests;
