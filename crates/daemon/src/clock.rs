// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Injectable wall/monotonic clock.
//!
//! Every timer in the daemon (exit delay, limits check, cooldown, history
//! extension, the reader tick loop) goes through [`Clock`] so tests can drive
//! time deterministically with [`MockClock::advance`]. The monotonic reading
//! is an offset from an arbitrary process-local origin and is immune to
//! wall-clock jumps; the wall reading is civil local time.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use tokio::sync::Notify;

pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Wall + monotonic time source with mockable sleeping.
pub trait Clock: Send + Sync + 'static {
    /// Current civil local time.
    fn now(&self) -> NaiveDateTime;

    /// Monotonic offset from an arbitrary fixed origin.
    fn mono(&self) -> Duration;

    /// Sleep for `dur` of monotonic time.
    fn sleep(&self, dur: Duration) -> SleepFuture;

    /// Sleep until the monotonic offset reaches `deadline`.
    fn sleep_until(&self, deadline: Duration) -> SleepFuture;
}

pub type SharedClock = Arc<dyn Clock>;

/// Fixed-period ticker over a [`Clock`]. Missed periods are skipped rather
/// than bursted, matching `tokio::time::MissedTickBehavior::Skip`.
pub struct Ticker {
    clock: SharedClock,
    period: Duration,
    next: Duration,
}

impl Ticker {
    pub fn new(clock: SharedClock, period: Duration) -> Self {
        let next = clock.mono() + period;
        Self { clock, period, next }
    }

    /// Wait for the next period boundary.
    pub async fn tick(&mut self) {
        self.clock.sleep_until(self.next).await;
        let now = self.clock.mono();
        self.next += self.period;
        if self.next <= now {
            self.next = now + self.period;
        }
    }
}

// -- System clock -------------------------------------------------------------

/// Production clock: `Instant` for monotonic time, `chrono::Local` for wall.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }

    fn mono(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, dur: Duration) -> SleepFuture {
        Box::pin(tokio::time::sleep(dur))
    }

    fn sleep_until(&self, deadline: Duration) -> SleepFuture {
        let remaining = deadline.saturating_sub(self.mono());
        Box::pin(tokio::time::sleep(remaining))
    }
}

// -- Mock clock ---------------------------------------------------------------

struct MockInner {
    wall: NaiveDateTime,
    mono: Duration,
}

/// Test clock. Time only moves when [`MockClock::advance`] is called; both
/// readings move together. Sleepers are woken on every advance and re-check
/// their deadline, so partial advances work.
#[derive(Clone)]
pub struct MockClock {
    inner: Arc<Mutex<MockInner>>,
    changed: Arc<Notify>,
}

impl MockClock {
    /// New mock clock pinned to the given wall time, monotonic origin zero.
    pub fn pinned(wall: NaiveDateTime) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockInner { wall, mono: Duration::ZERO })),
            changed: Arc::new(Notify::new()),
        }
    }

    /// Advance both wall and monotonic time by `dur` and wake sleepers.
    pub fn advance(&self, dur: Duration) {
        {
            let mut inner = self.inner.lock();
            inner.mono += dur;
            inner.wall += chrono::Duration::from_std(dur).unwrap_or_else(|_| chrono::Duration::zero());
        }
        self.changed.notify_waiters();
    }

    /// Jump the wall clock without touching the monotonic reading (NTP sync,
    /// manual time change). Sleepers are unaffected.
    pub fn set_wall(&self, wall: NaiveDateTime) {
        self.inner.lock().wall = wall;
    }

    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl Clock for MockClock {
    fn now(&self) -> NaiveDateTime {
        self.inner.lock().wall
    }

    fn mono(&self) -> Duration {
        self.inner.lock().mono
    }

    fn sleep(&self, dur: Duration) -> SleepFuture {
        self.sleep_until(self.mono() + dur)
    }

    fn sleep_until(&self, deadline: Duration) -> SleepFuture {
        let inner = Arc::clone(&self.inner);
        let changed = Arc::clone(&self.changed);
        Box::pin(async move {
            loop {
                // Register interest before the deadline check so an advance
                // between check and await cannot be missed.
                let notified = changed.notified();
                if inner.lock().mono >= deadline {
                    return;
                }
                notified.await;
            }
        })
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
