// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end scenario tests.
//!
//! Runs the full service in-process against the recording platform, the
//! in-memory repositories, and the mock clock, and feeds it scans the way
//! reader drivers would.

use std::sync::Arc;
use std::time::Duration;

use tapd::bus::{Method, Notification, Subscription};
use tapd::clock::{Clock, MockClock};
use tapd::config::Config;
use tapd::platform::SharedPlatform;
use tapd::reader::Scan;
use tapd::repo::{MediaRepo, MemoryMediaRepo, MemoryUserRepo, UserRepo};
use tapd::service::Service;
use tapd::test_support::{test_wall, MockPlatform};
use tapd::token::Token;

pub struct Harness {
    pub service: Service,
    pub platform: Arc<MockPlatform>,
    pub clock: MockClock,
    pub user_repo: Arc<MemoryUserRepo>,
    pub bus: Subscription,
}

impl Harness {
    /// Start the service pinned to a deterministic 2025 wall clock.
    pub fn start(config: Config) -> anyhow::Result<Self> {
        Self::start_at(config, test_wall())
    }

    /// Start the service with the wall clock pinned to `wall`.
    pub fn start_at(config: Config, wall: chrono::NaiveDateTime) -> anyhow::Result<Self> {
        let platform = MockPlatform::new();
        let clock = MockClock::pinned(wall);
        let user_repo = Arc::new(MemoryUserRepo::new());
        let service = Service::start(
            config,
            Arc::clone(&platform) as SharedPlatform,
            Arc::clone(&user_repo) as Arc<dyn UserRepo>,
            Arc::new(MemoryMediaRepo::new()) as Arc<dyn MediaRepo>,
            clock.shared(),
        )?;
        let (bus, _) = service.broker().subscribe(256);
        Ok(Self { service, platform, clock, user_repo, bus })
    }

    /// Push a token scan from reader `source`.
    pub async fn scan(&self, source: &str, uid: &str, text: &str) -> anyhow::Result<()> {
        let token = Token::from_reader(source, uid, text, self.clock.now());
        self.service.scan_sender().send(Scan::token(source, token)).await?;
        settle().await;
        Ok(())
    }

    /// Push a normal removal from reader `source`.
    pub async fn remove(&self, source: &str) -> anyhow::Result<()> {
        self.service.scan_sender().send(Scan::removal(source)).await?;
        settle().await;
        Ok(())
    }

    /// Push a driver-fault removal from reader `source`.
    pub async fn driver_error(&self, source: &str) -> anyhow::Result<()> {
        self.service.scan_sender().send(Scan::driver_error(source)).await?;
        settle().await;
        Ok(())
    }

    /// Advance the mock clock and let timers observe it.
    pub async fn advance(&self, dur: Duration) {
        self.clock.advance(dur);
        settle().await;
    }

    /// Drain every notification received so far.
    pub fn drain_bus(&self) -> Vec<Notification> {
        std::iter::from_fn(|| self.bus.try_recv()).collect()
    }

    /// Count drained notifications with the given method.
    pub fn count_method(&self, notifications: &[Notification], method: Method) -> usize {
        notifications.iter().filter(|n| n.method == method).count()
    }
}

/// Give spawned tasks a moment to observe channel sends and clock advances.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}
