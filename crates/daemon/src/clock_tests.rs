// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use chrono::NaiveDate;

use super::{Clock, MockClock, Ticker};

fn wall(y: i32, mo: u32, d: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap_or_default()
}

#[test]
fn advance_moves_wall_and_mono_together() {
    let clock = MockClock::pinned(wall(2025, 3, 1));
    clock.advance(Duration::from_secs(90));
    assert_eq!(clock.mono(), Duration::from_secs(90));
    assert_eq!(clock.now(), wall(2025, 3, 1) + chrono::Duration::seconds(90));
}

#[test]
fn set_wall_leaves_mono_untouched() {
    let clock = MockClock::pinned(wall(1970, 1, 1));
    clock.advance(Duration::from_secs(10));
    clock.set_wall(wall(2026, 6, 15));
    assert_eq!(clock.mono(), Duration::from_secs(10));
    assert_eq!(clock.now(), wall(2026, 6, 15));
}

#[tokio::test]
async fn sleep_completes_on_advance() -> anyhow::Result<()> {
    let clock = MockClock::pinned(wall(2025, 3, 1));
    let handle = tokio::spawn(clock.sleep(Duration::from_secs(5)));

    clock.advance(Duration::from_secs(2));
    tokio::task::yield_now().await;
    assert!(!handle.is_finished());

    clock.advance(Duration::from_secs(3));
    tokio::time::timeout(Duration::from_secs(1), handle).await??;
    Ok(())
}

#[tokio::test]
async fn sleep_until_past_deadline_returns_immediately() -> anyhow::Result<()> {
    let clock = MockClock::pinned(wall(2025, 3, 1));
    clock.advance(Duration::from_secs(10));
    tokio::time::timeout(Duration::from_secs(1), clock.sleep_until(Duration::from_secs(5)))
        .await?;
    Ok(())
}

#[tokio::test]
async fn ticker_skips_missed_periods() -> anyhow::Result<()> {
    let clock = MockClock::pinned(wall(2025, 3, 1));
    let mut ticker = Ticker::new(clock.shared(), Duration::from_secs(60));

    // Jump past several periods; one tick fires and the next deadline is
    // re-anchored instead of bursting.
    clock.advance(Duration::from_secs(305));
    tokio::time::timeout(Duration::from_secs(1), ticker.tick()).await?;

    let pending = tokio::time::timeout(Duration::from_millis(50), ticker.tick()).await;
    assert!(pending.is_err(), "second tick fired without an advance");
    Ok(())
}
