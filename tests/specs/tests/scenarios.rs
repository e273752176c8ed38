// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios: full service, mock readers and platform, mock
//! clock.

use std::sync::Arc;
use std::time::Duration;

use tapd::bus::{Broker, Method, Notification};
use tapd::config::Config;
use tapd::platform::StopIntent;
use tapd::test_support::MockReader;
use tapd_specs::{settle, Harness};

fn hold_config(delay_secs: f64) -> Config {
    Config { scan_mode: "hold".into(), exit_delay: delay_secs, ..Config::default() }
}

fn wall(y: i32) -> chrono::NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(y, 5, 20)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap_or_default()
}

// -- Scenario 1: hold-delayed exit cancelled by reinsert ----------------------

#[tokio::test]
async fn hold_delayed_exit_cancelled_by_reinsert() -> anyhow::Result<()> {
    let fx = Harness::start(hold_config(5.0))?;

    fx.scan("r1", "abc", "**launch:/roms/g.rom").await?;
    assert_eq!(fx.platform.launches().len(), 1);
    assert_eq!(fx.platform.launches()[0].path, "/roms/g.rom");

    fx.remove("r1").await?;
    fx.advance(Duration::from_secs(3)).await;

    fx.scan("r1", "abc", "**launch:/roms/g.rom").await?;
    fx.advance(Duration::from_secs(10)).await;

    assert!(fx.platform.stops().is_empty(), "reinsert must cancel the pending exit");

    fx.service.stop().await;
    Ok(())
}

// -- Scenario 2: hold-delayed with command-card reset -------------------------

#[tokio::test]
async fn hold_delayed_exit_rearmed_by_command_cards() -> anyhow::Result<()> {
    let fx = Harness::start(hold_config(5.0))?;

    fx.scan("r1", "game", "**launch:/roms/g.rom").await?;
    fx.remove("r1").await?;

    // t+4: a command-only card cancels and re-arms the timer.
    fx.advance(Duration::from_secs(4)).await;
    fx.scan("r1", "cmd1", "**input.keyboard:coin").await?;

    // t+8: another command card re-arms again.
    fx.advance(Duration::from_secs(4)).await;
    fx.scan("r1", "cmd2", "**input.keyboard:coin").await?;

    // t+12: past the original deadline but inside the re-armed window.
    fx.advance(Duration::from_secs(4)).await;
    assert!(fx.platform.stops().is_empty(), "re-armed timer must not have fired yet");

    // Just before the re-armed deadline the original game card returns; the
    // pending exit dies.
    fx.advance(Duration::from_millis(800)).await;
    fx.scan("r1", "game", "**launch:/roms/g.rom").await?;
    fx.advance(Duration::from_secs(10)).await;

    assert!(fx.platform.stops().is_empty());
    // The command cards actually executed.
    assert_eq!(fx.platform.key_presses(), vec!["coin".to_owned(), "coin".to_owned()]);

    fx.service.stop().await;
    Ok(())
}

// -- Scenario 3: reader-error removal survives replug -------------------------

#[tokio::test]
async fn reader_error_removal_survives_replug() -> anyhow::Result<()> {
    let fx = Harness::start(hold_config(0.0))?;

    fx.scan("r1", "tag-1", "**launch:/roms/g.rom").await?;
    assert_eq!(fx.platform.launches().len(), 1);
    let before = fx.drain_bus();
    assert_eq!(fx.count_method(&before, Method::TokensAdded), 1);

    fx.driver_error("r1").await?;

    assert!(fx.service.state().active_token().is_some(), "active card must survive");
    let during = fx.drain_bus();
    assert_eq!(fx.count_method(&during, Method::MediaStopped), 0);
    assert_eq!(fx.count_method(&during, Method::TokensRemoved), 0);
    assert!(fx.platform.stops().is_empty());

    // Replug re-scans the same tag: a duplicate, zero new notifications.
    fx.scan("r1", "tag-1", "**launch:/roms/g.rom").await?;
    assert!(fx.drain_bus().is_empty());
    assert_eq!(fx.platform.launches().len(), 1);

    fx.service.stop().await;
    Ok(())
}

// -- Scenario 4: daily limit with epoch clock ---------------------------------

#[tokio::test]
async fn daily_limit_with_epoch_clock() -> anyhow::Result<()> {
    let config = Config {
        daily_limit: 2 * 3600,
        session_limit: 3600,
        ..Config::default()
    };
    let fx = Harness::start_at(config, wall(1970))?;

    fx.scan("r1", "abc", "**launch:/roms/g.rom").await?;
    assert!(fx.service.limits().status().daily_remaining.is_none());

    // 65 minutes of play under a 60-minute session limit.
    fx.advance(Duration::from_secs(65 * 60)).await;

    let events = fx.drain_bus();
    let reached: Vec<&Notification> =
        events.iter().filter(|n| n.method == Method::LimitReached).collect();
    assert_eq!(reached.len(), 1);
    assert_eq!(
        reached[0].params.get("reason").and_then(|v| v.as_str()),
        Some("session"),
        "the epoch clock disables daily, so the session rule must trip"
    );
    assert_eq!(fx.platform.stops(), vec![StopIntent::Preemption]);
    assert!(fx.service.limits().status().daily_remaining.is_none());

    fx.service.stop().await;
    Ok(())
}

// -- Scenario 5: notification fan-out under backpressure ----------------------

#[tokio::test]
async fn notification_fanout_under_backpressure() -> anyhow::Result<()> {
    let broker = Broker::shared();
    let (slow_a, _) = broker.subscribe(1);
    let (slow_b, _) = broker.subscribe(1);
    let (healthy, _) = broker.subscribe(10);

    // Drain the healthy subscriber concurrently; the slow two stay blocked.
    let drainer = {
        let healthy = Arc::new(healthy);
        let healthy_for_task = Arc::clone(&healthy);
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while seen.len() < 50 {
                match healthy_for_task.recv().await {
                    Some(n) => seen.push(n),
                    None => break,
                }
            }
            seen
        })
    };

    let publish = async {
        for seq in 0..50u64 {
            let n = if seq % 2 == 0 {
                Notification::new(Method::TokensAdded, serde_json::json!({ "seq": seq }))
            } else {
                Notification::new(Method::MediaIndexing, serde_json::json!({ "seq": seq }))
            };
            broker.publish(n);
            tokio::task::yield_now().await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), publish)
        .await
        .map_err(|_| anyhow::anyhow!("publisher blocked on slow subscribers"))?;

    let seen = tokio::time::timeout(Duration::from_secs(5), drainer).await??;
    let seqs: Vec<u64> =
        seen.iter().filter_map(|n| n.params.get("seq").and_then(|v| v.as_u64())).collect();
    assert_eq!(seqs, (0..50).collect::<Vec<u64>>(), "healthy subscriber sees all 50 in order");

    // Slow subscribers kept the most recent critical item (48; 49 was lossy
    // and dropped against their full buffers).
    for slow in [&slow_a, &slow_b] {
        let survivor = slow.try_recv().ok_or_else(|| anyhow::anyhow!("empty slow queue"))?;
        assert_eq!(survivor.method, Method::TokensAdded);
        assert_eq!(survivor.params.get("seq").and_then(|v| v.as_u64()), Some(48));
    }
    Ok(())
}

// -- Scenario 6: auto-detect exclude format -----------------------------------

#[tokio::test]
async fn auto_detect_exclude_uses_driver_prefixed_paths() -> anyhow::Result<()> {
    let fx = Harness::start(Config::default())?;

    let log = MockReader::new("pn532").shared_log();
    let factory_log = log.clone();
    fx.platform.add_reader_factory(Arc::new(move || {
        Box::new(
            MockReader::new("pn532")
                .with_detect("pn532:/dev/ttyUSB0")
                .with_shared_log(&factory_log),
        )
    }));

    // First tick detects and connects; second tick runs another detect
    // cycle with the device live.
    fx.advance(Duration::from_millis(1100)).await;
    assert_eq!(fx.service.state().reader_count(), 1);
    fx.advance(Duration::from_millis(1100)).await;
    settle().await;

    let excludes = log.excludes_seen();
    assert!(excludes.len() >= 2);
    let last = excludes.last().cloned().unwrap_or_default();
    assert!(
        last.contains(&"pn532:/dev/ttyUSB0".to_owned()),
        "exclude list must carry the driver-prefixed form, got {last:?}"
    );
    // The bare path alone would bypass driver-side exclusion.
    assert!(!last.contains(&"/dev/ttyUSB0".to_owned()));

    fx.service.stop().await;
    Ok(())
}
