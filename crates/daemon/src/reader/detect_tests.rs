// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio::sync::mpsc;

use super::AutoDetector;
use crate::bus::Broker;
use crate::clock::MockClock;
use crate::config::{Config, DriverOverride};
use crate::platform::SharedPlatform;
use crate::reader::ConnectionString;
use crate::state::State;
use crate::test_support::{test_wall, MockPlatform, MockReader, MockReaderLog};

struct Fixture {
    platform: Arc<MockPlatform>,
    state: Arc<State>,
    detector: AutoDetector,
    config: Config,
    scan_tx: mpsc::Sender<crate::reader::Scan>,
}

fn fixture() -> Fixture {
    let clock = MockClock::pinned(test_wall());
    let (scan_tx, _scan_rx) = mpsc::channel(16);
    Fixture {
        platform: MockPlatform::new(),
        state: State::new(Broker::shared()),
        detector: AutoDetector::new(clock.shared()),
        config: Config::default(),
        scan_tx,
    }
}

fn shared(platform: &Arc<MockPlatform>) -> SharedPlatform {
    Arc::clone(platform) as SharedPlatform
}

fn add_detectable(platform: &Arc<MockPlatform>, driver: &str, conn: &str) -> MockReaderLog {
    let log = MockReader::new(driver).shared_log();
    let driver = driver.to_owned();
    let conn = conn.to_owned();
    let log_for_factory = log.clone();
    platform.add_reader_factory(Arc::new(move || {
        // Share one log across instances so the test sees every exclude.
        Box::new(
            MockReader::new(&driver)
                .with_detect(&conn)
                .with_shared_log(&log_for_factory),
        )
    }));
    log
}

#[tokio::test]
async fn successful_detect_registers_reader() {
    let mut fx = fixture();
    add_detectable(&fx.platform, "pn532", "pn532:/dev/ttyUSB0");

    let platform = shared(&fx.platform);
    fx.detector.detect_readers(&platform, &fx.config, &fx.state, &fx.scan_tx).await;

    assert_eq!(fx.state.reader_count(), 1);
    assert_eq!(fx.detector.connected_paths(), vec!["/dev/ttyUSB0".to_owned()]);
    assert!(fx.detector.failed_paths().is_empty());
}

#[tokio::test]
async fn exclude_list_uses_driver_prefixed_form() {
    let mut fx = fixture();
    let log = add_detectable(&fx.platform, "pn532", "pn532:/dev/ttyUSB0");

    let platform = shared(&fx.platform);
    fx.detector.detect_readers(&platform, &fx.config, &fx.state, &fx.scan_tx).await;
    fx.detector.detect_readers(&platform, &fx.config, &fx.state, &fx.scan_tx).await;

    let excludes = log.excludes_seen();
    assert_eq!(excludes.len(), 2);
    assert!(excludes[0].is_empty());
    // The second pass must exclude the now-live device in driver:path form.
    assert_eq!(excludes[1], vec!["pn532:/dev/ttyUSB0".to_owned()]);
    // Still exactly one registered reader.
    assert_eq!(fx.state.reader_count(), 1);
}

#[tokio::test]
async fn failed_open_marks_path_until_cleared() {
    let mut fx = fixture();
    fx.platform.add_reader_factory(Arc::new(|| {
        Box::new(MockReader::new("pn532").with_detect("pn532:/dev/ttyACM1").with_fail_open())
    }));

    let platform = shared(&fx.platform);
    fx.detector.detect_readers(&platform, &fx.config, &fx.state, &fx.scan_tx).await;

    assert_eq!(fx.state.reader_count(), 0);
    assert_eq!(fx.detector.failed_paths(), vec!["/dev/ttyACM1".to_owned()]);

    // The failure mark itself excludes the path from the next pass; the
    // driver sees it in driver:path form and proposes nothing.
    fx.detector.detect_readers(&platform, &fx.config, &fx.state, &fx.scan_tx).await;
    assert_eq!(fx.state.reader_count(), 0);

    fx.detector.clear_failed_path("/dev/ttyACM1");
    assert!(fx.detector.failed_paths().is_empty());
}

#[tokio::test]
async fn cleared_paths_allow_replug() {
    let mut fx = fixture();
    add_detectable(&fx.platform, "pn532", "pn532:/dev/ttyUSB0");

    let platform = shared(&fx.platform);
    fx.detector.detect_readers(&platform, &fx.config, &fx.state, &fx.scan_tx).await;
    assert_eq!(fx.state.reader_count(), 1);

    // Unplug: the manager removes the reader and clears both maps.
    fx.state.remove_reader(
        &fx.state.reader_handles().first().map(|h| h.id.clone()).unwrap_or_default(),
    );
    fx.detector.clear_path("/dev/ttyUSB0");
    fx.detector.clear_failed_path("/dev/ttyUSB0");
    assert!(fx.detector.failed_paths().is_empty());

    fx.detector.detect_readers(&platform, &fx.config, &fx.state, &fx.scan_tx).await;
    assert_eq!(fx.state.reader_count(), 1);
}

#[tokio::test]
async fn disabled_driver_skipped() {
    let mut fx = fixture();
    add_detectable(&fx.platform, "pn532", "pn532:/dev/ttyUSB0");
    fx.config.driver_overrides.insert(
        "pn532".into(),
        DriverOverride { enabled: Some(false), auto_detect: None },
    );

    let platform = shared(&fx.platform);
    fx.detector.detect_readers(&platform, &fx.config, &fx.state, &fx.scan_tx).await;
    assert_eq!(fx.state.reader_count(), 0);
}

#[tokio::test]
async fn auto_detect_opt_out_skipped() {
    let mut fx = fixture();
    fx.platform.add_reader_factory(Arc::new(|| {
        Box::new(
            MockReader::new("barcode")
                .with_detect("barcode:/dev/hidraw0")
                .without_auto_detect(),
        )
    }));

    let platform = shared(&fx.platform);
    fx.detector.detect_readers(&platform, &fx.config, &fx.state, &fx.scan_tx).await;
    assert_eq!(fx.state.reader_count(), 0);
}

#[tokio::test]
async fn malformed_detect_result_ignored() {
    let mut fx = fixture();
    fx.platform.add_reader_factory(Arc::new(|| {
        Box::new(MockReader::new("pn532").with_detect("/dev/ttyUSB0"))
    }));

    let platform = shared(&fx.platform);
    fx.detector.detect_readers(&platform, &fx.config, &fx.state, &fx.scan_tx).await;
    assert_eq!(fx.state.reader_count(), 0);
    assert!(fx.detector.failed_paths().is_empty());
}

#[tokio::test]
async fn note_connected_excludes_configured_readers() {
    let mut fx = fixture();
    let log = add_detectable(&fx.platform, "pn532", "pn532:/dev/ttyUSB0");
    fx.detector.note_connected(&ConnectionString::new("pn532", "/dev/ttyUSB0"));

    let platform = shared(&fx.platform);
    fx.detector.detect_readers(&platform, &fx.config, &fx.state, &fx.scan_tx).await;

    assert_eq!(fx.state.reader_count(), 0);
    assert_eq!(log.excludes_seen()[0], vec!["pn532:/dev/ttyUSB0".to_owned()]);
}
