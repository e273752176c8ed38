// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reader auto-detection.
//!
//! The detector owns two maps keyed by device path: `connected` (mirrors the
//! live reader map) and `failed`. A failed path is only retried after the
//! reader tick loop observes the unplug and clears it. Exclude lists handed
//! to drivers always use the `"driver:path"` form; every driver's `detect`
//! parses entries with that shape, so a plain path would bypass exclusion.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::Config;
use crate::platform::SharedPlatform;
use crate::state::{ReaderHandle, State};

use super::{ConnectionString, Scan};

/// Heartbeat interval for the auto-detect summary log.
const SUMMARY_HEARTBEAT: Duration = Duration::from_secs(30);

pub struct AutoDetector {
    clock: SharedClock,
    /// path -> driver id, for every live reader.
    connected: HashMap<String, String>,
    /// path -> driver id, for paths whose last open attempt failed.
    failed: HashMap<String, String>,
    last_summary: Option<(usize, usize)>,
    last_logged: Duration,
}

impl AutoDetector {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            connected: HashMap::new(),
            failed: HashMap::new(),
            last_summary: None,
            last_logged: Duration::ZERO,
        }
    }

    /// One detection pass over every driver the platform supports.
    /// Successful opens register the reader on `state` (which emits
    /// `readers.connected`); failures mark the path so it is not retried
    /// until cleared.
    pub async fn detect_readers(
        &mut self,
        platform: &SharedPlatform,
        config: &Config,
        state: &Arc<State>,
        scan_tx: &mpsc::Sender<Scan>,
    ) {
        for mut candidate in platform.supported_readers(config) {
            let meta = candidate.metadata();
            if !config.driver_enabled(&meta) || !config.driver_auto_detect(&meta) {
                continue;
            }

            let exclude = self.exclude_list();
            let Some(proposed) = candidate.detect(&exclude) else {
                continue;
            };
            let Some(conn) = ConnectionString::parse(&proposed) else {
                warn!(
                    driver = meta.id.as_str(),
                    proposed = proposed.as_str(),
                    "detect returned malformed connection string"
                );
                continue;
            };

            // Network-style drivers may propose an empty path; those go
            // through. A non-empty path already connected is a duplicate.
            if !conn.path.is_empty() && self.connected.contains_key(&conn.path) {
                let _ = candidate.close();
                continue;
            }

            let opened = candidate.open(&conn, scan_tx.clone());
            match opened {
                Ok(()) if candidate.connected() => {
                    let reader_id =
                        candidate.reader_id().unwrap_or_else(|| conn.to_string());
                    debug!(
                        driver = conn.driver.as_str(),
                        path = conn.path.as_str(),
                        reader_id = reader_id.as_str(),
                        "auto-detected reader"
                    );
                    let replaced = state.set_reader(ReaderHandle::new(
                        reader_id,
                        conn.clone(),
                        candidate,
                    ));
                    if let Some(old) = replaced {
                        let _ = old.driver.lock().await.close();
                    }
                    self.connected.insert(conn.path.clone(), conn.driver.clone());
                    self.failed.remove(&conn.path);
                }
                result => {
                    if let Err(e) = result {
                        debug!(
                            driver = conn.driver.as_str(),
                            path = conn.path.as_str(),
                            "auto-detect open failed: {e}"
                        );
                    }
                    let _ = candidate.close();
                    self.failed.insert(conn.path.clone(), conn.driver.clone());
                }
            }
        }

        self.log_summary();
    }

    /// Register a path opened outside detection (configured readers), so
    /// detect does not propose it again.
    pub fn note_connected(&mut self, conn: &ConnectionString) {
        self.connected.insert(conn.path.clone(), conn.driver.clone());
        self.failed.remove(&conn.path);
    }

    /// Forget a live path (reader removed). A replugged device may then be
    /// detected again.
    pub fn clear_path(&mut self, path: &str) {
        self.connected.remove(path);
    }

    /// Forget a failure mark.
    pub fn clear_failed_path(&mut self, path: &str) {
        self.failed.remove(path);
    }

    pub fn failed_paths(&self) -> Vec<String> {
        self.failed.keys().cloned().collect()
    }

    pub fn connected_paths(&self) -> Vec<String> {
        self.connected.keys().cloned().collect()
    }

    fn exclude_list(&self) -> Vec<String> {
        self.connected
            .iter()
            .chain(self.failed.iter())
            .map(|(path, driver)| format!("{driver}:{path}"))
            .collect()
    }

    /// One structured summary line when the counts change, or every 30 s as
    /// a heartbeat.
    fn log_summary(&mut self) {
        let summary = (self.connected.len(), self.failed.len());
        let now = self.clock.mono();
        let heartbeat_due = now.saturating_sub(self.last_logged) >= SUMMARY_HEARTBEAT;
        if self.last_summary != Some(summary) || heartbeat_due {
            info!(detected = summary.0, failed = summary.1, "auto-detect");
            self.last_summary = Some(summary);
            self.last_logged = now;
        }
    }
}

#[cfg(test)]
#[path = "detect_tests.rs"]
mod tests;
