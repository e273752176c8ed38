// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reader lifecycle and scan intake.
//!
//! One select-loop owns the reader set: a 1 s tick prunes unplugged
//! readers, reconciles configured ones, and runs auto-detection; the scan
//! queue feeds the preprocessor and the scan-mode machine; the software
//! token channel tracks which token owns the running media. Display-capable
//! readers are told about media changes, never under the State lock, with
//! panicking callbacks contained.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::bus::{Method, Subscription};
use crate::clock::{SharedClock, Ticker};
use crate::config::Config;
use crate::platform::SharedPlatform;
use crate::script::ScriptEngine;
use crate::state::{ReaderHandle, State};
use crate::token::Token;

use super::detect::AutoDetector;
use super::exit::ExitScheduler;
use super::preprocess::{Preprocessor, ScanOutcome};
use super::{Capability, ConnectionString, Scan};

/// Reader reconciliation period.
const TICK_PERIOD: Duration = Duration::from_secs(1);

pub struct ReaderManager {
    config: Arc<Config>,
    platform: SharedPlatform,
    state: Arc<State>,
    clock: SharedClock,
    detector: AutoDetector,
    preprocessor: Preprocessor,
    exit: ExitScheduler,
    scan_rx: mpsc::Receiver<Scan>,
    scan_tx: mpsc::Sender<Scan>,
    itq_tx: mpsc::Sender<Token>,
    lsq_rx: mpsc::Receiver<Token>,
    media_sub: Subscription,
}

impl ReaderManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        platform: SharedPlatform,
        state: Arc<State>,
        clock: SharedClock,
        engine: Arc<ScriptEngine>,
        scan_rx: mpsc::Receiver<Scan>,
        scan_tx: mpsc::Sender<Scan>,
        itq_tx: mpsc::Sender<Token>,
        lsq_rx: mpsc::Receiver<Token>,
    ) -> Self {
        let (media_sub, _) = state.broker().subscribe(16);
        let exit = ExitScheduler::new(
            Arc::clone(&config),
            Arc::clone(&platform),
            Arc::clone(&state),
            Arc::clone(&clock),
            engine,
        );
        Self {
            detector: AutoDetector::new(Arc::clone(&clock)),
            preprocessor: Preprocessor::new(),
            exit,
            config,
            platform,
            state,
            clock,
            scan_rx,
            scan_tx,
            itq_tx,
            lsq_rx,
            media_sub,
        }
    }

    /// Run until the root context cancels. Closes every reader on the way
    /// out.
    pub async fn run(mut self) {
        let cancel = self.state.cancellation();
        let mut tick = Ticker::new(Arc::clone(&self.clock), TICK_PERIOD);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                scan = self.scan_rx.recv() => match scan {
                    Some(scan) => self.handle_scan(scan).await,
                    None => break,
                },
                token = self.lsq_rx.recv() => {
                    if let Some(token) = token {
                        self.state.set_software_token(Some(token));
                    }
                }
                notification = self.media_sub.recv() => {
                    if let Some(n) = notification {
                        if matches!(n.method, Method::MediaStarted | Method::MediaStopped) {
                            self.fan_out_media_change().await;
                        }
                    }
                }
                _ = tick.tick() => self.tick().await,
            }
        }

        self.exit.cancel_pending();
        self.close_all().await;
    }

    /// One reconciliation pass: prune, connect configured, auto-detect.
    pub async fn tick(&mut self) {
        self.prune_disconnected().await;
        self.connect_configured().await;
        if self.config.auto_detect() {
            self.detector
                .detect_readers(&self.platform, &self.config, &self.state, &self.scan_tx)
                .await;
        }
    }

    async fn prune_disconnected(&mut self) {
        for handle in self.state.reader_handles() {
            let connected = handle.driver.lock().await.connected();
            if connected {
                continue;
            }
            debug!(reader_id = handle.id.as_str(), "reader disconnected, removing");
            if let Some(removed) = self.state.remove_reader(&handle.id) {
                let _ = removed.driver.lock().await.close();
            }
            // Clearing both maps lets a replugged device reconnect.
            self.detector.clear_path(&handle.connection.path);
            self.detector.clear_failed_path(&handle.connection.path);
        }
    }

    async fn connect_configured(&mut self) {
        for raw in &self.config.readers {
            let Some(conn) = ConnectionString::parse(raw) else {
                continue;
            };
            let already_live = self
                .state
                .reader_handles()
                .iter()
                .any(|h| h.connection == conn);
            if already_live {
                continue;
            }

            let mut drivers = self.platform.supported_readers(&self.config);
            let candidate = drivers
                .iter()
                .position(|d| d.ids().contains(&conn.driver))
                .map(|i| drivers.swap_remove(i));
            let Some(mut candidate) = candidate else {
                warn!(driver = conn.driver.as_str(), "no driver for configured reader");
                continue;
            };

            match candidate.open(&conn, self.scan_tx.clone()) {
                Ok(()) if candidate.connected() => {
                    let reader_id = candidate.reader_id().unwrap_or_else(|| conn.to_string());
                    debug!(
                        reader_id = reader_id.as_str(),
                        connection = %conn,
                        "configured reader connected"
                    );
                    let replaced = self.state.set_reader(ReaderHandle::new(
                        reader_id,
                        conn.clone(),
                        candidate,
                    ));
                    if let Some(old) = replaced {
                        let _ = old.driver.lock().await.close();
                    }
                    self.detector.note_connected(&conn);
                }
                Ok(()) => {
                    let _ = candidate.close();
                    debug!(connection = %conn, "configured reader opened but not connected");
                }
                Err(e) => {
                    debug!(connection = %conn, "configured reader open failed: {e}");
                }
            }
        }
    }

    async fn handle_scan(&mut self, scan: Scan) {
        match self.preprocessor.process(&scan) {
            ScanOutcome::SkipDuplicate => {
                trace!(source = scan.source.as_str(), "duplicate scan dropped");
            }
            ScanOutcome::NewToken(token) => {
                if self.state.take_wrote_token_if_matches(&token) {
                    debug!(uid = token.uid.as_str(), "suppressing scan of just-written token");
                    return;
                }
                self.exit.on_new_token(&token);
                self.platform.scan_hook(&token);
                self.state.set_active_token(Some(token.clone()));
                if self.itq_tx.send(token).await.is_err() {
                    warn!("token queue closed, dropping scan");
                }
            }
            ScanOutcome::NormalRemoval => {
                let removed = self.state.active_token();
                self.state.set_active_token(None);
                self.exit.on_removal(removed).await;
            }
            ScanOutcome::ReaderErrorRemoval => {
                debug!(source = scan.source.as_str(), "driver-fault removal, state kept");
            }
        }
    }

    /// Push the current media to every connected Display-capable reader. A
    /// panicking driver callback is contained and logged.
    async fn fan_out_media_change(&self) {
        let media = self.state.active_media();
        for handle in self.state.reader_handles() {
            let mut driver = handle.driver.lock().await;
            if !driver.capabilities().contains(&Capability::Display) || !driver.connected() {
                continue;
            }
            let result = catch_unwind(AssertUnwindSafe(|| driver.on_media_change(media.as_ref())));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(reader_id = handle.id.as_str(), "media-change callback failed: {e}")
                }
                Err(_) => {
                    warn!(reader_id = handle.id.as_str(), "media-change callback panicked")
                }
            }
        }
    }

    async fn close_all(&mut self) {
        for handle in self.state.reader_handles() {
            if let Some(removed) = self.state.remove_reader(&handle.id) {
                let _ = removed.driver.lock().await.close();
            }
        }
    }
}

/// Write script text to the first connected writable reader and remember
/// the written token so its immediate re-scan does not auto-launch.
pub async fn write_token(state: &Arc<State>, text: &str) -> anyhow::Result<()> {
    for handle in state.reader_handles() {
        let mut driver = handle.driver.lock().await;
        if !driver.connected() || !driver.capabilities().contains(&Capability::Write) {
            continue;
        }
        let written = driver.write(text)?;
        drop(driver);
        state.set_wrote_token(Some(written));
        return Ok(());
    }
    anyhow::bail!("no connected writable reader")
}

/// Abort any in-progress tag write and forget the suppression token.
pub async fn cancel_write(state: &Arc<State>) {
    for handle in state.reader_handles() {
        let mut driver = handle.driver.lock().await;
        if driver.capabilities().contains(&Capability::Write) {
            driver.cancel_write();
        }
    }
    state.set_wrote_token(None);
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
