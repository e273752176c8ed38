// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon wiring — shared by `main` and the end-to-end scenario tests.
//!
//! `Service::start` builds the channels, spawns the long-lived tasks
//! (reader manager, token queue, limits engine, history tracker,
//! maintenance), and hands back the senders external surfaces feed.
//! Shutdown is one root-context cancel followed by a drain.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bus::{Broker, Method, Notification};
use crate::clock::{SharedClock, Ticker};
use crate::config::Config;
use crate::history::HistoryTracker;
use crate::inbox::Inbox;
use crate::limits::LimitsManager;
use crate::platform::SharedPlatform;
use crate::queue::{PlaylistEvent, TokenQueue};
use crate::reader::{manager, ReaderManager, Scan};
use crate::repo::{IndexingStatus, MediaRepo, UserRepo};
use crate::script::ScriptEngine;
use crate::state::State;
use crate::token::Token;

/// Remote-link hosts idle past this are pruned.
const REMOTE_HOST_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Maintenance cadence.
const MAINTENANCE_PERIOD: Duration = Duration::from_secs(3600);

pub struct Service {
    config: Arc<Config>,
    state: Arc<State>,
    limits: LimitsManager,
    inbox: Inbox,
    media_repo: Arc<dyn MediaRepo>,
    scan_tx: mpsc::Sender<Scan>,
    itq_tx: mpsc::Sender<Token>,
    plq_tx: mpsc::Sender<PlaylistEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl Service {
    /// Validate the config, wire the runtime, and spawn every long-lived
    /// task. Must be called from within a tokio runtime.
    pub fn start(
        config: Config,
        platform: SharedPlatform,
        user_repo: Arc<dyn UserRepo>,
        media_repo: Arc<dyn MediaRepo>,
        clock: SharedClock,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let broker = Broker::shared();
        let state = State::new(Arc::clone(&broker));

        let (scan_tx, scan_rx) = mpsc::channel::<Scan>(64);
        let (itq_tx, itq_rx) = mpsc::channel::<Token>(32);
        let (lsq_tx, lsq_rx) = mpsc::channel::<Token>(32);
        let (plq_tx, plq_rx) = mpsc::channel::<PlaylistEvent>(32);

        let engine = Arc::new(ScriptEngine::new(
            Arc::clone(&config),
            Arc::clone(&platform),
            Arc::clone(&state),
            Arc::clone(&user_repo),
            Arc::clone(&clock),
            lsq_tx,
        ));

        let reader_manager = ReaderManager::new(
            Arc::clone(&config),
            Arc::clone(&platform),
            Arc::clone(&state),
            Arc::clone(&clock),
            Arc::clone(&engine),
            scan_rx,
            scan_tx.clone(),
            itq_tx.clone(),
            lsq_rx,
        );

        let queue = TokenQueue::new(
            Arc::clone(&config),
            Arc::clone(&platform),
            Arc::clone(&state),
            Arc::clone(&clock),
            engine,
            itq_rx,
            plq_rx,
            plq_tx.clone(),
        );

        let limits = LimitsManager::new(
            Arc::clone(&config),
            Arc::clone(&platform),
            Arc::clone(&state),
            Arc::clone(&user_repo),
            Arc::clone(&clock),
        );

        let history = HistoryTracker::new(
            Arc::clone(&state),
            Arc::clone(&user_repo),
            Arc::clone(&clock),
        );

        let inbox = Inbox::new(Arc::clone(&user_repo), broker);

        let tasks = vec![
            tokio::spawn(reader_manager.run()),
            tokio::spawn(queue.run()),
            tokio::spawn(limits.clone().run()),
            tokio::spawn(history.run()),
            tokio::spawn(maintenance_loop(
                Arc::clone(&state),
                Arc::clone(&user_repo),
                Arc::clone(&clock),
            )),
        ];

        info!(scan_mode = config.scan_mode.as_str(), "service started");

        Ok(Self {
            config,
            state,
            limits,
            inbox,
            media_repo,
            scan_tx,
            itq_tx,
            plq_tx,
            tasks,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &Arc<State> {
        &self.state
    }

    pub fn broker(&self) -> &Arc<Broker> {
        self.state.broker()
    }

    pub fn limits(&self) -> &LimitsManager {
        &self.limits
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    /// Where reader drivers push their scans.
    pub fn scan_sender(&self) -> mpsc::Sender<Scan> {
        self.scan_tx.clone()
    }

    /// Where API surfaces submit tokens directly.
    pub fn token_sender(&self) -> mpsc::Sender<Token> {
        self.itq_tx.clone()
    }

    /// Where playlist updates enter the controller.
    pub fn playlist_sender(&self) -> mpsc::Sender<PlaylistEvent> {
        self.plq_tx.clone()
    }

    /// Write script text to the first connected writable reader.
    pub async fn write_token(&self, text: &str) -> anyhow::Result<()> {
        manager::write_token(&self.state, text).await
    }

    /// Abort any in-progress tag write.
    pub async fn cancel_write(&self) {
        manager::cancel_write(&self.state).await;
    }

    /// Record indexing progress and announce it (lossy).
    pub fn set_indexing_status(&self, status: IndexingStatus) -> anyhow::Result<()> {
        self.media_repo.set_indexing_status(status)?;
        self.state
            .broker()
            .publish(Notification::new(Method::MediaIndexing, status));
        Ok(())
    }

    /// Cancel the root context, drain every task, and stop the broker.
    pub async fn stop(mut self) {
        self.state.shutdown();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("task ended abnormally during shutdown: {e}");
            }
        }
        self.state.broker().stop();
        info!("service stopped");
    }
}

/// Periodic housekeeping: prune expired remote-link hosts.
async fn maintenance_loop(
    state: Arc<State>,
    user_repo: Arc<dyn UserRepo>,
    clock: SharedClock,
) {
    let cancel = state.cancellation();
    let mut tick = Ticker::new(Arc::clone(&clock), MAINTENANCE_PERIOD);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                match user_repo.prune_expired_remote_hosts(clock.now(), REMOTE_HOST_TTL) {
                    Ok(0) => {}
                    Ok(pruned) => info!(pruned, "pruned expired remote hosts"),
                    Err(e) => warn!("remote host pruning failed: {e}"),
                }
            }
        }
    }
}

/// Run the daemon with the headless platform and in-memory repositories
/// until interrupted. Writes a PID file and a lock file into the platform
/// temp dir for the lifetime of the process.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let platform = crate::platform::HeadlessPlatform::shared();
    let temp_dir = platform.settings().temp_dir;
    let pid_file = temp_dir.join("tapd.pid");
    let lock_file = temp_dir.join("tapd.lock");

    write_run_files(&pid_file, &lock_file)?;

    let service = Service::start(
        config,
        platform,
        Arc::new(crate::repo::MemoryUserRepo::new()),
        Arc::new(crate::repo::MemoryMediaRepo::new()),
        crate::clock::SystemClock::shared(),
    )?;

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    service.stop().await;

    let _ = std::fs::remove_file(&pid_file);
    let _ = std::fs::remove_file(&lock_file);
    Ok(())
}

fn write_run_files(pid_file: &Path, lock_file: &Path) -> anyhow::Result<()> {
    if lock_file.exists() {
        anyhow::bail!("lock file {} exists; is another instance running?", lock_file.display());
    }
    std::fs::write(lock_file, b"")?;
    std::fs::write(pid_file, std::process::id().to_string())?;
    Ok(())
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
