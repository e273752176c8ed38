// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared mocks for unit and spec tests: a recording platform, a scriptable
//! reader driver, and small time helpers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::media::ActiveMedia;
use crate::platform::{LaunchTarget, LauncherInfo, Platform, PlatformSettings, StopIntent};
use crate::reader::{Capability, ConnectionString, DriverMetadata, Reader, Scan};
use crate::script::mappings::normalize_uid;
use crate::script::{CommandResult, ScriptCommand};
use crate::state::State;
use crate::token::Token;

type CommandHandler =
    Arc<dyn Fn(&Token, &ScriptCommand) -> anyhow::Result<CommandResult> + Send + Sync>;

/// A deterministic wall-clock instant for tests that don't care which.
pub fn test_wall() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 5, 20)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap_or_default()
}

// -- Mock platform ------------------------------------------------------------

type ReaderFactory = Arc<dyn Fn() -> Box<dyn Reader> + Send + Sync>;

#[derive(Default)]
struct MockPlatformInner {
    launches: Vec<LaunchTarget>,
    stops: Vec<StopIntent>,
    sounds: Vec<String>,
    key_presses: Vec<String>,
    scanned: Vec<Token>,
    mappings: HashMap<String, String>,
    reader_factories: Vec<ReaderFactory>,
    launch_error: Option<String>,
    /// System id stamped onto launched media (defaults to "mock").
    system_id: String,
    custom_commands: HashMap<String, CommandHandler>,
}

/// Recording [`Platform`]. `launch_media` and `stop_active_launcher` also
/// update the State's active media, like a real platform would.
pub struct MockPlatform {
    inner: Mutex<MockPlatformInner>,
}

impl MockPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(MockPlatformInner {
                system_id: "mock".into(),
                ..MockPlatformInner::default()
            }),
        })
    }

    pub fn add_reader_factory(&self, factory: ReaderFactory) {
        self.inner.lock().reader_factories.push(factory);
    }

    /// Register a platform-default mapping from a (normalized) UID to a
    /// script.
    pub fn add_default_mapping(&self, uid: &str, script: &str) {
        self.inner.lock().mappings.insert(normalize_uid(uid), script.to_owned());
    }

    pub fn fail_next_launch(&self, message: &str) {
        self.inner.lock().launch_error = Some(message.to_owned());
    }

    pub fn set_system_id(&self, system_id: &str) {
        self.inner.lock().system_id = system_id.to_owned();
    }

    pub fn launches(&self) -> Vec<LaunchTarget> {
        self.inner.lock().launches.clone()
    }

    pub fn stops(&self) -> Vec<StopIntent> {
        self.inner.lock().stops.clone()
    }

    pub fn sounds(&self) -> Vec<String> {
        self.inner.lock().sounds.clone()
    }

    pub fn key_presses(&self) -> Vec<String> {
        self.inner.lock().key_presses.clone()
    }

    pub fn scanned(&self) -> Vec<Token> {
        self.inner.lock().scanned.clone()
    }

    /// Register a handler for a command name outside the in-core catalogue.
    pub fn add_command(&self, name: &str, handler: CommandHandler) {
        self.inner.lock().custom_commands.insert(name.to_owned(), handler);
    }
}

impl Platform for MockPlatform {
    fn supported_readers(&self, _config: &Config) -> Vec<Box<dyn Reader>> {
        self.inner.lock().reader_factories.iter().map(|f| f()).collect()
    }

    fn launchers(&self, _config: &Config) -> Vec<LauncherInfo> {
        vec![LauncherInfo { id: "mock".into(), system_id: "mock".into() }]
    }

    fn root_dirs(&self, _config: &Config) -> Vec<PathBuf> {
        vec![PathBuf::from("/roms")]
    }

    fn settings(&self) -> PlatformSettings {
        PlatformSettings { temp_dir: std::env::temp_dir() }
    }

    fn launch_media(
        &self,
        _config: &Config,
        state: &Arc<State>,
        target: &LaunchTarget,
    ) -> anyhow::Result<()> {
        let (error, system_id) = {
            let mut inner = self.inner.lock();
            inner.launches.push(target.clone());
            (inner.launch_error.take(), inner.system_id.clone())
        };
        if let Some(message) = error {
            anyhow::bail!("{message}");
        }
        let name = target
            .path
            .rsplit('/')
            .next()
            .unwrap_or(target.path.as_str())
            .to_owned();
        let system_id = target.system_id.clone().unwrap_or(system_id);
        state.set_active_media(Some(ActiveMedia {
            started: test_wall(),
            system_id: system_id.clone(),
            system_name: system_id,
            name,
            path: target.path.clone(),
            launcher_id: target.launcher_id.clone().unwrap_or_else(|| "mock".into()),
        }));
        Ok(())
    }

    fn stop_active_launcher(&self, state: &Arc<State>, intent: StopIntent) -> anyhow::Result<()> {
        self.inner.lock().stops.push(intent);
        state.set_active_media(None);
        Ok(())
    }

    fn scan_hook(&self, token: &Token) {
        self.inner.lock().scanned.push(token.clone());
    }

    fn lookup_mapping(&self, token: &Token) -> Option<String> {
        self.inner.lock().mappings.get(&normalize_uid(&token.uid)).cloned()
    }

    fn keyboard_press(&self, key: &str) -> anyhow::Result<()> {
        self.inner.lock().key_presses.push(key.to_owned());
        Ok(())
    }

    fn play_audio(&self, name: &str) {
        self.inner.lock().sounds.push(name.to_owned());
    }

    fn execute_command(
        &self,
        token: &Token,
        command: &ScriptCommand,
    ) -> anyhow::Result<CommandResult> {
        let handler = self.inner.lock().custom_commands.get(&command.name).cloned();
        match handler {
            Some(handler) => handler(token, command),
            None => anyhow::bail!("unknown command: {}", command.name),
        }
    }
}

// -- Mock reader --------------------------------------------------------------

#[derive(Default)]
struct MockReaderShared {
    written: Vec<String>,
    cancelled_writes: usize,
    media_changes: Vec<Option<ActiveMedia>>,
    excludes_seen: Vec<Vec<String>>,
}

/// Scriptable [`Reader`]. Detection, open failure, and capabilities are
/// configured up front; interactions are recorded on shared handles so
/// tests keep visibility after the driver is boxed away.
pub struct MockReader {
    driver_id: String,
    detect_result: Option<String>,
    fail_open: bool,
    default_auto_detect: bool,
    capabilities: Vec<Capability>,
    connection: Option<ConnectionString>,
    connected: Arc<AtomicBool>,
    shared: Arc<Mutex<MockReaderShared>>,
}

impl MockReader {
    pub fn new(driver_id: &str) -> Self {
        Self {
            driver_id: driver_id.to_owned(),
            detect_result: None,
            fail_open: false,
            default_auto_detect: true,
            capabilities: vec![Capability::Removable, Capability::Write],
            connection: None,
            connected: Arc::new(AtomicBool::new(false)),
            shared: Arc::new(Mutex::new(MockReaderShared::default())),
        }
    }

    /// The `"driver:path"` string `detect` proposes.
    pub fn with_detect(mut self, result: &str) -> Self {
        self.detect_result = Some(result.to_owned());
        self
    }

    pub fn with_fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn without_auto_detect(mut self) -> Self {
        self.default_auto_detect = false;
        self
    }

    /// Shared `connected` flag, to simulate hot-unplug from a test.
    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }

    /// Record into an existing log instead of this instance's own, so tests
    /// can observe every instance a factory produces.
    pub fn with_shared_log(mut self, log: &MockReaderLog) -> Self {
        self.shared = Arc::clone(&log.shared);
        self
    }

    /// Shared recording handle (writes, media changes, exclude lists).
    pub fn shared_log(&self) -> MockReaderLog {
        MockReaderLog { shared: Arc::clone(&self.shared) }
    }
}

/// Read-side view of a [`MockReader`]'s recordings.
#[derive(Clone)]
pub struct MockReaderLog {
    shared: Arc<Mutex<MockReaderShared>>,
}

impl MockReaderLog {
    pub fn written(&self) -> Vec<String> {
        self.shared.lock().written.clone()
    }

    pub fn cancelled_writes(&self) -> usize {
        self.shared.lock().cancelled_writes
    }

    pub fn media_changes(&self) -> Vec<Option<ActiveMedia>> {
        self.shared.lock().media_changes.clone()
    }

    pub fn excludes_seen(&self) -> Vec<Vec<String>> {
        self.shared.lock().excludes_seen.clone()
    }
}

impl Reader for MockReader {
    fn metadata(&self) -> DriverMetadata {
        DriverMetadata {
            id: self.driver_id.clone(),
            default_enabled: true,
            default_auto_detect: self.default_auto_detect,
            description: "mock reader".into(),
        }
    }

    fn ids(&self) -> Vec<String> {
        vec![self.driver_id.clone()]
    }

    fn open(&mut self, device: &ConnectionString, _scan_tx: mpsc::Sender<Scan>)
        -> anyhow::Result<()> {
        if self.fail_open {
            anyhow::bail!("open failed: {device}");
        }
        self.connection = Some(device.clone());
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    fn detect(&self, exclude: &[String]) -> Option<String> {
        self.shared.lock().excludes_seen.push(exclude.to_vec());
        let result = self.detect_result.clone()?;
        if exclude.iter().any(|e| e == &result) {
            return None;
        }
        Some(result)
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn path(&self) -> Option<String> {
        self.connection.as_ref().map(|c| c.path.clone())
    }

    fn reader_id(&self) -> Option<String> {
        self.connection.as_ref().map(|c| format!("{}_{}", self.driver_id, c.path))
    }

    fn info(&self) -> String {
        format!("mock {}", self.driver_id)
    }

    fn write(&mut self, text: &str) -> anyhow::Result<Token> {
        if !self.connected() {
            anyhow::bail!("not connected");
        }
        self.shared.lock().written.push(text.to_owned());
        let reader_id = self.reader_id().unwrap_or_else(|| self.driver_id.clone());
        Ok(Token::from_reader(reader_id, "written-uid", text, test_wall()))
    }

    fn cancel_write(&mut self) {
        self.shared.lock().cancelled_writes += 1;
    }

    fn capabilities(&self) -> Vec<Capability> {
        self.capabilities.clone()
    }

    fn on_media_change(&mut self, media: Option<&ActiveMedia>) -> anyhow::Result<()> {
        self.shared.lock().media_changes.push(media.cloned());
        Ok(())
    }
}
