// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host platform contract.
//!
//! Concrete platforms (console frontends, desktop OSes) live outside the
//! core; the runtime only consumes this capability surface. Implementations
//! of [`Platform::launch_media`] are expected to record the new session via
//! [`crate::state::State::set_active_media`] as a side effect.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::reader::Reader;
use crate::script::{CommandResult, ScriptCommand};
use crate::state::State;
use crate::token::Token;

/// Why the active launcher is being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopIntent {
    /// The user asked (token removal, explicit stop).
    User,
    /// The limits engine enforced a breach.
    Preemption,
}

/// What a media-launching command resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTarget {
    pub path: String,
    pub system_id: Option<String>,
    pub launcher_id: Option<String>,
}

/// A launcher the platform can drive.
#[derive(Debug, Clone)]
pub struct LauncherInfo {
    pub id: String,
    pub system_id: String,
}

/// Platform-level paths and knobs.
#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub temp_dir: PathBuf,
}

/// Host platform capability set.
pub trait Platform: Send + Sync + 'static {
    /// Reader drivers this platform can host, in instantiation order.
    fn supported_readers(&self, config: &Config) -> Vec<Box<dyn Reader>>;

    fn launchers(&self, config: &Config) -> Vec<LauncherInfo>;

    fn root_dirs(&self, config: &Config) -> Vec<PathBuf>;

    fn settings(&self) -> PlatformSettings;

    /// Start the media at `target`. Implementations set the active media on
    /// `state` once the launcher is up.
    fn launch_media(
        &self,
        config: &Config,
        state: &Arc<State>,
        target: &LaunchTarget,
    ) -> anyhow::Result<()>;

    fn stop_active_launcher(&self, state: &Arc<State>, intent: StopIntent) -> anyhow::Result<()>;

    /// Platform-specific observation hook, called for every accepted scan.
    fn scan_hook(&self, token: &Token);

    /// Platform-default token mapping, consulted after db and config
    /// mappings.
    fn lookup_mapping(&self, token: &Token) -> Option<String>;

    fn keyboard_press(&self, key: &str) -> anyhow::Result<()>;

    /// Fire-and-forget audio cue ("fail", "limit", ...).
    fn play_audio(&self, name: &str);

    /// Execute a script command outside the in-core catalogue. The result
    /// may splice further commands into the running script.
    fn execute_command(
        &self,
        token: &Token,
        command: &ScriptCommand,
    ) -> anyhow::Result<CommandResult>;
}

pub type SharedPlatform = Arc<dyn Platform>;

/// Platform used when no host integration is compiled in: launches are
/// tracked in the State (so scans, limits, and history all work) but no
/// external process is driven.
pub struct HeadlessPlatform;

impl HeadlessPlatform {
    pub fn shared() -> SharedPlatform {
        Arc::new(Self)
    }
}

impl Platform for HeadlessPlatform {
    fn supported_readers(&self, _config: &Config) -> Vec<Box<dyn Reader>> {
        Vec::new()
    }

    fn launchers(&self, _config: &Config) -> Vec<LauncherInfo> {
        Vec::new()
    }

    fn root_dirs(&self, _config: &Config) -> Vec<PathBuf> {
        Vec::new()
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
        tracing::info!(path = target.path.as_str(), "headless launch");
        let name = target.path.rsplit('/').next().unwrap_or(target.path.as_str()).to_owned();
        state.set_active_media(Some(crate::media::ActiveMedia {
            started: chrono::Local::now().naive_local(),
            system_id: target.system_id.clone().unwrap_or_default(),
            system_name: target.system_id.clone().unwrap_or_default(),
            name,
            path: target.path.clone(),
            launcher_id: target.launcher_id.clone().unwrap_or_default(),
        }));
        Ok(())
    }

    fn stop_active_launcher(&self, state: &Arc<State>, intent: StopIntent) -> anyhow::Result<()> {
        tracing::info!(?intent, "headless stop");
        state.set_active_media(None);
        Ok(())
    }

    fn scan_hook(&self, _token: &Token) {}

    fn lookup_mapping(&self, _token: &Token) -> Option<String> {
        None
    }

    fn keyboard_press(&self, _key: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn play_audio(&self, name: &str) {
        tracing::debug!(name, "audio cue skipped (headless)");
    }

    fn execute_command(
        &self,
        _token: &Token,
        command: &ScriptCommand,
    ) -> anyhow::Result<CommandResult> {
        anyhow::bail!("unknown command: {}", command.name)
    }
}
