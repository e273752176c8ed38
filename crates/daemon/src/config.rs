// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::time::Duration;

use clap::Parser;

/// Physical-media control daemon: maps scannable tokens to media actions.
#[derive(Debug, Parser)]
#[command(name = "tapd", version, about)]
pub struct Config {
    /// Scan mode (tap or hold).
    #[arg(long, env = "TAPD_SCAN_MODE", default_value = "tap")]
    pub scan_mode: String,

    /// Hold-mode exit delay in seconds (0 = stop immediately on removal).
    #[arg(long, env = "TAPD_EXIT_DELAY", default_value = "0")]
    pub exit_delay: f64,

    /// Configured readers as driver:path connection strings.
    #[arg(long = "reader", env = "TAPD_READERS", value_delimiter = ',')]
    pub readers: Vec<String>,

    /// Reader auto-detection (default true).
    #[arg(long, env = "TAPD_AUTO_DETECT")]
    pub auto_detect: Option<bool>,

    /// Session playtime limit in seconds (0 = disabled).
    #[arg(long, env = "TAPD_SESSION_LIMIT", default_value = "0")]
    pub session_limit: u64,

    /// Daily playtime limit in seconds (0 = disabled).
    #[arg(long, env = "TAPD_DAILY_LIMIT", default_value = "0")]
    pub daily_limit: u64,

    /// Seconds a stopped session's cumulative time survives before reset.
    #[arg(long, env = "TAPD_SESSION_RESET_TIMEOUT", default_value = "1200")]
    pub session_reset_timeout: u64,

    /// Warning thresholds in seconds-remaining, fired once each per session.
    #[arg(long, env = "TAPD_LIMIT_WARNINGS", value_delimiter = ',', default_value = "600,300,60")]
    pub limit_warnings: Vec<u64>,

    /// Systems exempt from hold-mode exit (removal never stops these).
    #[arg(long = "ignore-system", env = "TAPD_IGNORE_SYSTEMS", value_delimiter = ',')]
    pub ignore_systems: Vec<String>,

    /// Audio feedback on scan failures and limit events (default true).
    #[arg(long, env = "TAPD_AUDIO_FEEDBACK")]
    pub audio_feedback: Option<bool>,

    /// Log format (json or text).
    #[arg(long, env = "TAPD_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "TAPD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Per-driver enable/auto-detect overrides (set programmatically).
    #[arg(skip)]
    pub driver_overrides: HashMap<String, DriverOverride>,

    /// Token mappings from the config layer (set programmatically; config
    /// file parsing lives outside the core).
    #[arg(skip)]
    pub mappings: Vec<ConfigMapping>,

    /// Script run before any media-launching command, outside hook context.
    #[arg(skip)]
    pub before_media_start_hook: Option<String>,

    /// Per-system scripts run before a hold-mode exit stops the launcher.
    #[arg(skip)]
    pub before_exit_hooks: HashMap<String, String>,
}

/// Scan modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Launch on scan; removal does nothing.
    Tap,
    /// Launch on scan; removal stops the media (after the exit delay).
    Hold,
}

/// Explicit per-driver settings overriding the driver's own defaults.
#[derive(Debug, Clone, Default)]
pub struct DriverOverride {
    pub enabled: Option<bool>,
    pub auto_detect: Option<bool>,
}

/// A token mapping from the configuration layer. The pattern carries sugar:
/// `/…/` is a regex, `*` anywhere means partial match with asterisks
/// stripped, anything else is exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigMapping {
    /// What the pattern matches against: "id", "value", or "data".
    pub kind: String,
    pub pattern: String,
    pub override_script: String,
}

impl Default for Config {
    /// Mirrors the clap defaults, for embedding and tests.
    fn default() -> Self {
        Self {
            scan_mode: "tap".into(),
            exit_delay: 0.0,
            readers: Vec::new(),
            auto_detect: None,
            session_limit: 0,
            daily_limit: 0,
            session_reset_timeout: 1200,
            limit_warnings: vec![600, 300, 60],
            ignore_systems: Vec::new(),
            driver_overrides: HashMap::new(),
            audio_feedback: None,
            log_format: "text".into(),
            log_level: "info".into(),
            mappings: Vec::new(),
            before_media_start_hook: None,
            before_exit_hooks: HashMap::new(),
        }
    }
}

/// Bounds for `session_reset_timeout`.
const RESET_TIMEOUT_MIN: u64 = 5 * 60;
const RESET_TIMEOUT_MAX: u64 = 2 * 60 * 60;

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.scan_mode_enum()?;

        if !self.exit_delay.is_finite() || self.exit_delay < 0.0 {
            anyhow::bail!("exit delay must be a non-negative number of seconds");
        }

        for conn in &self.readers {
            if crate::reader::ConnectionString::parse(conn).is_none() {
                anyhow::bail!("invalid reader connection string: {conn} (want driver:path)");
            }
        }

        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }

        Ok(())
    }

    /// Parse the scan mode string into an enum.
    pub fn scan_mode_enum(&self) -> anyhow::Result<ScanMode> {
        match self.scan_mode.to_lowercase().as_str() {
            "tap" => Ok(ScanMode::Tap),
            "hold" => Ok(ScanMode::Hold),
            other => anyhow::bail!("invalid scan mode: {other}"),
        }
    }

    pub fn exit_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.exit_delay).unwrap_or(Duration::ZERO)
    }

    /// Session limit; `None` when disabled.
    pub fn session_limit(&self) -> Option<Duration> {
        (self.session_limit > 0).then(|| Duration::from_secs(self.session_limit))
    }

    /// Daily limit; `None` when disabled.
    pub fn daily_limit(&self) -> Option<Duration> {
        (self.daily_limit > 0).then(|| Duration::from_secs(self.daily_limit))
    }

    /// Cooldown duration, clamped to the supported bounds.
    pub fn session_reset_timeout(&self) -> Duration {
        Duration::from_secs(self.session_reset_timeout.clamp(RESET_TIMEOUT_MIN, RESET_TIMEOUT_MAX))
    }

    /// Warning thresholds, largest first so warnings fire in order.
    pub fn limit_warnings(&self) -> Vec<Duration> {
        let mut w: Vec<Duration> =
            self.limit_warnings.iter().filter(|s| **s > 0).map(|s| Duration::from_secs(*s)).collect();
        w.sort_unstable_by(|a, b| b.cmp(a));
        w.dedup();
        w
    }

    pub fn auto_detect(&self) -> bool {
        self.auto_detect.unwrap_or(true)
    }

    pub fn audio_feedback(&self) -> bool {
        self.audio_feedback.unwrap_or(true)
    }

    pub fn limits_enabled(&self) -> bool {
        self.session_limit > 0 || self.daily_limit > 0
    }

    /// Whether a driver is enabled: explicit override, else its default.
    pub fn driver_enabled(&self, meta: &crate::reader::DriverMetadata) -> bool {
        self.driver_overrides
            .get(&meta.id)
            .and_then(|o| o.enabled)
            .unwrap_or(meta.default_enabled)
    }

    /// Whether a driver participates in auto-detection.
    pub fn driver_auto_detect(&self, meta: &crate::reader::DriverMetadata) -> bool {
        self.driver_overrides
            .get(&meta.id)
            .and_then(|o| o.auto_detect)
            .unwrap_or(meta.default_auto_detect)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
