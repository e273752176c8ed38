// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reader driver contract and scan wire types.
//!
//! Concrete drivers (NFC modules, smart-card stacks, barcode wands, network
//! bridges) live outside the core. The runtime consumes this capability
//! surface only: drivers push [`Scan`] events onto the shared scan queue
//! from `open` until `close`, and advertise what they can do through
//! [`Capability`] flags rather than subtyping.

pub mod detect;
pub mod exit;
pub mod manager;
pub mod preprocess;

pub use detect::AutoDetector;
pub use manager::ReaderManager;
pub use preprocess::{Preprocessor, ScanOutcome};

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::media::ActiveMedia;
use crate::token::Token;

/// One event from a reader: a token, or a removal. `reader_error`
/// distinguishes a driver fault from the user lifting the tag.
#[derive(Debug, Clone)]
pub struct Scan {
    /// Identity of the reader that produced this event.
    pub source: String,
    /// `None` is a removal.
    pub token: Option<Token>,
    pub reader_error: bool,
}

impl Scan {
    pub fn token(source: impl Into<String>, token: Token) -> Self {
        Self { source: source.into(), token: Some(token), reader_error: false }
    }

    pub fn removal(source: impl Into<String>) -> Self {
        Self { source: source.into(), token: None, reader_error: false }
    }

    pub fn driver_error(source: impl Into<String>) -> Self {
        Self { source: source.into(), token: None, reader_error: true }
    }
}

/// Static driver description.
#[derive(Debug, Clone)]
pub struct DriverMetadata {
    /// Canonical driver identifier (the `driver` half of a connection
    /// string).
    pub id: String,
    pub default_enabled: bool,
    pub default_auto_detect: bool,
    pub description: String,
}

/// Optional driver abilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Can write script text onto a tag.
    Write,
    /// Tags can be physically removed (hold mode applies).
    Removable,
    /// Has a display that tracks the active media.
    Display,
}

/// A `driver:path` connection string. Only the first colon splits, so paths
/// may themselves contain colons; the path may be empty for network drivers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionString {
    pub driver: String,
    pub path: String,
}

impl ConnectionString {
    pub fn new(driver: impl Into<String>, path: impl Into<String>) -> Self {
        Self { driver: driver.into(), path: path.into() }
    }

    /// Parse `driver:path`. Returns `None` when there is no colon or the
    /// driver half is empty.
    pub fn parse(raw: &str) -> Option<Self> {
        let (driver, path) = raw.split_once(':')?;
        if driver.is_empty() {
            return None;
        }
        Some(Self::new(driver, path))
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.driver, self.path)
    }
}

/// Reader driver capability contract.
///
/// Object-safe for use as `Box<dyn Reader>`.
pub trait Reader: Send + 'static {
    fn metadata(&self) -> DriverMetadata;

    /// Driver identifiers this instance accepts in connection strings.
    fn ids(&self) -> Vec<String>;

    /// Connect to the device and begin pushing scans onto `scan_tx` until
    /// `close`.
    fn open(&mut self, device: &ConnectionString, scan_tx: mpsc::Sender<Scan>)
        -> anyhow::Result<()>;

    fn close(&mut self) -> anyhow::Result<()>;

    /// Propose a `"driver:path"` connection string for an unconnected
    /// device, or `None`. Entries in `exclude` use the same form and must
    /// not be proposed again.
    fn detect(&self, exclude: &[String]) -> Option<String>;

    fn connected(&self) -> bool;

    fn path(&self) -> Option<String>;

    /// Stable identity of the physical device, available once open.
    fn reader_id(&self) -> Option<String>;

    fn info(&self) -> String;

    /// Write script text onto the present tag. Returns the written token
    /// (with the tag's UID filled in) so its next scan can be recognized.
    fn write(&mut self, text: &str) -> anyhow::Result<Token>;

    fn cancel_write(&mut self);

    fn capabilities(&self) -> Vec<Capability>;

    /// Called when the active media changes, for `Display`-capable drivers.
    fn on_media_change(&mut self, media: Option<&ActiveMedia>) -> anyhow::Result<()>;
}

#[cfg(test)]
#[path = "reader_tests.rs"]
mod tests;
