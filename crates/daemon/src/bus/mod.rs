// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification bus: wire envelope, method enumeration, and the fan-out
//! broker. Methods are the stable public surface; params are opaque
//! JSON-encoded objects.

pub mod broker;

pub use broker::{Broker, SubscriberId, Subscription};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Enumerated notification methods (dotted wire names).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "tokens.added")]
    TokensAdded,
    #[serde(rename = "tokens.removed")]
    TokensRemoved,
    #[serde(rename = "media.started")]
    MediaStarted,
    #[serde(rename = "media.stopped")]
    MediaStopped,
    #[serde(rename = "media.indexing")]
    MediaIndexing,
    #[serde(rename = "readers.connected")]
    ReadersConnected,
    #[serde(rename = "readers.disconnected")]
    ReadersDisconnected,
    #[serde(rename = "playtime.limit.reached")]
    LimitReached,
    #[serde(rename = "playtime.limit.warning")]
    LimitWarning,
    #[serde(rename = "inbox.added")]
    InboxAdded,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokensAdded => "tokens.added",
            Self::TokensRemoved => "tokens.removed",
            Self::MediaStarted => "media.started",
            Self::MediaStopped => "media.stopped",
            Self::MediaIndexing => "media.indexing",
            Self::ReadersConnected => "readers.connected",
            Self::ReadersDisconnected => "readers.disconnected",
            Self::LimitReached => "playtime.limit.reached",
            Self::LimitWarning => "playtime.limit.warning",
            Self::InboxAdded => "inbox.added",
        }
    }

    /// Whether a full subscriber queue evicts its oldest item for this
    /// method instead of dropping the new one. The critical set is exactly
    /// this list; everything else (`media.indexing`) is lossy.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::TokensAdded
                | Self::TokensRemoved
                | Self::ReadersConnected
                | Self::ReadersDisconnected
                | Self::MediaStarted
                | Self::MediaStopped
                | Self::LimitReached
                | Self::LimitWarning
                | Self::InboxAdded
        )
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single notification: method name plus opaque serialized payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub method: Method,
    pub params: serde_json::Value,
}

impl Notification {
    pub fn new(method: Method, params: impl Serialize) -> Self {
        Self {
            method,
            params: serde_json::to_value(params).unwrap_or(serde_json::Value::Null),
        }
    }

    /// A notification with no payload.
    pub fn bare(method: Method) -> Self {
        Self { method, params: serde_json::Value::Null }
    }
}
