// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token wire types.
//!
//! A token is a physical-media identifier plus the script text it maps to.
//! UIDs are opaque strings; nothing here assumes a particular tag technology.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Where a token entered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    /// Scanned on a hardware reader.
    Reader,
    /// Submitted through the API surface.
    Api,
    /// Synthesized by the playlist controller.
    Playlist,
    /// Synthesized by a before/after hook script.
    Hook,
    /// Relayed from a remote link peer.
    Link,
}

impl TokenSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reader => "reader",
            Self::Api => "api",
            Self::Playlist => "playlist",
            Self::Hook => "hook",
            Self::Link => "link",
        }
    }
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scanned or synthesized token.
///
/// Structural equality compares every field; the pipeline's de-duplication
/// key is [`Token::same_token`], which only looks at `uid` and `text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Opaque tag identifier. May be empty for text-only media.
    pub uid: String,
    /// Script source to execute.
    pub text: String,
    /// Raw tag payload, opaque to the core.
    #[serde(default)]
    pub data: String,
    /// Tag technology label (informational only).
    #[serde(default)]
    pub kind: String,
    pub source: TokenSource,
    /// Identity of the reader that produced this token. Empty unless
    /// `source == Reader`.
    #[serde(default)]
    pub reader_id: String,
    /// Wall-clock scan time. `None` is the empty-event sentinel — the queue
    /// worker ignores such tokens.
    pub scan_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub from_api: bool,
    /// Set when a script command reports it ran outside the sandboxed set.
    #[serde(default)]
    pub untrusted: bool,
    #[serde(default)]
    pub remote: bool,
}

impl Token {
    /// A reader-sourced token with the given identity and script text.
    pub fn from_reader(
        reader_id: impl Into<String>,
        uid: impl Into<String>,
        text: impl Into<String>,
        scan_time: NaiveDateTime,
    ) -> Self {
        Self {
            uid: uid.into(),
            text: text.into(),
            data: String::new(),
            kind: String::new(),
            source: TokenSource::Reader,
            reader_id: reader_id.into(),
            scan_time: Some(scan_time),
            from_api: false,
            untrusted: false,
            remote: false,
        }
    }

    /// A synthetic token (playlist, hook, API) with no reader identity.
    pub fn synthetic(source: TokenSource, text: impl Into<String>, scan_time: NaiveDateTime) -> Self {
        Self {
            uid: String::new(),
            text: text.into(),
            data: String::new(),
            kind: String::new(),
            source,
            reader_id: String::new(),
            scan_time: Some(scan_time),
            from_api: source == TokenSource::Api,
            untrusted: false,
            remote: false,
        }
    }

    /// De-duplication equality: two tokens are the same scan iff `uid` and
    /// `text` match. `data`, `scan_time`, and the flags are ignored.
    pub fn same_token(&self, other: &Token) -> bool {
        self.uid == other.uid && self.text == other.text
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
