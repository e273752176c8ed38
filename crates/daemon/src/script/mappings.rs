// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token mapping resolution.
//!
//! A mapping replaces a token's script text before parsing. Lookup order is
//! enabled database mappings (insertion order), then config mappings (file
//! order), then the platform's defaults; the first match wins.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ConfigMapping;
use crate::platform::Platform;
use crate::token::Token;

/// What a mapping's pattern is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingKind {
    /// The token UID, normalized.
    Id,
    /// The token's script text.
    Value,
    /// The raw tag payload.
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Partial,
    Regex,
}

/// A user-defined token mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub kind: MappingKind,
    pub match_kind: MatchKind,
    pub pattern: String,
    pub override_script: String,
    pub enabled: bool,
}

/// Normalize a UID for id matching: lowercase with separator characters
/// stripped, so `04:A1:B2` and `04a1b2` compare equal.
pub fn normalize_uid(uid: &str) -> String {
    uid.chars()
        .filter(|c| !matches!(c, ':' | '-' | ' '))
        .collect::<String>()
        .to_lowercase()
}

impl Mapping {
    /// Whether this mapping matches the token. Invalid regex patterns never
    /// match (and are logged).
    pub fn matches(&self, token: &Token) -> bool {
        let (candidate, pattern) = match self.kind {
            MappingKind::Id => (normalize_uid(&token.uid), normalize_uid(&self.pattern)),
            MappingKind::Value => (token.text.clone(), self.pattern.clone()),
            MappingKind::Data => (token.data.clone(), self.pattern.clone()),
        };
        if candidate.is_empty() {
            return false;
        }
        match self.match_kind {
            MatchKind::Exact => candidate == pattern,
            MatchKind::Partial => candidate.contains(&pattern),
            MatchKind::Regex => match Regex::new(&self.pattern) {
                // Regex matches the raw candidate for value/data, the
                // normalized form for ids (what the user sees in logs).
                Ok(re) => re.is_match(&candidate),
                Err(e) => {
                    warn!(pattern = self.pattern.as_str(), "invalid mapping regex: {e}");
                    false
                }
            },
        }
    }
}

/// Desugar a config-layer mapping: `/…/` is regex, `*` anywhere means
/// partial with asterisks stripped, anything else is exact. Unknown kinds
/// are skipped (and logged).
pub fn from_config(c: &ConfigMapping) -> Option<Mapping> {
    let kind = match c.kind.as_str() {
        "id" => MappingKind::Id,
        "value" => MappingKind::Value,
        "data" => MappingKind::Data,
        other => {
            warn!(kind = other, "skipping config mapping with unknown kind");
            return None;
        }
    };
    let (match_kind, pattern) = desugar_pattern(&c.pattern);
    Some(Mapping {
        kind,
        match_kind,
        pattern,
        override_script: c.override_script.clone(),
        enabled: true,
    })
}

fn desugar_pattern(raw: &str) -> (MatchKind, String) {
    if raw.len() >= 2 && raw.starts_with('/') && raw.ends_with('/') {
        return (MatchKind::Regex, raw[1..raw.len() - 1].to_owned());
    }
    if raw.contains('*') {
        return (MatchKind::Partial, raw.replace('*', ""));
    }
    (MatchKind::Exact, raw.to_owned())
}

/// Resolve the effective script text for a token: first matching database
/// mapping, then config mapping, then the platform default. `None` means the
/// token's own text stands.
pub fn resolve(
    token: &Token,
    db_mappings: &[Mapping],
    config_mappings: &[ConfigMapping],
    platform: &dyn Platform,
) -> Option<String> {
    for m in db_mappings {
        if m.enabled && m.matches(token) {
            return Some(m.override_script.clone());
        }
    }
    for c in config_mappings {
        if let Some(m) = from_config(c) {
            if m.matches(token) {
                return Some(m.override_script);
            }
        }
    }
    platform.lookup_mapping(token)
}

#[cfg(test)]
#[path = "mappings_tests.rs"]
mod tests;
