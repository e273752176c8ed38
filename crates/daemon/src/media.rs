// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// The media session the platform currently has running.
///
/// Equality compares every field; the State uses it to decide whether a
/// transition between two non-`None` values is a media change (which emits
/// stopped-then-started).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveMedia {
    /// Wall-clock start time.
    pub started: NaiveDateTime,
    pub system_id: String,
    pub system_name: String,
    pub name: String,
    pub path: String,
    pub launcher_id: String,
}
