// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daily-usage accounting from media history.

use std::time::Duration;

use chrono::NaiveDateTime;

use crate::repo::MediaHistoryEntry;

/// Sum today's completed playtime.
///
/// An entry counts iff its end time is strictly after midnight (ending
/// exactly at midnight contributes nothing). Entries started today
/// contribute their full play time; entries spanning midnight contribute
/// only the part after it. Open entries (`end_time == None`) are skipped —
/// the running session's contribution is added separately by the caller, so
/// counting the open row would double it.
pub fn usage_today(entries: &[MediaHistoryEntry], now: NaiveDateTime) -> Duration {
    let Some(midnight) = now.date().and_hms_opt(0, 0, 0) else {
        return Duration::ZERO;
    };

    let mut total = Duration::ZERO;
    for entry in entries {
        let Some(end) = entry.end_time else {
            continue;
        };
        if end <= midnight || end > now {
            continue;
        }
        let seconds = if entry.start_time >= midnight {
            entry.play_time_secs.max(0) as u64
        } else {
            // Spans midnight: only the part after it counts today.
            (end - midnight).num_seconds().max(0) as u64
        };
        total += Duration::from_secs(seconds);
    }
    total
}

#[cfg(test)]
#[path = "daily_tests.rs"]
mod tests;
