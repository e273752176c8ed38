// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};

use super::usage_today;
use crate::repo::MediaHistoryEntry;

fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 5, day)
        .and_then(|d| d.and_hms_opt(h, m, s))
        .unwrap_or_default()
}

fn entry(start: NaiveDateTime, end: Option<NaiveDateTime>, play_secs: i64) -> MediaHistoryEntry {
    MediaHistoryEntry {
        dbid: 1,
        start_time: start,
        end_time: end,
        play_time_secs: play_secs,
        system_id: "snes".into(),
        system_name: "SNES".into(),
        media_path: "/roms/g.rom".into(),
        media_name: "g".into(),
        launcher_id: "retro".into(),
    }
}

#[test]
fn entry_within_today_counts_full_play_time() {
    let entries = vec![entry(at(20, 9, 0, 0), Some(at(20, 10, 0, 0)), 3600)];
    assert_eq!(usage_today(&entries, at(20, 12, 0, 0)), Duration::from_secs(3600));
}

#[test]
fn entry_ending_exactly_at_midnight_contributes_zero() {
    let entries = vec![entry(at(19, 23, 0, 0), Some(at(20, 0, 0, 0)), 3600)];
    assert_eq!(usage_today(&entries, at(20, 12, 0, 0)), Duration::ZERO);
}

#[test]
fn entry_ending_one_second_after_midnight_contributes_one_second() {
    let entries = vec![entry(at(19, 23, 0, 0), Some(at(20, 0, 0, 1)), 3601)];
    assert_eq!(usage_today(&entries, at(20, 12, 0, 0)), Duration::from_secs(1));
}

#[test]
fn yesterdays_entry_ignored() {
    let entries = vec![entry(at(19, 9, 0, 0), Some(at(19, 10, 0, 0)), 3600)];
    assert_eq!(usage_today(&entries, at(20, 12, 0, 0)), Duration::ZERO);
}

#[test]
fn open_entry_skipped() {
    let entries = vec![entry(at(20, 9, 0, 0), None, 3600)];
    assert_eq!(usage_today(&entries, at(20, 12, 0, 0)), Duration::ZERO);
}

#[test]
fn mixed_entries_sum() {
    let entries = vec![
        // Spans midnight: 30 min counts.
        entry(at(19, 23, 0, 0), Some(at(20, 0, 30, 0)), 5400),
        // Fully today: full hour counts.
        entry(at(20, 9, 0, 0), Some(at(20, 10, 0, 0)), 3600),
        // Still running: skipped.
        entry(at(20, 11, 0, 0), None, 1200),
    ];
    assert_eq!(usage_today(&entries, at(20, 12, 0, 0)), Duration::from_secs(5400));
}
