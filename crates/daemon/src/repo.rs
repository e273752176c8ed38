// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository contracts for user data (mappings, history, inbox) and media
//! data (indexing progress).
//!
//! The database engine and its migrations live outside the core; the runtime
//! consumes these traits only. The in-memory implementations back the default
//! daemon wiring and the tests.

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::script::Mapping;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("no such row: {0}")]
    NotFound(i64),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// One completed or running media session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaHistoryEntry {
    pub dbid: i64,
    pub start_time: NaiveDateTime,
    /// `None` while the session is still running.
    pub end_time: Option<NaiveDateTime>,
    pub play_time_secs: i64,
    pub system_id: String,
    pub system_name: String,
    pub media_path: String,
    pub media_name: String,
    pub launcher_id: String,
}

/// One token-script execution, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanHistoryEntry {
    pub time: NaiveDateTime,
    pub kind: String,
    pub uid: String,
    pub text: String,
    pub data: String,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A user-visible message for the inbox surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxMessage {
    pub title: String,
    pub body: String,
    pub severity: Severity,
    /// Non-empty category + profile form a deduplication key: repeated adds
    /// update the existing row.
    pub category: Option<String>,
    pub profile_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingStatus {
    Running,
    Pending,
    Completed,
    Failed,
}

/// User-data repository.
pub trait UserRepo: Send + Sync + 'static {
    fn enabled_mappings(&self) -> RepoResult<Vec<Mapping>>;

    fn add_history(&self, entry: ScanHistoryEntry) -> RepoResult<()>;

    /// Insert a media-history row; returns its id.
    fn add_media_history(&self, entry: &MediaHistoryEntry) -> RepoResult<i64>;

    fn close_media_history(
        &self,
        dbid: i64,
        end_time: NaiveDateTime,
        play_time_secs: i64,
    ) -> RepoResult<()>;

    fn update_media_history_time(&self, dbid: i64, play_time_secs: i64) -> RepoResult<()>;

    /// Rows ordered by descending id, starting below `last_id` when given.
    fn media_history(&self, last_id: Option<i64>, limit: usize)
        -> RepoResult<Vec<MediaHistoryEntry>>;

    /// Insert or (when the dedup key matches) update an inbox row; returns
    /// the row id.
    fn add_inbox_message(&self, msg: InboxMessage) -> RepoResult<i64>;

    fn upsert_remote_host(&self, host: &str, seen: NaiveDateTime) -> RepoResult<()>;

    /// Drop remote-link hosts not seen within `ttl`; returns how many.
    fn prune_expired_remote_hosts(&self, now: NaiveDateTime, ttl: Duration) -> RepoResult<usize>;
}

/// Media-data repository.
pub trait MediaRepo: Send + Sync + 'static {
    fn indexing_status(&self) -> RepoResult<Option<IndexingStatus>>;

    fn set_indexing_status(&self, status: IndexingStatus) -> RepoResult<()>;

    fn last_indexed_system(&self) -> RepoResult<Option<String>>;

    fn set_last_indexed_system(&self, system: &str) -> RepoResult<()>;

    /// Block until no background writes are in flight. The in-memory store
    /// has none, so this is a no-op there.
    fn wait_for_background_operations(&self) -> RepoResult<()>;
}

// -- In-memory implementations ------------------------------------------------

#[derive(Default)]
struct MemoryUserInner {
    mappings: Vec<Mapping>,
    scan_history: Vec<ScanHistoryEntry>,
    media_history: Vec<MediaHistoryEntry>,
    next_media_id: i64,
    inbox: Vec<(i64, InboxMessage)>,
    next_inbox_id: i64,
    remote_hosts: HashMap<String, NaiveDateTime>,
}

/// In-process user repository.
#[derive(Default)]
pub struct MemoryUserRepo {
    inner: Mutex<MemoryUserInner>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed database mappings (insertion order is lookup order).
    pub fn set_mappings(&self, mappings: Vec<Mapping>) {
        self.inner.lock().mappings = mappings;
    }

    pub fn scan_history(&self) -> Vec<ScanHistoryEntry> {
        self.inner.lock().scan_history.clone()
    }

    pub fn inbox(&self) -> Vec<(i64, InboxMessage)> {
        self.inner.lock().inbox.clone()
    }
}

impl UserRepo for MemoryUserRepo {
    fn enabled_mappings(&self) -> RepoResult<Vec<Mapping>> {
        Ok(self.inner.lock().mappings.iter().filter(|m| m.enabled).cloned().collect())
    }

    fn add_history(&self, entry: ScanHistoryEntry) -> RepoResult<()> {
        self.inner.lock().scan_history.push(entry);
        Ok(())
    }

    fn add_media_history(&self, entry: &MediaHistoryEntry) -> RepoResult<i64> {
        let mut inner = self.inner.lock();
        inner.next_media_id += 1;
        let dbid = inner.next_media_id;
        let mut row = entry.clone();
        row.dbid = dbid;
        inner.media_history.push(row);
        Ok(dbid)
    }

    fn close_media_history(
        &self,
        dbid: i64,
        end_time: NaiveDateTime,
        play_time_secs: i64,
    ) -> RepoResult<()> {
        let mut inner = self.inner.lock();
        let row = inner
            .media_history
            .iter_mut()
            .find(|r| r.dbid == dbid)
            .ok_or(RepoError::NotFound(dbid))?;
        row.end_time = Some(end_time);
        row.play_time_secs = play_time_secs;
        Ok(())
    }

    fn update_media_history_time(&self, dbid: i64, play_time_secs: i64) -> RepoResult<()> {
        let mut inner = self.inner.lock();
        let row = inner
            .media_history
            .iter_mut()
            .find(|r| r.dbid == dbid)
            .ok_or(RepoError::NotFound(dbid))?;
        row.play_time_secs = play_time_secs;
        Ok(())
    }

    fn media_history(
        &self,
        last_id: Option<i64>,
        limit: usize,
    ) -> RepoResult<Vec<MediaHistoryEntry>> {
        let inner = self.inner.lock();
        let mut rows: Vec<MediaHistoryEntry> = inner
            .media_history
            .iter()
            .filter(|r| last_id.is_none_or(|last| r.dbid < last))
            .cloned()
            .collect();
        rows.sort_unstable_by(|a, b| b.dbid.cmp(&a.dbid));
        rows.truncate(limit);
        Ok(rows)
    }

    fn add_inbox_message(&self, msg: InboxMessage) -> RepoResult<i64> {
        let mut inner = self.inner.lock();
        if let Some(ref category) = msg.category {
            if !category.is_empty() {
                let existing = inner.inbox.iter_mut().find(|(_, m)| {
                    m.category.as_deref() == Some(category.as_str())
                        && m.profile_id == msg.profile_id
                });
                if let Some((id, slot)) = existing {
                    // Last writer wins at the row level.
                    let id = *id;
                    *slot = msg;
                    return Ok(id);
                }
            }
        }
        inner.next_inbox_id += 1;
        let id = inner.next_inbox_id;
        inner.inbox.push((id, msg));
        Ok(id)
    }

    fn upsert_remote_host(&self, host: &str, seen: NaiveDateTime) -> RepoResult<()> {
        self.inner.lock().remote_hosts.insert(host.to_owned(), seen);
        Ok(())
    }

    fn prune_expired_remote_hosts(&self, now: NaiveDateTime, ttl: Duration) -> RepoResult<usize> {
        let cutoff =
            now - chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        let mut inner = self.inner.lock();
        let before = inner.remote_hosts.len();
        inner.remote_hosts.retain(|_, seen| *seen >= cutoff);
        Ok(before - inner.remote_hosts.len())
    }
}

#[derive(Default)]
struct MemoryMediaInner {
    indexing_status: Option<IndexingStatus>,
    last_indexed_system: Option<String>,
}

/// In-process media repository.
#[derive(Default)]
pub struct MemoryMediaRepo {
    inner: Mutex<MemoryMediaInner>,
}

impl MemoryMediaRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MediaRepo for MemoryMediaRepo {
    fn indexing_status(&self) -> RepoResult<Option<IndexingStatus>> {
        Ok(self.inner.lock().indexing_status)
    }

    fn set_indexing_status(&self, status: IndexingStatus) -> RepoResult<()> {
        self.inner.lock().indexing_status = Some(status);
        Ok(())
    }

    fn last_indexed_system(&self) -> RepoResult<Option<String>> {
        Ok(self.inner.lock().last_indexed_system.clone())
    }

    fn set_last_indexed_system(&self, system: &str) -> RepoResult<()> {
        self.inner.lock().last_indexed_system = Some(system.to_owned());
        Ok(())
    }

    fn wait_for_background_operations(&self) -> RepoResult<()> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "repo_tests.rs"]
mod tests;
