// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-visible message inbox.
//!
//! Persists messages through the user repository and announces each add on
//! the bus. A non-empty category plus profile id deduplicates: repeated
//! adds update the existing row (last writer wins) but still notify.

use std::sync::Arc;

use serde::Serialize;

use crate::bus::{Broker, Method, Notification};
use crate::repo::{InboxMessage, RepoResult, Severity, UserRepo};

/// Params for `inbox.added`.
#[derive(Debug, Clone, Serialize)]
pub struct InboxAddedParams {
    pub id: i64,
    pub title: String,
    pub severity: Severity,
}

pub struct Inbox {
    user_repo: Arc<dyn UserRepo>,
    broker: Arc<Broker>,
}

impl Inbox {
    pub fn new(user_repo: Arc<dyn UserRepo>, broker: Arc<Broker>) -> Self {
        Self { user_repo, broker }
    }

    /// Persist a message and emit `inbox.added`. Returns the row id.
    pub fn add(&self, message: InboxMessage) -> RepoResult<i64> {
        let title = message.title.clone();
        let severity = message.severity;
        let id = self.user_repo.add_inbox_message(message)?;
        self.broker
            .publish(Notification::new(Method::InboxAdded, InboxAddedParams { id, title, severity }));
        Ok(id)
    }
}

#[cfg(test)]
#[path = "inbox_tests.rs"]
mod tests;
