// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide shared state.
//!
//! One RW lock protects every field. Every method that both mutates state
//! and emits a notification follows the same pattern: acquire, mutate,
//! capture what to notify, release, publish. Nothing publishes into the
//! broker while holding the lock, no reader driver call happens under the
//! lock, and no user callback runs under it; callers clone a
//! [`ReaderHandle`] out and talk to the driver afterwards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::bus::{Broker, Method, Notification};
use crate::media::ActiveMedia;
use crate::playlist::Playlist;
use crate::reader::{ConnectionString, Reader};
use crate::token::Token;

/// A live reader registration. `id` and `connection` are cached so lookups
/// never need the driver lock.
#[derive(Clone)]
pub struct ReaderHandle {
    pub id: String,
    pub connection: ConnectionString,
    pub driver: Arc<tokio::sync::Mutex<Box<dyn Reader>>>,
}

impl ReaderHandle {
    pub fn new(id: impl Into<String>, connection: ConnectionString, driver: Box<dyn Reader>) -> Self {
        Self {
            id: id.into(),
            connection,
            driver: Arc::new(tokio::sync::Mutex::new(driver)),
        }
    }
}

/// Params for `readers.connected` / `readers.disconnected`.
#[derive(Debug, Clone, Serialize)]
pub struct ReaderParams {
    pub reader_id: String,
    pub connection: String,
}

#[derive(Default)]
struct StateInner {
    active_token: Option<Token>,
    last_scanned: Option<Token>,
    active_media: Option<ActiveMedia>,
    active_playlist: Option<Playlist>,
    /// The token believed responsible for the running media.
    software_token: Option<Token>,
    /// Token just written to a blank card; its next scan is suppressed.
    wrote_token: Option<Token>,
    readers: HashMap<String, ReaderHandle>,
    launch_context: Option<CancellationToken>,
}

/// Shared runtime state. Construct once, pass explicitly.
pub struct State {
    inner: RwLock<StateInner>,
    broker: Arc<Broker>,
    root: CancellationToken,
    launch_in_flight: AtomicBool,
}

impl State {
    pub fn new(broker: Arc<Broker>) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(StateInner::default()),
            broker,
            root: CancellationToken::new(),
            launch_in_flight: AtomicBool::new(false),
        })
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Root cancellation context. Every long-lived task selects on this.
    pub fn cancellation(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Cancel the root context. Idempotent.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    // -- Tokens ---------------------------------------------------------------

    pub fn active_token(&self) -> Option<Token> {
        self.inner.read().active_token.clone()
    }

    pub fn last_scanned(&self) -> Option<Token> {
        self.inner.read().last_scanned.clone()
    }

    /// Set or clear the active token, emitting `tokens.added` or
    /// `tokens.removed`.
    pub fn set_active_token(&self, token: Option<Token>) {
        let notification = {
            let mut inner = self.inner.write();
            match token {
                Some(token) => {
                    inner.active_token = Some(token.clone());
                    inner.last_scanned = Some(token.clone());
                    Notification::new(Method::TokensAdded, &token)
                }
                None => {
                    let removed = inner.active_token.take();
                    Notification::new(Method::TokensRemoved, &removed)
                }
            }
        };
        self.broker.publish(notification);
    }

    pub fn software_token(&self) -> Option<Token> {
        self.inner.read().software_token.clone()
    }

    pub fn set_software_token(&self, token: Option<Token>) {
        self.inner.write().software_token = token;
    }

    pub fn set_wrote_token(&self, token: Option<Token>) {
        self.inner.write().wrote_token = token;
    }

    /// If `scanned` matches the just-written token, clear the mark and
    /// report true so the caller drops the scan instead of launching it.
    pub fn take_wrote_token_if_matches(&self, scanned: &Token) -> bool {
        let mut inner = self.inner.write();
        match inner.wrote_token {
            Some(ref wrote) if wrote.same_token(scanned) => {
                inner.wrote_token = None;
                true
            }
            _ => false,
        }
    }

    // -- Media ----------------------------------------------------------------

    pub fn active_media(&self) -> Option<ActiveMedia> {
        self.inner.read().active_media.clone()
    }

    /// Set or clear the active media, emitting `media.stopped` and/or
    /// `media.started`. A transition between two distinct non-`None` values
    /// emits stopped then started, in that order.
    pub fn set_active_media(&self, media: Option<ActiveMedia>) {
        let notifications = {
            let mut inner = self.inner.write();
            let previous = inner.active_media.clone();
            let mut out = Vec::new();
            match (&previous, &media) {
                (None, None) => {}
                (Some(prev), Some(next)) if prev == next => {}
                (prev, next) => {
                    if let Some(prev) = prev {
                        out.push(Notification::new(Method::MediaStopped, prev));
                    }
                    if let Some(next) = next {
                        out.push(Notification::new(Method::MediaStarted, next));
                    }
                }
            }
            inner.active_media = media;
            if inner.active_media.is_none() {
                inner.software_token = None;
            }
            out
        };
        for n in notifications {
            self.broker.publish(n);
        }
    }

    // -- Playlist -------------------------------------------------------------

    pub fn active_playlist(&self) -> Option<Playlist> {
        self.inner.read().active_playlist.clone()
    }

    pub fn set_active_playlist(&self, playlist: Option<Playlist>) {
        self.inner.write().active_playlist = playlist;
    }

    // -- Readers --------------------------------------------------------------

    /// Register a reader, emitting `readers.connected`. Returns the handle
    /// previously registered under the same id, if any; the caller is
    /// responsible for closing it outside this call.
    pub fn set_reader(&self, handle: ReaderHandle) -> Option<ReaderHandle> {
        let (old, notification) = {
            let mut inner = self.inner.write();
            let params = ReaderParams {
                reader_id: handle.id.clone(),
                connection: handle.connection.to_string(),
            };
            let old = inner.readers.insert(handle.id.clone(), handle);
            (old, Notification::new(Method::ReadersConnected, params))
        };
        self.broker.publish(notification);
        old
    }

    /// Deregister a reader, emitting `readers.disconnected`. The returned
    /// handle is still open; the caller closes it outside this call.
    pub fn remove_reader(&self, id: &str) -> Option<ReaderHandle> {
        let (removed, notification) = {
            let mut inner = self.inner.write();
            let removed = inner.readers.remove(id)?;
            let params = ReaderParams {
                reader_id: removed.id.clone(),
                connection: removed.connection.to_string(),
            };
            (removed, Notification::new(Method::ReadersDisconnected, params))
        };
        self.broker.publish(notification);
        Some(removed)
    }

    pub fn reader_handles(&self) -> Vec<ReaderHandle> {
        self.inner.read().readers.values().cloned().collect()
    }

    pub fn has_reader(&self, id: &str) -> bool {
        self.inner.read().readers.contains_key(id)
    }

    pub fn reader_count(&self) -> usize {
        self.inner.read().readers.len()
    }

    // -- Launch lifecycle -----------------------------------------------------

    /// Claim the single in-flight launch slot. Errors if a launch is
    /// already running; the returned guard releases the slot on drop.
    pub fn try_start_launch(self: &Arc<Self>) -> anyhow::Result<LaunchGuard> {
        if self
            .launch_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            anyhow::bail!("a script launch is already in flight");
        }
        Ok(LaunchGuard { state: Arc::clone(self) })
    }

    /// Begin a new launch: the previous launch context is cancelled so
    /// cleanup routines scheduled by older launches skip themselves.
    pub fn new_launch_context(&self) -> CancellationToken {
        let (old, fresh) = {
            let mut inner = self.inner.write();
            let fresh = self.root.child_token();
            let old = inner.launch_context.replace(fresh.clone());
            (old, fresh)
        };
        if let Some(old) = old {
            old.cancel();
        }
        fresh
    }

    /// The context of the most recent launch (the root context if none yet).
    pub fn launch_context(&self) -> CancellationToken {
        self.inner.read().launch_context.clone().unwrap_or_else(|| self.root.clone())
    }
}

/// RAII release for the launch slot.
pub struct LaunchGuard {
    state: Arc<State>,
}

impl Drop for LaunchGuard {
    fn drop(&mut self) {
        self.state.launch_in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
