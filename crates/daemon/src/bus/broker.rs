// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fan-out broker with per-subscriber bounded queues.
//!
//! Producers must never block on a slow subscriber, so delivery is a
//! non-blocking push into each subscriber's own deque. When a queue is full
//! the notification is classified: critical methods evict the subscriber's
//! oldest item and retry once; lossy methods are dropped for that subscriber
//! only. Per-subscriber ordering is FIFO over surviving items.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::Notification;

/// Opaque handle for removing a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct SubQueue {
    items: Mutex<VecDeque<Notification>>,
    capacity: usize,
    bell: Notify,
    closed: AtomicBool,
}

impl SubQueue {
    fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            bell: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Non-blocking offer. Holds only this subscriber's own mutex, for
    /// bounded work.
    fn offer(&self, id: SubscriberId, n: &Notification) {
        let mut items = self.items.lock();
        if items.len() < self.capacity {
            items.push_back(n.clone());
            drop(items);
            self.bell.notify_one();
            return;
        }
        if n.method.is_critical() {
            if let Some(evicted) = items.pop_front() {
                debug!(
                    subscriber = id.0,
                    evicted = evicted.method.as_str(),
                    incoming = n.method.as_str(),
                    "subscriber queue full, evicting oldest"
                );
            }
            if items.len() < self.capacity {
                items.push_back(n.clone());
                drop(items);
                self.bell.notify_one();
            } else {
                warn!(
                    subscriber = id.0,
                    method = n.method.as_str(),
                    "subscriber queue still full after eviction, dropping"
                );
            }
        } else {
            debug!(
                subscriber = id.0,
                method = n.method.as_str(),
                "subscriber queue full, dropping lossy notification"
            );
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.bell.notify_waiters();
    }
}

/// Receiving side of a subscription.
pub struct Subscription {
    queue: Arc<SubQueue>,
}

impl Subscription {
    /// Wait for the next notification. Returns `None` once the subscription
    /// is removed (or the broker stopped) and the queue is drained.
    pub async fn recv(&self) -> Option<Notification> {
        loop {
            // Register interest before the empty check so a concurrent
            // publish cannot slip between check and await.
            let notified = self.queue.bell.notified();
            if let Some(n) = self.queue.items.lock().pop_front() {
                // Wake any sibling waiter for remaining items.
                self.queue.bell.notify_one();
                return Some(n);
            }
            if self.queue.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    /// Pop the next notification without waiting.
    pub fn try_recv(&self) -> Option<Notification> {
        self.queue.items.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.items.lock().is_empty()
    }
}

/// Notification broker. Cheap to clone via `Arc`; all methods take `&self`.
pub struct Broker {
    subs: RwLock<HashMap<u64, Arc<SubQueue>>>,
    next_id: AtomicU64,
    stopped: AtomicBool,
}

impl Broker {
    pub fn new() -> Self {
        Self {
            subs: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Fan a notification out to every subscriber. Never blocks on a
    /// subscriber; total work is bounded by the subscriber count.
    pub fn publish(&self, n: Notification) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        let subs = self.subs.read();
        for (id, queue) in subs.iter() {
            queue.offer(SubscriberId(*id), &n);
        }
    }

    /// Register a subscriber with its own bounded queue.
    pub fn subscribe(&self, buffer: usize) -> (Subscription, SubscriberId) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(SubQueue::new(buffer));
        if self.stopped.load(Ordering::Acquire) {
            queue.close();
        } else {
            self.subs.write().insert(id, Arc::clone(&queue));
        }
        (Subscription { queue }, SubscriberId(id))
    }

    /// Remove a subscriber. Its pending items remain readable; `recv`
    /// returns `None` once they are drained.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if let Some(queue) = self.subs.write().remove(&id.0) {
            queue.close();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subs.read().len()
    }

    /// Stop the broker: close every subscription and refuse new publishes.
    /// Safe to call more than once.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let mut subs = self.subs.write();
        for (_, queue) in subs.drain() {
            queue.close();
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
