// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-flight call table used for draining and forced shutdown.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Key of a running call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallKey {
    /// Request carried a correlation id
    Correlated(String),
    /// Fire-and-forget request, numbered locally
    Anonymous(u64),
}

/// Handle on one tracked call. The generation tells apart successive
/// calls that reuse the same correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallTicket {
    pub key: CallKey,
    generation: u64,
}

#[derive(Debug)]
struct Tracked {
    token: CancellationToken,
    generation: u64,
}

/// Running handler invocations and their cancellation controllers.
#[derive(Debug, Default)]
pub struct InFlightCalls {
    calls: DashMap<CallKey, Tracked>,
    sequence: AtomicU64,
    idle: Notify,
}

impl InFlightCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a call. Returns `None` if the correlation id is already running.
    pub fn insert(&self, correlation_id: Option<&str>, token: CancellationToken) -> Option<CallTicket> {
        let generation = self.sequence.fetch_add(1, Ordering::Relaxed);
        let key = match correlation_id {
            Some(id) => CallKey::Correlated(id.to_string()),
            None => CallKey::Anonymous(generation),
        };
        match self.calls.entry(key) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let key = slot.key().clone();
                slot.insert(Tracked { token, generation });
                Some(CallTicket { key, generation })
            }
        }
    }

    /// Stop tracking a call. Idempotent; an entry re-registered under the
    /// same key since `ticket` was issued is left alone.
    pub fn remove(&self, ticket: &CallTicket) {
        self.calls
            .remove_if(&ticket.key, |_, tracked| tracked.generation == ticket.generation);
        if self.calls.is_empty() {
            self.idle.notify_waiters();
        }
    }

    /// Resolve once no call is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.calls.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Cancel and forget every call. Returns how many were running.
    pub fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        self.calls.retain(|_, tracked| {
            tracked.token.cancel();
            cancelled += 1;
            false
        });
        self.idle.notify_waiters();
        cancelled
    }

    pub fn contains(&self, key: &CallKey) -> bool {
        self.calls.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Removes an in-flight entry when the call task finishes or is dropped.
pub(crate) struct InFlightGuard {
    pub(crate) calls: Arc<InFlightCalls>,
    pub(crate) ticket: CallTicket,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.calls.remove(&self.ticket);
    }
}
