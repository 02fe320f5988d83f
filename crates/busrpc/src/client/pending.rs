// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pending call table: correlation id -> response channel.

use crate::error::{RpcError, RpcResult};
use crate::message::Message;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Calls waiting for a response.
///
/// Each id completes at most once: whoever removes the entry first (the
/// response, the timeout, a cancellation or a shutdown) wins.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: DashMap<String, oneshot::Sender<Message>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call. A live entry with the same id is an invariant
    /// violation and is left untouched.
    pub fn insert(&self, id: &str) -> RpcResult<oneshot::Receiver<Message>> {
        match self.calls.entry(id.to_string()) {
            Entry::Occupied(_) => Err(RpcError::InvariantViolation(format!(
                "correlation id '{}' is already pending",
                id
            ))),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                Ok(rx)
            }
        }
    }

    /// Hand a response to its waiting call. Returns false when no call is
    /// waiting on `id` (late, duplicate or unknown response).
    pub fn complete(&self, id: &str, response: Message) -> bool {
        match self.calls.remove(id) {
            Some((_, tx)) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Forget a call. Safe to call more than once.
    pub fn remove(&self, id: &str) -> bool {
        self.calls.remove(id).is_some()
    }

    /// Drop every waiting call; their receivers observe a closed channel.
    pub fn clear(&self) -> usize {
        let count = self.calls.len();
        self.calls.clear();
        count
    }

    pub fn contains(&self, id: &str) -> bool {
        self.calls.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

/// Removes a pending entry when the awaiting call ends for any reason.
pub(crate) struct PendingGuard {
    pub(crate) calls: Arc<PendingCalls>,
    pub(crate) id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.calls.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_exactly_once() {
        let pending = PendingCalls::new();
        let rx = pending.insert("a").unwrap();

        assert!(pending.complete("a", Message::new("first")));
        assert!(!pending.complete("a", Message::new("second")));
        assert_eq!(rx.await.unwrap().topic, "first");
        assert!(pending.is_empty());
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let pending = PendingCalls::new();
        let _rx = pending.insert("a").unwrap();
        assert!(matches!(
            pending.insert("a"),
            Err(RpcError::InvariantViolation(_))
        ));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn unknown_response_is_ignored() {
        let pending = PendingCalls::new();
        assert!(!pending.complete("nobody", Message::new("x")));
    }

    #[test]
    fn guard_removes_entry() {
        let pending = Arc::new(PendingCalls::new());
        let _rx = pending.insert("a").unwrap();
        {
            let _guard = PendingGuard {
                calls: pending.clone(),
                id: "a".into(),
            };
        }
        assert!(!pending.contains("a"));
        assert!(!pending.remove("a"));
    }

    #[tokio::test]
    async fn clear_closes_receivers() {
        let pending = PendingCalls::new();
        let rx = pending.insert("a").unwrap();
        assert_eq!(pending.clear(), 1);
        assert!(rx.await.is_err());
    }
}
