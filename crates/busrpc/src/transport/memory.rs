// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process broker with MQTT filter semantics.
//!
//! Every connected peer gets a session holding its subscriptions and an
//! unbounded queue drained by a delivery task. Messages are delivered in
//! publish order per session, at the lower of the publish level and the
//! best matching subscription level.

use super::{HandlerChain, Transport, TransportError};
use crate::message::{Message, QoS};
use crate::topic::{self, matches_filter};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Session {
    subscriptions: Vec<(String, QoS)>,
    outbox: mpsc::UnboundedSender<Message>,
}

impl Session {
    /// Best subscription level matching `topic`, if any.
    fn granted_qos(&self, topic: &str) -> Option<QoS> {
        self.subscriptions
            .iter()
            .filter(|(filter, _)| matches_filter(filter, topic))
            .map(|(_, qos)| *qos)
            .max()
    }
}

type Sessions = RwLock<HashMap<String, Session>>;

/// Shared in-memory message bus.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    sessions: Arc<Sessions>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a peer. Must be called from within a tokio runtime.
    pub fn connect(&self, client_id: &str) -> Result<Arc<MemoryTransport>, TransportError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let (outbox, mut inbox) = mpsc::unbounded_channel::<Message>();
        {
            let mut sessions = self.sessions.write();
            if sessions.contains_key(client_id) {
                return Err(TransportError::DuplicateClientId(client_id.to_string()));
            }
            sessions.insert(
                client_id.to_string(),
                Session {
                    subscriptions: Vec::new(),
                    outbox,
                },
            );
        }

        let handlers = Arc::new(HandlerChain::new());
        let chain = handlers.clone();
        let id = client_id.to_string();
        runtime.spawn(async move {
            while let Some(message) = inbox.recv().await {
                chain.dispatch(&message).await;
            }
            tracing::debug!("Delivery loop for '{}' finished", id);
        });

        tracing::debug!("Peer '{}' connected", client_id);
        Ok(Arc::new(MemoryTransport {
            client_id: client_id.to_string(),
            sessions: self.sessions.clone(),
            handlers,
        }))
    }

    /// Number of connected peers.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Filters a peer is subscribed to, in subscription order.
    pub fn subscriptions(&self, client_id: &str) -> Vec<String> {
        self.sessions
            .read()
            .get(client_id)
            .map(|s| s.subscriptions.iter().map(|(f, _)| f.clone()).collect())
            .unwrap_or_default()
    }
}

/// One peer's connection to a [`MemoryBroker`]. Dropping it disconnects.
pub struct MemoryTransport {
    client_id: String,
    sessions: Arc<Sessions>,
    handlers: Arc<HandlerChain>,
}

impl MemoryTransport {
    /// Leave the broker; later operations fail with `Disconnected`.
    pub fn disconnect(&self) {
        if self.sessions.write().remove(&self.client_id).is_some() {
            tracing::debug!("Peer '{}' disconnected", self.client_id);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.sessions.read().contains_key(&self.client_id)
    }
}

fn validate_filter(filter: &str) -> Result<(), TransportError> {
    let levels: Vec<&str> = filter.split(topic::SEPARATOR).collect();
    let last = levels.len() - 1;
    let valid = !filter.is_empty()
        && levels.iter().enumerate().all(|(i, level)| {
            let multi = level.contains(topic::MULTI_LEVEL_WILDCARD);
            let single = level.contains(topic::SINGLE_LEVEL_WILDCARD);
            (!multi || (*level == "#" && i == last)) && (!single || *level == "+")
        });
    if valid {
        Ok(())
    } else {
        Err(TransportError::InvalidFilter(filter.to_string()))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), TransportError> {
        validate_filter(filter)?;
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(&self.client_id)
            .ok_or(TransportError::Disconnected)?;
        match session.subscriptions.iter_mut().find(|(f, _)| f == filter) {
            Some(existing) => existing.1 = qos,
            None => session.subscriptions.push((filter.to_string(), qos)),
        }
        tracing::debug!("'{}' subscribed to '{}' at {}", self.client_id, filter, qos);
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), TransportError> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(&self.client_id)
            .ok_or(TransportError::Disconnected)?;
        session.subscriptions.retain(|(f, _)| f != filter);
        tracing::debug!("'{}' unsubscribed from '{}'", self.client_id, filter);
        Ok(())
    }

    async fn publish(&self, message: Message) -> Result<(), TransportError> {
        if message.topic.is_empty()
            || message
                .topic
                .contains([topic::SINGLE_LEVEL_WILDCARD, topic::MULTI_LEVEL_WILDCARD])
        {
            return Err(TransportError::InvalidTopic(message.topic));
        }

        let sessions = self.sessions.read();
        if !sessions.contains_key(&self.client_id) {
            return Err(TransportError::Disconnected);
        }
        for (peer, session) in sessions.iter() {
            let Some(granted) = session.granted_qos(&message.topic) else {
                continue;
            };
            let mut delivery = message.clone();
            delivery.qos = delivery.qos.min(granted);
            if session.outbox.send(delivery).is_err() {
                tracing::warn!("Dropping message for '{}': delivery loop closed", peer);
            }
        }
        Ok(())
    }

    fn handlers(&self) -> &HandlerChain {
        &self.handlers
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}
