// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publish/subscribe transport contract.
//!
//! The RPC layer only needs four things from a message bus: publish a
//! message, subscribe and unsubscribe topic filters, and a way to observe
//! every inbound message. Inbound delivery goes through a [`HandlerChain`]
//! owned by the transport; the client and the server each attach one
//! handler and detach it when they shut down.

mod memory;

pub use memory::{MemoryBroker, MemoryTransport};

use crate::error::RpcResult;
use crate::message::{Message, QoS};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport disconnected")]
    Disconnected,

    #[error("Client id '{0}' is already connected")]
    DuplicateClientId(String),

    #[error("Invalid topic filter: {0:?}")]
    InvalidFilter(String),

    #[error("Invalid publish topic: {0:?}")]
    InvalidTopic(String),

    #[error("No async runtime available")]
    NoRuntime,
}

/// Message bus as seen by one connected peer.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Identity of this peer on the bus.
    fn client_id(&self) -> &str;

    /// Subscribe a topic filter at the given maximum delivery level.
    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), TransportError>;

    /// Remove a subscription. Unknown filters are ignored.
    async fn unsubscribe(&self, filter: &str) -> Result<(), TransportError>;

    async fn publish(&self, message: Message) -> Result<(), TransportError>;

    /// Handlers receiving every inbound message.
    fn handlers(&self) -> &HandlerChain;
}

/// Receiver of inbound messages.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle_message(&self, message: &Message) -> RpcResult<()>;
}

/// Identifies an attached handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

/// Ordered list of message handlers.
///
/// Handlers run one after another in attach order. A failing handler is
/// logged and the message still reaches the handlers after it.
#[derive(Default)]
pub struct HandlerChain {
    handlers: RwLock<Vec<(HandlerId, Arc<dyn MessageHandler>)>>,
    next_id: AtomicU64,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to the end of the chain.
    pub fn attach(&self, handler: Arc<dyn MessageHandler>) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, handler));
        id
    }

    /// Remove a handler. Returns false if it was not attached.
    pub fn detach(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != id);
        handlers.len() < before
    }

    /// Deliver a message to every handler.
    pub async fn dispatch(&self, message: &Message) {
        // Snapshot so handlers may attach/detach while running.
        let handlers: Vec<_> = self.handlers.read().clone();
        for (id, handler) in handlers {
            if let Err(e) = handler.handle_message(message).await {
                tracing::warn!("{} failed on '{}': {}", id, message.topic, e);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("handlers", &self.len())
            .finish()
    }
}
