// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-call context handed to every handler.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Who called, under which id, and until when.
#[derive(Debug, Clone)]
pub struct CallContext {
    caller: String,
    correlation_id: Option<String>,
    method: String,
    broadcast: bool,
    timeout: Option<Duration>,
    received_at: Instant,
    cancellation: CancellationToken,
}

impl CallContext {
    pub(crate) fn new(
        caller: &str,
        correlation_id: Option<&str>,
        method: &str,
        broadcast: bool,
        timeout: Option<Duration>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            caller: caller.to_string(),
            correlation_id: correlation_id.map(str::to_string),
            method: method.to_string(),
            broadcast,
            timeout,
            received_at: Instant::now(),
            cancellation,
        }
    }

    /// Identity of the calling peer.
    pub fn caller(&self) -> &str {
        &self.caller
    }

    /// `None` for fire-and-forget requests.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request was sent to every peer rather than to this one.
    pub fn is_broadcast(&self) -> bool {
        self.broadcast
    }

    /// Timeout requested by the caller.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Instant after which the result is no longer wanted.
    pub fn deadline(&self) -> Option<Instant> {
        self.timeout.map(|t| self.received_at + t)
    }

    /// Time left before the deadline; `None` without a timeout.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fires when the call times out or the server stops.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
