// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for bus RPC operations.

use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::transport::TransportError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for RPC operations
pub type RpcResult<T> = Result<T, RpcError>;

/// Errors that can occur during RPC operations
#[derive(Debug, Error)]
pub enum RpcError {
    /// Remote peer answered with `Success=false`
    #[error("Remote error {code}: {message}")]
    Remote { code: i32, message: String },

    /// No response arrived before the call timeout elapsed
    #[error("RPC call '{method}' timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    /// Caller-supplied cancellation fired before a response arrived
    #[error("RPC call cancelled")]
    Cancelled,

    /// Client or server was shut down while the call was pending
    #[error("RPC endpoint shut down")]
    Shutdown,

    /// Two services expose the same method name
    #[error(
        "Method '{name}' in '{duplicate}' is already registered by '{registered}'; \
         methods cannot be registered with duplicate names"
    )]
    DuplicateMethod {
        name: String,
        registered: &'static str,
        duplicate: &'static str,
    },

    /// Method name is empty or contains a topic separator/wildcard
    #[error("Invalid method name: {0:?}")]
    InvalidMethodName(String),

    /// Peer identity cannot be used as a topic segment
    #[error("Invalid peer identity: {0:?}")]
    InvalidIdentity(String),

    /// No codec registered for a content type
    #[error("No codec registered for content type '{0}'")]
    CodecNotFound(String),

    /// Payload encoding or decoding failed
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Pub/sub transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Local bookkeeping invariant broken (e.g. correlation id collision)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Operation not allowed in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RpcError {
    /// Build a remote error from a response's error properties.
    pub fn remote(code: i32, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
        }
    }

    /// Remote error code, if this is a remote error.
    pub fn remote_code(&self) -> Option<i32> {
        match self {
            Self::Remote { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True for a remote "method not found" answer.
    pub fn is_method_not_found(&self) -> bool {
        self.remote_code() == Some(RpcFault::METHOD_NOT_FOUND)
    }

    /// True for a communication timeout (not caller cancellation).
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// True when the caller's own cancellation ended the call.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Failure reported by a handler, published as `ErrorCode`/`ErrorMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcFault {
    /// Error code carried in the `ErrorCode` property
    pub code: i32,
    /// Human-readable message carried in `ErrorMessage`
    pub message: String,
}

impl RpcFault {
    /// Arguments could not be decoded into the handler's parameter
    pub const INVALID_ARGUMENT: i32 = 400;
    /// No handler registered under the requested name
    pub const METHOD_NOT_FOUND: i32 = 404;
    /// Handler did not finish before the request's `Timeout`
    pub const TIMEOUT: i32 = 408;
    /// Handler failed or panicked
    pub const INTERNAL: i32 = 500;
    /// Handler was cancelled because the server shut down
    pub const UNAVAILABLE: i32 = 503;

    /// Create a fault with an explicit code.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_ARGUMENT, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(Self::METHOD_NOT_FOUND, format!("Method '{}' not found.", method))
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            Self::TIMEOUT,
            format!("Handler did not complete within {:?}", after),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, message)
    }

    pub fn unavailable() -> Self {
        Self::new(Self::UNAVAILABLE, "Server is shutting down")
    }
}

impl fmt::Display for RpcFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for RpcFault {}

impl From<CodecError> for RpcFault {
    fn from(e: CodecError) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<RpcFault> for RpcError {
    fn from(fault: RpcFault) -> Self {
        Self::Remote {
            code: fault.code,
            message: fault.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_method_names_both_types() {
        let err = RpcError::DuplicateMethod {
            name: "Ping".to_string(),
            registered: "app::PingService",
            duplicate: "app::OtherService",
        };
        let text = err.to_string();
        assert!(text.contains("Ping"));
        assert!(text.contains("app::PingService"));
        assert!(text.contains("app::OtherService"));
    }

    #[test]
    fn remote_code_helpers() {
        let err = RpcError::remote(404, "Method 'Nope' not found.");
        assert!(err.is_method_not_found());
        assert_eq!(err.remote_code(), Some(404));
        assert!(!err.is_timeout());

        let err = RpcError::Timeout {
            method: "Ping".into(),
            after: Duration::from_millis(50),
        };
        assert!(err.is_timeout());
        assert!(err.to_string().contains("timed out"));
        assert_eq!(err.remote_code(), None);
    }

    #[test]
    fn fault_into_remote_error() {
        let err: RpcError = RpcFault::invalid_argument("bad input").into();
        assert!(matches!(
            err,
            RpcError::Remote {
                code: RpcFault::INVALID_ARGUMENT,
                ..
            }
        ));
    }
}
