// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint configuration.
//!
//! Supports both programmatic and file-based (TOML) configuration.
//!
//! ```toml
//! peer_id = "calculator"
//! codecs = ["application/json", "application/bson"]
//! log_level = "info"
//!
//! [client]
//! default_timeout_ms = 10000
//! default_qos = "at_least_once"
//!
//! [server]
//! drain_timeout_ms = 30000
//! serve_broadcasts = false
//! response_qos = "at_least_once"
//! ```

use crate::client::ClientOptions;
use crate::codec::{self, CodecRegistry};
use crate::message::QoS;
use crate::server::ServerOptions;
use crate::topic;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Identity on the bus (client id).
    #[serde(default = "default_peer_id")]
    pub peer_id: String,

    /// Codec content types in preference order; the first is the default.
    #[serde(default = "default_codecs")]
    pub codecs: Vec<String>,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Caller settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Dispatcher settings.
    #[serde(default)]
    pub server: ServerConfig,
}

fn default_peer_id() -> String {
    "busrpc".to_string()
}

fn default_codecs() -> Vec<String> {
    CodecRegistry::with_defaults()
        .content_types()
        .map(str::to_string)
        .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_drain_timeout_ms() -> u64 {
    30_000
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            peer_id: default_peer_id(),
            codecs: default_codecs(),
            log_level: default_log_level(),
            client: ClientConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Caller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Call timeout when a call sets none (milliseconds, 0 = wait forever).
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Delivery level for requests.
    #[serde(default)]
    pub default_qos: QoS,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            default_qos: QoS::default(),
        }
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Grace period for running calls on stop (milliseconds).
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// Answer requests sent without a target.
    #[serde(default)]
    pub serve_broadcasts: bool,

    /// Delivery level for responses.
    #[serde(default)]
    pub response_qos: QoS,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: default_drain_timeout_ms(),
            serve_broadcasts: false,
            response_qos: QoS::default(),
        }
    }
}

impl RpcConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        topic::validate_identity(&self.peer_id)
            .map_err(|_| ConfigError::Invalid(format!("Invalid peer id {:?}", self.peer_id)))?;

        if self.codecs.is_empty() {
            return Err(ConfigError::Invalid("No codecs configured".into()));
        }
        for (i, content_type) in self.codecs.iter().enumerate() {
            if codec::builtin(content_type).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "Codec {} has unknown content type '{}'",
                    i, content_type
                )));
            }
            if self.codecs[..i]
                .iter()
                .any(|c| c.eq_ignore_ascii_case(content_type))
            {
                return Err(ConfigError::Invalid(format!(
                    "Codec '{}' listed more than once",
                    content_type
                )));
            }
        }

        if self.server.drain_timeout_ms == 0 {
            return Err(ConfigError::Invalid("drain_timeout_ms must be positive".into()));
        }

        Ok(())
    }

    /// Codec registry in configured order.
    pub fn codec_registry(&self) -> Result<CodecRegistry, ConfigError> {
        CodecRegistry::from_content_types(&self.codecs).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            default_timeout: (self.client.default_timeout_ms > 0)
                .then(|| Duration::from_millis(self.client.default_timeout_ms)),
            default_qos: self.client.default_qos,
        }
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            drain_timeout: Duration::from_millis(self.server.drain_timeout_ms),
            serve_broadcasts: self.server.serve_broadcasts,
            response_qos: self.server.response_qos,
        }
    }
}

impl std::str::FromStr for RpcConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
