// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/Response RPC over publish/subscribe message buses
//!
//! Turns an MQTT-style topic bus into a bidirectional RPC channel: any
//! peer can expose named methods and any peer can call them, with
//! correlation, timeouts, cancellation and graceful shutdown handled here.
//!
//! # Features
//!
//! - **Caller**: typed and raw calls, fire-and-forget, broadcast calls,
//!   per-call timeout and cancellation token
//! - **Dispatcher**: explicit method registration, per-request tasks,
//!   handler deadlines, draining and forced shutdown
//! - **Codecs**: JSON and BSON payloads selected by content type
//! - **Transport**: any bus implementing [`Transport`]; an in-memory
//!   broker is included
//!
//! # Topic Naming
//!
//! For caller `A` invoking callee `B` at QoS 1:
//! - Request topic: `from/A/rpc/to/B/qos1`
//! - Response topic: `from/B/rpc_response/to/A`
//!
//! The method name, correlation id, timeout and flags travel as message
//! properties (`Method`, `Id`, `Timeout`, `Success`, `ErrorCode`,
//! `ErrorMessage`, `Broadcast`, `NoResponse`).
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use busrpc::{
//!     CallOptions, CodecRegistry, MemoryBroker, MethodResolver, RpcClient, RpcFault, RpcServer,
//!     ServerOptions, ServiceBuilder,
//! };
//! use std::sync::Arc;
//!
//! struct PingService;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = MemoryBroker::new();
//!
//! let methods = MethodResolver::new().with_service(
//!     ServiceBuilder::new(Arc::new(PingService)).method("Ping", |_svc, _ctx, msg: String| async move {
//!         Ok::<_, RpcFault>(if msg == "Ping" { "Pong".to_string() } else { msg })
//!     }),
//! )?;
//! let server = RpcServer::new(
//!     broker.connect("bob")?,
//!     CodecRegistry::with_defaults(),
//!     methods,
//!     ServerOptions::default(),
//! )?;
//! server.start().await?;
//!
//! let client = RpcClient::new(broker.connect("alice")?, CodecRegistry::with_defaults())?;
//! let pong: String = client.call("bob", "Ping", "Ping", CallOptions::new()).await?;
//! assert_eq!(pong, "Pong");
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod message;
pub mod server;
pub mod topic;
pub mod transport;

pub use client::{CallOptions, ClientOptions, RpcClient};
#[cfg(feature = "bson")]
pub use codec::BsonCodec;
pub use codec::{Codec, CodecError, CodecRegistry, JsonCodec, Shape};
pub use config::{ConfigError, RpcConfig};
pub use error::{RpcError, RpcFault, RpcResult};
pub use message::{headers, Message, Properties, QoS};
pub use server::{
    Arity, CallContext, MethodDescriptor, MethodResolver, RpcServer, ServerOptions, ServerState,
    ServiceBuilder,
};
pub use transport::{
    HandlerChain, HandlerId, MemoryBroker, MemoryTransport, MessageHandler, Transport,
    TransportError,
};
