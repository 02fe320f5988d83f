// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC server (callee role).
//!
//! The server subscribes `from/+/rpc/to/<self>/qos<N>` for every delivery
//! level, runs each request as its own cancellable task and answers on
//! `from/<self>/rpc_response/to/<caller>`.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped --start()--> Started --stop(t)--> Draining --idle--> Stopped
//!                         |                    |
//!                         +----force_stop()----+----timeout--> Stopped
//! ```

mod context;
mod inflight;
mod resolver;

pub use context::CallContext;
pub use inflight::{CallKey, CallTicket, InFlightCalls};
pub use resolver::{
    Arity, HandlerFuture, Invocation, MethodDescriptor, MethodResolver, ServiceBuilder,
};

use crate::cancel::{first_signal, CancelSource};
use crate::codec::{Codec, CodecRegistry};
use crate::error::{RpcError, RpcFault, RpcResult};
use crate::message::{headers, Message, QoS};
use crate::topic;
use crate::transport::{HandlerId, MessageHandler, Transport};
use async_trait::async_trait;
use inflight::InFlightGuard;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Not subscribed; no calls running
    Stopped,
    /// Accepting requests
    Started,
    /// Unsubscribed, waiting for running calls
    Draining,
}

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    /// Grace period used by callers of [`RpcServer::stop`] that have no
    /// better bound (CLI, config)
    pub drain_timeout: Duration,
    /// Also answer requests sent without a target
    pub serve_broadcasts: bool,
    /// Delivery level for responses
    pub response_qos: QoS,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(30),
            serve_broadcasts: false,
            response_qos: QoS::AtLeastOnce,
        }
    }
}

/// Where and how to answer one request.
struct Reply {
    topic: String,
    id: Option<String>,
    broadcast: bool,
    timeout: Option<Duration>,
    no_response: bool,
}

impl Reply {
    /// Responses are only sent when someone can match them.
    fn wanted(&self) -> bool {
        self.id.is_some() && !self.no_response
    }

    fn message(&self, success: bool, qos: QoS) -> Message {
        let mut message = Message::new(self.topic.clone())
            .with_property(headers::SUCCESS, success)
            .with_qos(qos);
        if let Some(id) = &self.id {
            message.properties.set(headers::ID, id);
        }
        if self.broadcast {
            message.properties.set(headers::BROADCAST, true);
        }
        if let Some(timeout) = self.timeout {
            message.expiry = Some(timeout);
        }
        message
    }
}

struct ServerInner {
    transport: Arc<dyn Transport>,
    codecs: CodecRegistry,
    methods: MethodResolver,
    options: ServerOptions,
    state: watch::Sender<ServerState>,
    /// Serializes start/stop transitions
    lifecycle: tokio::sync::Mutex<()>,
    handler: Mutex<Option<HandlerId>>,
    inflight: Arc<InFlightCalls>,
}

impl ServerInner {
    fn server_id(&self) -> &str {
        self.transport.client_id()
    }

    fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    fn filters(&self) -> Vec<(String, QoS)> {
        let mut filters: Vec<_> = QoS::ALL
            .iter()
            .map(|qos| (topic::request_filter(self.server_id(), *qos), *qos))
            .collect();
        if self.options.serve_broadcasts {
            filters.extend(QoS::ALL.iter().map(|qos| (topic::broadcast_filter(*qos), *qos)));
        }
        filters
    }

    /// Detach the request handler and drop the subscriptions.
    async fn detach(&self) {
        let Some(id) = self.handler.lock().take() else {
            return;
        };
        self.transport.handlers().detach(id);
        for (filter, _) in self.filters() {
            if let Err(e) = self.transport.unsubscribe(&filter).await {
                tracing::warn!("Failed to unsubscribe '{}': {}", filter, e);
            }
        }
    }

    fn accept(self: &Arc<Self>, source: &str, message: &Message) {
        let props = &message.properties;
        let Some(method) = props.get(headers::METHOD) else {
            tracing::warn!("Dropping request without method on '{}'", message.topic);
            return;
        };
        let reply = Reply {
            topic: topic::response_topic(self.server_id(), source),
            id: props
                .get(headers::ID)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            broadcast: props.get_bool(headers::BROADCAST).unwrap_or(false),
            timeout: props
                .get_parsed::<u64>(headers::TIMEOUT)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            no_response: props.get_bool(headers::NO_RESPONSE).unwrap_or(false),
        };

        let Some(descriptor) = self.methods.get(method).cloned() else {
            if !reply.wanted() {
                tracing::debug!("Unknown method '{}' from '{}', no response wanted", method, source);
                return;
            }
            tracing::debug!("Unknown method '{}' from '{}'", method, source);
            let server = self.clone();
            let fault = RpcFault::method_not_found(method);
            tokio::spawn(async move { server.respond(&reply, Err(fault), None).await });
            return;
        };

        if let Arity::Multiple(count) = descriptor.arity() {
            tracing::error!(
                "Method '{}' takes {} parameters; multi-parameter methods are not dispatched, use a single record argument",
                method,
                count
            );
            return;
        }

        let codec = match self.codecs.resolve(message.content_type.as_deref()) {
            Ok(codec) => codec.clone(),
            Err(_) => match self.codecs.resolve(None) {
                Ok(codec) => codec.clone(),
                Err(e) => {
                    tracing::error!("No codec to decode '{}': {}", method, e);
                    return;
                }
            },
        };

        let token = CancellationToken::new();
        let Some(ticket) = self.inflight.insert(reply.id.as_deref(), token.clone()) else {
            tracing::error!(
                "Correlation id {:?} from '{}' is already running; dropping duplicate",
                reply.id,
                source
            );
            return;
        };
        let guard = InFlightGuard {
            calls: self.inflight.clone(),
            ticket,
        };
        if self.state() != ServerState::Started {
            tracing::debug!("Server stopping, dropping '{}' from '{}'", method, source);
            return;
        }

        let context = CallContext::new(
            source,
            reply.id.as_deref(),
            method,
            reply.broadcast,
            reply.timeout,
            token.clone(),
        );
        let invocation = Invocation {
            context,
            codec: codec.clone(),
            payload: message.payload.clone(),
        };
        tracing::debug!("Dispatching '{}' from '{}' (id={:?})", method, source, reply.id);

        let server = self.clone();
        let method = method.to_string();
        tokio::spawn(async move {
            let outcome = run_call(&descriptor, invocation, reply.timeout, &token).await;
            if let Err(fault) = &outcome {
                tracing::debug!("'{}' failed: {}", method, fault);
            }
            server.respond(&reply, outcome, Some(codec)).await;
            drop(guard);
        });
    }

    async fn respond(
        &self,
        reply: &Reply,
        outcome: Result<Value, RpcFault>,
        codec: Option<Arc<dyn Codec>>,
    ) {
        if !reply.wanted() {
            return;
        }
        let qos = self.options.response_qos;
        let encoded = match outcome {
            Ok(value) => {
                let codec = match codec {
                    Some(codec) => codec,
                    None => match self.codecs.resolve(None) {
                        Ok(codec) => codec.clone(),
                        Err(e) => {
                            tracing::error!("No codec for response: {}", e);
                            return;
                        }
                    },
                };
                codec
                    .serialize(&value)
                    .map(|payload| (codec, payload))
                    .map_err(RpcFault::from)
            }
            Err(fault) => Err(fault),
        };
        let response = match encoded {
            Ok((codec, payload)) => reply.message(true, qos).with_payload(
                codec.content_type(),
                payload,
                codec.is_utf8(),
            ),
            Err(fault) => reply
                .message(false, qos)
                .with_property(headers::ERROR_CODE, fault.code)
                .with_property(headers::ERROR_MESSAGE, &fault.message),
        };
        if let Err(e) = self.transport.publish(response).await {
            tracing::error!("Failed to publish response on '{}': {}", reply.topic, e);
        }
    }
}

/// Run a handler until it finishes, its deadline passes or the server
/// cancels it.
async fn run_call(
    descriptor: &MethodDescriptor,
    invocation: Invocation,
    timeout: Option<Duration>,
    token: &CancellationToken,
) -> Result<Value, RpcFault> {
    let method = descriptor.name().to_string();
    let mut task = tokio::spawn(descriptor.invoke(invocation));
    tokio::select! {
        biased;
        joined = &mut task => match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => {
                tracing::error!("Handler '{}' panicked", method);
                Err(RpcFault::internal(format!("Handler '{}' panicked", method)))
            }
            Err(_) => Err(RpcFault::unavailable()),
        },
        source = first_signal(timeout, Some(token)) => {
            task.abort();
            token.cancel();
            match (source, timeout) {
                (CancelSource::Timeout, Some(after)) => {
                    tracing::warn!("Handler '{}' exceeded its {:?} deadline", method, after);
                    Err(RpcFault::timeout(after))
                }
                _ => Err(RpcFault::unavailable()),
            }
        }
    }
}

impl Drop for ServerInner {
    fn drop(&mut self) {
        if let Some(id) = self.handler.get_mut().take() {
            self.transport.handlers().detach(id);
        }
        self.inflight.cancel_all();
    }
}

/// Receives requests for a server without keeping it alive.
struct RequestHandler {
    server: Weak<ServerInner>,
}

#[async_trait]
impl MessageHandler for RequestHandler {
    async fn handle_message(&self, message: &Message) -> RpcResult<()> {
        let Some(server) = self.server.upgrade() else {
            return Ok(());
        };
        let Some(route) = topic::parse_request_topic(&message.topic) else {
            return Ok(());
        };
        match route.target {
            Some(target) if target != server.server_id() => return Ok(()),
            None if !server.options.serve_broadcasts => return Ok(()),
            _ => {}
        }
        if server.state() != ServerState::Started {
            tracing::debug!("Server not started, dropping request on '{}'", message.topic);
            return Ok(());
        }
        server.accept(route.source, message);
        Ok(())
    }
}

/// RPC server bound to one transport connection.
#[derive(Clone)]
pub struct RpcServer {
    inner: Arc<ServerInner>,
}

impl RpcServer {
    /// Create a stopped server. Call [`RpcServer::start`] to accept requests.
    pub fn new(
        transport: Arc<dyn Transport>,
        codecs: CodecRegistry,
        methods: MethodResolver,
        options: ServerOptions,
    ) -> RpcResult<Self> {
        topic::validate_identity(transport.client_id())?;
        codecs.resolve(None)?;
        let (state, _) = watch::channel(ServerState::Stopped);
        Ok(Self {
            inner: Arc::new(ServerInner {
                transport,
                codecs,
                methods,
                options,
                state,
                lifecycle: tokio::sync::Mutex::new(()),
                handler: Mutex::new(None),
                inflight: Arc::new(InFlightCalls::new()),
            }),
        })
    }

    pub fn server_id(&self) -> &str {
        self.inner.server_id()
    }

    pub fn state(&self) -> ServerState {
        self.inner.state()
    }

    pub fn is_started(&self) -> bool {
        self.state() == ServerState::Started
    }

    pub fn methods(&self) -> &MethodResolver {
        &self.inner.methods
    }

    pub fn options(&self) -> &ServerOptions {
        &self.inner.options
    }

    /// Number of handler invocations still running.
    pub fn in_flight_calls(&self) -> usize {
        self.inner.inflight.len()
    }

    /// Attach to the transport and subscribe the request filters.
    /// Starting a started server is a no-op.
    pub async fn start(&self) -> RpcResult<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        match self.state() {
            ServerState::Started => return Ok(()),
            ServerState::Draining => {
                return Err(RpcError::InvalidState("server is still draining".into()))
            }
            ServerState::Stopped => {}
        }

        let transport = &self.inner.transport;
        let id = transport.handlers().attach(Arc::new(RequestHandler {
            server: Arc::downgrade(&self.inner),
        }));
        *self.inner.handler.lock() = Some(id);

        for (filter, qos) in self.inner.filters() {
            if let Err(e) = transport.subscribe(&filter, qos).await {
                tracing::error!("Failed to subscribe '{}': {}", filter, e);
                self.inner.detach().await;
                return Err(e.into());
            }
        }

        self.inner.state.send_replace(ServerState::Started);
        tracing::info!(
            "RpcServer '{}' started with {} methods",
            self.server_id(),
            self.inner.methods.len()
        );
        Ok(())
    }

    /// Stop accepting requests and wait up to `timeout` for running calls,
    /// then [`force_stop`](Self::force_stop) whatever is left.
    pub async fn stop(&self, timeout: Duration) -> RpcResult<()> {
        {
            let _lifecycle = self.inner.lifecycle.lock().await;
            if self.state() != ServerState::Started {
                return Ok(());
            }
            self.inner.state.send_replace(ServerState::Draining);
            self.inner.detach().await;
        }

        tracing::info!(
            "Stopping RpcServer '{}', waiting for {} calls",
            self.server_id(),
            self.in_flight_calls()
        );
        match tokio::time::timeout(timeout, self.inner.inflight.wait_idle()).await {
            Ok(()) => {
                let _lifecycle = self.inner.lifecycle.lock().await;
                if self.state() == ServerState::Draining {
                    self.inner.state.send_replace(ServerState::Stopped);
                }
                tracing::info!("RpcServer '{}' has stopped", self.server_id());
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    "Stopping RpcServer '{}' timed out after {:?}, forcing stop",
                    self.server_id(),
                    timeout
                );
                self.force_stop().await
            }
        }
    }

    /// Detach immediately, cancel every running call and mark the server stopped.
    pub async fn force_stop(&self) -> RpcResult<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.detach().await;
        let cancelled = self.inner.inflight.cancel_all();
        self.inner.state.send_replace(ServerState::Stopped);
        tracing::info!(
            "RpcServer '{}' has forced stop ({} calls cancelled)",
            self.server_id(),
            cancelled
        );
        Ok(())
    }

    /// Resolve once the server is stopped.
    pub async fn wait(&self) {
        let mut state = self.inner.state.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = state.wait_for(|s| *s == ServerState::Stopped).await;
    }
}
