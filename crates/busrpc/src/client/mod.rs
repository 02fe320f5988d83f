// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC client (caller role).
//!
//! The client publishes requests on `from/<self>/rpc/to/<target>/qos<N>`
//! and waits for the matching response on `from/<target>/rpc_response/to/<self>`.
//! Responses are matched purely by the `Id` property, so they may arrive
//! in any order.
//!
//! # Example
//!
//! ```rust,no_run
//! use busrpc::{CallOptions, CodecRegistry, MemoryBroker, RpcClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let broker = MemoryBroker::new();
//! let client = RpcClient::new(broker.connect("alice")?, CodecRegistry::with_defaults())?;
//!
//! let pong: String = client
//!     .call("bob", "Ping", "Ping", CallOptions::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod pending;

pub use pending::PendingCalls;

use crate::cancel::{first_signal, CancelSource};
use crate::codec::CodecRegistry;
use crate::error::{RpcError, RpcResult};
use crate::message::{headers, Message, QoS};
use crate::topic;
use crate::transport::{HandlerId, MessageHandler, Transport};
use async_trait::async_trait;
use pending::PendingGuard;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Client-wide defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Timeout applied when a call does not set one; `None` waits forever
    pub default_timeout: Option<Duration>,
    /// Delivery level for requests
    pub default_qos: QoS,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            default_timeout: Some(Duration::from_secs(10)),
            default_qos: QoS::AtLeastOnce,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
enum Deadline {
    #[default]
    ClientDefault,
    After(Duration),
    Never,
}

/// Per-call settings.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    qos: Option<QoS>,
    deadline: Deadline,
    content_type: Option<String>,
    cancellation: Option<CancellationToken>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn qos(mut self, qos: QoS) -> Self {
        self.qos = Some(qos);
        self
    }

    /// Give up after `timeout`; also sent to the server as the handler
    /// deadline, in whole seconds rounded up.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Deadline::After(timeout);
        self
    }

    /// Wait until a response or a cancellation, ignoring the client default.
    pub fn no_timeout(mut self) -> Self {
        self.deadline = Deadline::Never;
        self
    }

    /// Encode the request with the codec registered for `content_type`.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Abandon the call when `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    fn resolve_timeout(&self, default: Option<Duration>) -> Option<Duration> {
        match self.deadline {
            Deadline::ClientDefault => default,
            Deadline::After(timeout) => Some(timeout),
            Deadline::Never => None,
        }
    }
}

/// Completes pending calls from inbound responses.
struct ResponseHandler {
    caller: String,
    pending: Arc<PendingCalls>,
}

#[async_trait]
impl MessageHandler for ResponseHandler {
    async fn handle_message(&self, message: &Message) -> RpcResult<()> {
        if !topic::is_response_for(&message.topic, &self.caller) {
            return Ok(());
        }
        let Some(id) = message.property(headers::ID) else {
            tracing::debug!("Ignoring response without id on '{}'", message.topic);
            return Ok(());
        };
        if !self.pending.complete(id, message.clone()) {
            tracing::debug!("Dropping response for unknown call '{}'", id);
        }
        Ok(())
    }
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    codecs: CodecRegistry,
    options: ClientOptions,
    pending: Arc<PendingCalls>,
    handler: OnceCell<HandlerId>,
    closed: AtomicBool,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(id) = self.handler.get() {
            self.transport.handlers().detach(*id);
        }
        self.pending.clear();
    }
}

/// RPC client bound to one transport connection.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

impl RpcClient {
    /// Create a client with default options.
    pub fn new(transport: Arc<dyn Transport>, codecs: CodecRegistry) -> RpcResult<Self> {
        Self::with_options(transport, codecs, ClientOptions::default())
    }

    pub fn with_options(
        transport: Arc<dyn Transport>,
        codecs: CodecRegistry,
        options: ClientOptions,
    ) -> RpcResult<Self> {
        topic::validate_identity(transport.client_id())?;
        codecs.resolve(None)?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                transport,
                codecs,
                options,
                pending: Arc::new(PendingCalls::new()),
                handler: OnceCell::new(),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// This peer's identity.
    pub fn client_id(&self) -> &str {
        self.inner.transport.client_id()
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.inner.codecs
    }

    /// Calls currently waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Call `method` on `target` and decode its result.
    pub async fn call<A, R>(
        &self,
        target: &str,
        method: &str,
        args: &A,
        options: CallOptions,
    ) -> RpcResult<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.invoke(Some(target), method, args, options).await
    }

    /// Call `method` on every peer serving broadcasts; the first response wins.
    pub async fn broadcast<A, R>(&self, method: &str, args: &A, options: CallOptions) -> RpcResult<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.invoke(None, method, args, options).await
    }

    async fn invoke<A, R>(
        &self,
        target: Option<&str>,
        method: &str,
        args: &A,
        options: CallOptions,
    ) -> RpcResult<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let codec = self
            .inner
            .codecs
            .resolve(options.content_type.as_deref())?
            .clone();
        let payload = codec.serialize(args)?;
        let options = options.content_type(codec.content_type());
        let response = self.call_raw(target, method, payload, options).await?;
        self.decode(&response)
    }

    /// Send pre-encoded bytes and return the successful response message.
    ///
    /// `target == None` sends a broadcast request. A response with
    /// `Success=false` is returned as [`RpcError::Remote`].
    pub async fn call_raw(
        &self,
        target: Option<&str>,
        method: &str,
        payload: Vec<u8>,
        options: CallOptions,
    ) -> RpcResult<Message> {
        self.ensure_open()?;
        self.ensure_subscribed().await?;

        let timeout = options.resolve_timeout(self.inner.options.default_timeout);
        let id = Uuid::new_v4().simple().to_string();
        let request = self
            .build_request(target, method, payload, &options, timeout)?
            .with_property(headers::ID, &id);

        let rx = self.inner.pending.insert(&id)?;
        let _guard = PendingGuard {
            calls: self.inner.pending.clone(),
            id: id.clone(),
        };

        tracing::debug!("Calling '{}' on {:?} (id={})", method, target, id);
        self.inner.transport.publish(request).await?;

        let response = tokio::select! {
            biased;
            response = rx => response.map_err(|_| RpcError::Shutdown)?,
            source = first_signal(timeout, options.cancellation.as_ref()) => {
                return Err(match (source, timeout) {
                    (CancelSource::Timeout, Some(after)) => RpcError::Timeout {
                        method: method.to_string(),
                        after,
                    },
                    _ => RpcError::Cancelled,
                });
            }
        };
        check_response(response)
    }

    /// Publish a request that expects no response. No call is tracked.
    pub async fn fire_and_forget<A>(
        &self,
        target: Option<&str>,
        method: &str,
        args: &A,
        options: CallOptions,
    ) -> RpcResult<()>
    where
        A: Serialize + ?Sized,
    {
        self.ensure_open()?;
        let codec = self
            .inner
            .codecs
            .resolve(options.content_type.as_deref())?
            .clone();
        let payload = codec.serialize(args)?;
        let options = options.content_type(codec.content_type());
        // Only an explicit timeout bounds the handler; there is no reply to wait for.
        let timeout = options.resolve_timeout(None);
        let request = self
            .build_request(target, method, payload, &options, timeout)?
            .with_property(headers::NO_RESPONSE, true);

        tracing::debug!("Fire-and-forget '{}' to {:?}", method, target);
        self.inner.transport.publish(request).await?;
        Ok(())
    }

    /// Detach from the transport and fail every pending call with `Shutdown`.
    pub async fn close(&self) -> RpcResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(id) = self.inner.handler.get() {
            self.inner.transport.handlers().detach(*id);
            let filter = topic::response_filter(self.client_id());
            self.inner.transport.unsubscribe(&filter).await?;
        }
        let failed = self.inner.pending.clear();
        tracing::info!(
            "RpcClient '{}' closed ({} pending calls cancelled)",
            self.client_id(),
            failed
        );
        Ok(())
    }

    fn ensure_open(&self) -> RpcResult<()> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(RpcError::Shutdown);
        }
        Ok(())
    }

    async fn ensure_subscribed(&self) -> RpcResult<()> {
        self.inner
            .handler
            .get_or_try_init(|| async {
                let transport = &self.inner.transport;
                let id = transport.handlers().attach(Arc::new(ResponseHandler {
                    caller: transport.client_id().to_string(),
                    pending: self.inner.pending.clone(),
                }));
                let filter = topic::response_filter(transport.client_id());
                if let Err(e) = transport.subscribe(&filter, QoS::AtLeastOnce).await {
                    transport.handlers().detach(id);
                    return Err(RpcError::from(e));
                }
                tracing::debug!("Subscribed to responses on '{}'", filter);
                Ok(id)
            })
            .await?;
        Ok(())
    }

    fn build_request(
        &self,
        target: Option<&str>,
        method: &str,
        payload: Vec<u8>,
        options: &CallOptions,
        timeout: Option<Duration>,
    ) -> RpcResult<Message> {
        topic::validate_method_name(method)?;
        if let Some(target) = target {
            topic::validate_identity(target)?;
        }

        let (content_type, utf8) = match options.content_type.as_deref() {
            Some(content_type) => {
                let utf8 = self
                    .inner
                    .codecs
                    .get(content_type)
                    .is_some_and(|c| c.is_utf8());
                (content_type.to_string(), utf8)
            }
            None => {
                let codec = self.inner.codecs.resolve(None)?;
                (codec.content_type().to_string(), codec.is_utf8())
            }
        };

        let qos = options.qos.unwrap_or(self.inner.options.default_qos);
        let mut request = Message::new(topic::request_topic(self.client_id(), target, qos))
            .with_payload(&content_type, payload, utf8)
            .with_property(headers::METHOD, method)
            .with_qos(qos);
        if target.is_none() {
            request.properties.set(headers::BROADCAST, true);
        }
        if let Some(timeout) = timeout {
            let secs = timeout_header_secs(timeout);
            request = request
                .with_property(headers::TIMEOUT, secs)
                .with_expiry(Duration::from_secs(secs));
        }
        Ok(request)
    }

    fn decode<R: DeserializeOwned>(&self, response: &Message) -> RpcResult<R> {
        let codec = self.inner.codecs.resolve(response.content_type.as_deref())?;
        Ok(codec.deserialize(&response.payload)?)
    }
}

/// `Timeout` header value: whole seconds, rounded up so a sub-second
/// timeout never reads as "no deadline".
fn timeout_header_secs(timeout: Duration) -> u64 {
    timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0)
}

/// Turn a `Success=false` response into a remote error. A missing flag
/// counts as failure.
fn check_response(response: Message) -> RpcResult<Message> {
    if response.properties.get_bool(headers::SUCCESS).unwrap_or(false) {
        return Ok(response);
    }
    let code = response
        .properties
        .get_parsed::<i32>(headers::ERROR_CODE)
        .unwrap_or(0);
    let message = response
        .property(headers::ERROR_MESSAGE)
        .unwrap_or_default()
        .to_string();
    Err(RpcError::remote(code, message))
}
