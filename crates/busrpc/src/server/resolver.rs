// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Method registration and lookup.
//!
//! Services expose handlers through a [`ServiceBuilder`]; each handler is
//! type-erased into a [`MethodDescriptor`] that decodes its own argument
//! and encodes its own result through `serde_json::Value`. The resulting
//! [`MethodResolver`] is immutable: adding services builds a new table.

use super::context::CallContext;
use crate::codec::Codec;
use crate::error::{RpcError, RpcFault, RpcResult};
use crate::topic;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed handler future producing the encoded-to-be result.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, RpcFault>> + Send + 'static>>;

/// Everything a handler invocation receives.
pub struct Invocation {
    pub context: CallContext,
    /// Codec used to decode the argument (request content type or default)
    pub codec: Arc<dyn Codec>,
    /// Raw request payload
    pub payload: Vec<u8>,
}

type Invoker = Arc<dyn Fn(Invocation) -> HandlerFuture + Send + Sync>;

/// Parameter list of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No argument; the payload is ignored
    Nullary,
    /// One argument decoded from the payload
    Unary,
    /// The payload bytes, unmodified
    RawBytes,
    /// Several arguments; never dispatched
    Multiple(usize),
}

/// A callable method with its exposed name.
#[derive(Clone)]
pub struct MethodDescriptor {
    name: String,
    declaring_type: &'static str,
    arity: Arity,
    invoker: Invoker,
}

impl MethodDescriptor {
    /// Low-level constructor for handlers not built through [`ServiceBuilder`].
    pub fn new<F>(name: &str, declaring_type: &'static str, arity: Arity, invoker: F) -> RpcResult<Self>
    where
        F: Fn(Invocation) -> HandlerFuture + Send + Sync + 'static,
    {
        topic::validate_method_name(name)?;
        Ok(Self {
            name: name.to_string(),
            declaring_type,
            arity,
            invoker: Arc::new(invoker),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type that registered the method.
    pub fn declaring_type(&self) -> &'static str {
        self.declaring_type
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub(crate) fn invoke(&self, invocation: Invocation) -> HandlerFuture {
        (self.invoker)(invocation)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("declaring_type", &self.declaring_type)
            .field("arity", &self.arity)
            .finish()
    }
}

fn decode_argument<A: DeserializeOwned>(invocation: &Invocation) -> Result<A, RpcFault> {
    invocation
        .codec
        .deserialize::<A>(&invocation.payload)
        .map_err(|e| {
            RpcFault::invalid_argument(format!(
                "Cannot decode argument of '{}': {}",
                invocation.context.method(),
                e
            ))
        })
}

fn encode_result<R: Serialize>(result: Result<R, RpcFault>) -> Result<Value, RpcFault> {
    let value = result?;
    serde_json::to_value(value).map_err(|e| RpcFault::internal(format!("Cannot encode result: {}", e)))
}

async fn run_blocking<R, F>(method: String, f: F) -> Result<Value, RpcFault>
where
    R: Serialize + Send + 'static,
    F: FnOnce() -> Result<R, RpcFault> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => encode_result(result),
        Err(e) if e.is_panic() => Err(RpcFault::internal(format!("Handler '{}' panicked", method))),
        Err(_) => Err(RpcFault::unavailable()),
    }
}

/// Registers the handlers of one service instance.
///
/// ```rust
/// use busrpc::{CallContext, MethodResolver, RpcFault, ServiceBuilder};
/// use std::sync::Arc;
///
/// struct PingService;
///
/// let service = ServiceBuilder::new(Arc::new(PingService))
///     .method("Ping", |_svc, _ctx: CallContext, msg: String| async move {
///         Ok::<_, RpcFault>(if msg == "Ping" { "Pong".to_string() } else { msg })
///     });
/// let methods = MethodResolver::new().with_service(service).unwrap();
/// assert!(methods.get("Ping").is_some());
/// ```
pub struct ServiceBuilder<S> {
    service: Arc<S>,
    methods: Vec<MethodDescriptor>,
    error: Option<RpcError>,
}

impl<S: Send + Sync + 'static> ServiceBuilder<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self {
            service,
            methods: Vec::new(),
            error: None,
        }
    }

    fn push(mut self, descriptor: RpcResult<MethodDescriptor>) -> Self {
        match descriptor {
            Ok(descriptor) => self.methods.push(descriptor),
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    /// Async handler taking one decoded argument.
    pub fn method<A, R, F, Fut>(self, name: &str, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(Arc<S>, CallContext, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, RpcFault>> + Send + 'static,
    {
        let service = self.service.clone();
        let descriptor = MethodDescriptor::new(name, type_name::<S>(), Arity::Unary, move |invocation| {
            let service = service.clone();
            match decode_argument::<A>(&invocation) {
                Ok(arg) => {
                    let fut = handler(service, invocation.context, arg);
                    Box::pin(async move { encode_result(fut.await) }) as HandlerFuture
                }
                Err(fault) => Box::pin(async move { Err(fault) }) as HandlerFuture,
            }
        });
        self.push(descriptor)
    }

    /// Async handler without arguments.
    pub fn method0<R, F, Fut>(self, name: &str, handler: F) -> Self
    where
        R: Serialize + 'static,
        F: Fn(Arc<S>, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, RpcFault>> + Send + 'static,
    {
        let service = self.service.clone();
        let descriptor =
            MethodDescriptor::new(name, type_name::<S>(), Arity::Nullary, move |invocation| {
                let fut = handler(service.clone(), invocation.context);
                Box::pin(async move { encode_result(fut.await) }) as HandlerFuture
            });
        self.push(descriptor)
    }

    /// Async handler receiving the request payload unmodified.
    pub fn raw_method<R, F, Fut>(self, name: &str, handler: F) -> Self
    where
        R: Serialize + 'static,
        F: Fn(Arc<S>, CallContext, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, RpcFault>> + Send + 'static,
    {
        let service = self.service.clone();
        let descriptor =
            MethodDescriptor::new(name, type_name::<S>(), Arity::RawBytes, move |invocation| {
                let fut = handler(service.clone(), invocation.context, invocation.payload);
                Box::pin(async move { encode_result(fut.await) }) as HandlerFuture
            });
        self.push(descriptor)
    }

    /// Synchronous handler run on the blocking pool.
    pub fn blocking_method<A, R, F>(self, name: &str, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(&S, &CallContext, A) -> Result<R, RpcFault> + Send + Sync + 'static,
    {
        let service = self.service.clone();
        let handler = Arc::new(handler);
        let descriptor = MethodDescriptor::new(name, type_name::<S>(), Arity::Unary, move |invocation| {
            let arg = match decode_argument::<A>(&invocation) {
                Ok(arg) => arg,
                Err(fault) => return Box::pin(async move { Err(fault) }) as HandlerFuture,
            };
            let service = service.clone();
            let handler = handler.clone();
            let context = invocation.context;
            let method = context.method().to_string();
            Box::pin(run_blocking(method, move || (*handler)(&*service, &context, arg)))
        });
        self.push(descriptor)
    }

    /// Synchronous handler without arguments, run on the blocking pool.
    pub fn blocking_method0<R, F>(self, name: &str, handler: F) -> Self
    where
        R: Serialize + Send + 'static,
        F: Fn(&S, &CallContext) -> Result<R, RpcFault> + Send + Sync + 'static,
    {
        let service = self.service.clone();
        let handler = Arc::new(handler);
        let descriptor =
            MethodDescriptor::new(name, type_name::<S>(), Arity::Nullary, move |invocation| {
                let service = service.clone();
                let handler = handler.clone();
                let context = invocation.context;
                let method = context.method().to_string();
                Box::pin(run_blocking(method, move || (*handler)(&*service, &context)))
            });
        self.push(descriptor)
    }

    /// Add a prebuilt descriptor.
    pub fn descriptor(self, descriptor: MethodDescriptor) -> Self {
        self.push(Ok(descriptor))
    }

    /// Expose an already registered method under another name.
    pub fn rename(mut self, from: &str, to: &str) -> Self {
        if let Err(e) = topic::validate_method_name(to) {
            self.error.get_or_insert(e);
            return self;
        }
        match self.methods.iter_mut().find(|m| m.name == from) {
            Some(method) => method.name = to.to_string(),
            None => {
                self.error.get_or_insert(RpcError::InvalidState(format!(
                    "cannot rename unknown method '{}'",
                    from
                )));
            }
        }
        self
    }

    /// Registered descriptors, or the first registration error.
    pub fn build(self) -> RpcResult<Vec<MethodDescriptor>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.methods),
        }
    }
}

/// Immutable method table shared by all request tasks.
#[derive(Clone, Default)]
pub struct MethodResolver {
    methods: Arc<HashMap<String, MethodDescriptor>>,
}

impl MethodResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// New table with the service's methods added.
    pub fn with_service<S: Send + Sync + 'static>(&self, service: ServiceBuilder<S>) -> RpcResult<Self> {
        self.with_methods(service.build()?)
    }

    /// New table with `descriptors` added. A name already present, in this
    /// table or earlier in `descriptors`, fails without modifying anything.
    pub fn with_methods(
        &self,
        descriptors: impl IntoIterator<Item = MethodDescriptor>,
    ) -> RpcResult<Self> {
        let mut methods = (*self.methods).clone();
        for descriptor in descriptors {
            if let Some(existing) = methods.get(&descriptor.name) {
                return Err(RpcError::DuplicateMethod {
                    name: descriptor.name.clone(),
                    registered: existing.declaring_type,
                    duplicate: descriptor.declaring_type,
                });
            }
            methods.insert(descriptor.name.clone(), descriptor);
        }
        Ok(Self {
            methods: Arc::new(methods),
        })
    }

    /// Method registered under `name` (case-sensitive).
    pub fn get(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    /// Exposed names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl fmt::Debug for MethodResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use serde::Deserialize;
    use tokio_util::sync::CancellationToken;

    struct Calculator;

    impl Calculator {
        fn add(&self, args: &Operands) -> i64 {
            args.a + args.b
        }
    }

    struct Other;

    #[derive(Deserialize)]
    struct Operands {
        a: i64,
        b: i64,
    }

    fn invocation(method: &str, payload: &[u8]) -> Invocation {
        Invocation {
            context: CallContext::new("alice", Some("1"), method, false, None, CancellationToken::new()),
            codec: Arc::new(JsonCodec),
            payload: payload.to_vec(),
        }
    }

    fn calculator() -> ServiceBuilder<Calculator> {
        ServiceBuilder::new(Arc::new(Calculator))
            .method("Add", |svc: Arc<Calculator>, _ctx, args: Operands| async move {
                Ok(svc.add(&args))
            })
            .blocking_method("AddSync", |svc: &Calculator, _ctx, args: Operands| Ok(svc.add(&args)))
            .method0("Zero", |_svc, _ctx| async { Ok(0) })
            .raw_method("Len", |_svc, _ctx, bytes: Vec<u8>| async move { Ok(bytes.len()) })
    }

    #[tokio::test]
    async fn invokes_each_arity() {
        let methods = MethodResolver::new().with_service(calculator()).unwrap();
        assert_eq!(methods.names(), vec!["Add", "AddSync", "Len", "Zero"]);

        let add = methods.get("Add").unwrap();
        assert_eq!(add.arity(), Arity::Unary);
        let value = add.invoke(invocation("Add", br#"{"a":2,"b":3}"#)).await.unwrap();
        assert_eq!(value, Value::from(5));

        let value = methods
            .get("AddSync")
            .unwrap()
            .invoke(invocation("AddSync", br#"{"a":4,"b":5}"#))
            .await
            .unwrap();
        assert_eq!(value, Value::from(9));

        let value = methods.get("Zero").unwrap().invoke(invocation("Zero", b"ignored")).await;
        assert_eq!(value.unwrap(), Value::from(0));

        let value = methods.get("Len").unwrap().invoke(invocation("Len", b"\x00\x01\x02")).await;
        assert_eq!(value.unwrap(), Value::from(3));
    }

    #[tokio::test]
    async fn undecodable_argument_is_invalid_argument() {
        let methods = MethodResolver::new().with_service(calculator()).unwrap();
        for payload in [&b"\"text\""[..], &br#"{"a":"x","b":1}"#[..]] {
            let fault = methods
                .get("Add")
                .unwrap()
                .invoke(invocation("Add", payload))
                .await
                .unwrap_err();
            assert_eq!(fault.code, RpcFault::INVALID_ARGUMENT);
        }
    }

    #[tokio::test]
    async fn blocking_panic_becomes_internal_fault() {
        let service = ServiceBuilder::new(Arc::new(Other)).blocking_method0("Explode", |_svc, _ctx| {
            if true {
                panic!("kaboom");
            }
            Ok(())
        });
        let methods = MethodResolver::new().with_service(service).unwrap();
        let fault = methods
            .get("Explode")
            .unwrap()
            .invoke(invocation("Explode", b""))
            .await
            .unwrap_err();
        assert_eq!(fault.code, RpcFault::INTERNAL);
    }

    #[test]
    fn duplicate_names_fail_and_name_both_types() {
        let methods = MethodResolver::new().with_service(calculator()).unwrap();
        let other = ServiceBuilder::new(Arc::new(Other)).method0("Add", |_svc, _ctx| async { Ok(1) });
        let err = methods.with_service(other).unwrap_err();
        match err {
            RpcError::DuplicateMethod {
                name,
                registered,
                duplicate,
            } => {
                assert_eq!(name, "Add");
                assert!(registered.ends_with("Calculator"));
                assert!(duplicate.ends_with("Other"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Existing table keeps its methods.
        assert_eq!(methods.len(), 4);
    }

    #[test]
    fn rename_onto_registered_name_fails() {
        let methods = MethodResolver::new().with_service(calculator()).unwrap();
        let other = ServiceBuilder::new(Arc::new(Other))
            .method0("Sum", |_svc, _ctx| async { Ok(0) })
            .rename("Sum", "Add");
        match methods.with_service(other) {
            Err(RpcError::DuplicateMethod {
                name,
                registered,
                duplicate,
            }) => {
                assert_eq!(name, "Add");
                assert!(registered.ends_with("Calculator"));
                assert!(duplicate.ends_with("Other"));
            }
            other => panic!("unexpected result: {:?}", other.map(|m| m.len())),
        }
        assert_eq!(methods.len(), 4);
        assert!(methods.get("Sum").is_none());
    }

    #[test]
    fn invalid_names_and_renames() {
        let bad = ServiceBuilder::new(Arc::new(Other)).method0("a/b", |_svc, _ctx| async { Ok(()) });
        assert!(matches!(bad.build(), Err(RpcError::InvalidMethodName(_))));

        let renamed = ServiceBuilder::new(Arc::new(Other))
            .method0("Status", |_svc, _ctx| async { Ok(()) })
            .rename("Status", "GetStatus");
        let methods = MethodResolver::new().with_service(renamed).unwrap();
        assert!(methods.get("GetStatus").is_some());
        assert!(methods.get("Status").is_none());

        let missing = ServiceBuilder::new(Arc::new(Other)).rename("Nope", "Other");
        assert!(missing.build().is_err());
    }

    #[test]
    fn multiple_arity_descriptor_registers() {
        let descriptor = MethodDescriptor::new("Sum3", type_name::<Other>(), Arity::Multiple(3), |_| {
            Box::pin(async { Ok(Value::Null) })
        })
        .unwrap();
        let methods = MethodResolver::new().with_methods([descriptor]).unwrap();
        assert_eq!(methods.get("Sum3").unwrap().arity(), Arity::Multiple(3));
    }
}
