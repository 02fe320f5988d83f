// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fixtures: an in-memory broker with one test server and one client.

#![allow(dead_code)] // Not every test binary uses every helper

use async_trait::async_trait;
use busrpc::{
    CallContext, CodecRegistry, MemoryBroker, Message, MessageHandler, MethodResolver, QoS,
    RpcClient, RpcResult, RpcServer, ServerOptions, ServiceBuilder, Transport,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

pub const SERVER_ID: &str = "srv";
pub const CLIENT_ID: &str = "alice";

#[derive(Debug, Serialize, Deserialize)]
pub struct Operands {
    pub a: i64,
    pub b: i64,
}

/// Test service; counts fire-and-forget records.
#[derive(Default)]
pub struct TestService {
    pub records: AtomicUsize,
    pub recorded: Notify,
}

pub fn test_methods(service: Arc<TestService>) -> MethodResolver {
    let builder = ServiceBuilder::new(service)
        .method("Ping", |_svc, _ctx, msg: String| async move {
            Ok(if msg == "Ping" { "Pong".to_string() } else { msg })
        })
        .method("Add", |_svc, _ctx, ops: Operands| async move { Ok(ops.a + ops.b) })
        .method("Sleep", |_svc, _ctx, millis: u64| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(millis)
        })
        .method0("Caller", |_svc, ctx: CallContext| async move {
            Ok(ctx.caller().to_string())
        })
        .method0("Panic", |_svc, _ctx| async {
            let explode = true;
            if explode {
                panic!("handler exploded");
            }
            Ok(())
        })
        .method("Record", |svc: Arc<TestService>, _ctx, _line: String| async move {
            svc.records.fetch_add(1, Ordering::SeqCst);
            svc.recorded.notify_one();
            Ok(())
        })
        .raw_method("Reverse", |_svc, _ctx, mut bytes: Vec<u8>| async move {
            bytes.reverse();
            Ok(bytes)
        });
    MethodResolver::new()
        .with_service(builder)
        .expect("test methods register")
}

pub struct Fixture {
    pub broker: MemoryBroker,
    pub service: Arc<TestService>,
    pub server: RpcServer,
    pub client: RpcClient,
}

/// Started server `srv` and client `alice` on a fresh broker.
pub async fn fixture(options: ServerOptions) -> Fixture {
    let broker = MemoryBroker::new();
    let service = Arc::new(TestService::default());
    let server = RpcServer::new(
        broker.connect(SERVER_ID).unwrap(),
        CodecRegistry::with_defaults(),
        test_methods(service.clone()),
        options,
    )
    .unwrap();
    server.start().await.unwrap();
    let client = RpcClient::new(
        broker.connect(CLIENT_ID).unwrap(),
        CodecRegistry::with_defaults(),
    )
    .unwrap();
    Fixture {
        broker,
        service,
        server,
        client,
    }
}

struct Forward(mpsc::UnboundedSender<Message>);

#[async_trait]
impl MessageHandler for Forward {
    async fn handle_message(&self, message: &Message) -> RpcResult<()> {
        let _ = self.0.send(message.clone());
        Ok(())
    }
}

/// Passive peer receiving every message matching `filter`.
pub struct Observer {
    pub transport: Arc<busrpc::MemoryTransport>,
    pub messages: mpsc::UnboundedReceiver<Message>,
}

impl Observer {
    pub async fn next(&mut self, within: Duration) -> Option<Message> {
        tokio::time::timeout(within, self.messages.recv())
            .await
            .ok()
            .flatten()
    }
}

pub async fn observe(broker: &MemoryBroker, id: &str, filter: &str) -> Observer {
    let transport = broker.connect(id).unwrap();
    let (tx, messages) = mpsc::unbounded_channel();
    transport.handlers().attach(Arc::new(Forward(tx)));
    transport.subscribe(filter, QoS::ExactlyOnce).await.unwrap();
    Observer {
        transport,
        messages,
    }
}

/// Poll until `condition` holds or a second passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub fn fault_code(message: &Message) -> Option<i32> {
    message.properties.get_parsed("ErrorCode")
}
