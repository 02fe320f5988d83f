// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Caller timeouts versus caller cancellation, and handler deadlines.

mod common;

use busrpc::{headers, CallOptions, Message, RpcError, RpcFault, ServerOptions, Transport};
use common::{eventually, fault_code, fixture, observe, SERVER_ID};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_timeout_reports_timeout() {
    let f = fixture(ServerOptions::default()).await;

    let started = Instant::now();
    let err = f
        .client
        .call::<_, u64>(
            SERVER_ID,
            "Sleep",
            &2_000u64,
            CallOptions::new().timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {}", err);
    assert!(!err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(f.client.pending_calls(), 0);
}

#[tokio::test]
async fn test_caller_cancellation_reports_cancelled() {
    let f = fixture(ServerOptions::default()).await;
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        canceller.cancel();
    });

    let err = f
        .client
        .call::<_, u64>(
            SERVER_ID,
            "Sleep",
            &2_000u64,
            CallOptions::new()
                .timeout(Duration::from_secs(5))
                .cancellation(token),
        )
        .await
        .unwrap_err();
    assert!(err.is_cancelled(), "unexpected error: {}", err);
    assert!(!err.is_timeout());
    assert_eq!(f.client.pending_calls(), 0);
}

#[tokio::test]
async fn test_cancelled_token_wins_over_elapsed_timeout() {
    let f = fixture(ServerOptions::default()).await;
    let token = CancellationToken::new();
    token.cancel();

    let err = f
        .client
        .call::<_, u64>(
            SERVER_ID,
            "Sleep",
            &2_000u64,
            CallOptions::new()
                .timeout(Duration::from_millis(1))
                .cancellation(token),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Cancelled), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_timeout_before_late_cancellation() {
    let f = fixture(ServerOptions::default()).await;
    let token = CancellationToken::new();

    let err = f
        .client
        .call::<_, u64>(
            SERVER_ID,
            "Sleep",
            &2_000u64,
            CallOptions::new()
                .timeout(Duration::from_millis(30))
                .cancellation(token.clone()),
        )
        .await
        .unwrap_err();
    token.cancel();
    assert!(err.is_timeout(), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_no_timeout_waits_for_slow_handler() {
    let f = fixture(ServerOptions::default()).await;

    let slept: u64 = f
        .client
        .call(SERVER_ID, "Sleep", &150u64, CallOptions::new().no_timeout())
        .await
        .unwrap();
    assert_eq!(slept, 150);
}

#[tokio::test]
async fn test_handler_deadline_answers_408() {
    let f = fixture(ServerOptions::default()).await;
    let mut responses = observe(&f.broker, "spy", "from/+/rpc_response/to/+").await;

    let err = f
        .client
        .call::<_, u64>(
            SERVER_ID,
            "Sleep",
            &2_000u64,
            CallOptions::new().timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    // The header carries whole seconds, so the server gives up after 1 s
    // and reports it; the caller has already moved on and drops the answer.
    let response = responses.next(Duration::from_secs(3)).await.unwrap();
    assert_eq!(response.properties.get_bool(headers::SUCCESS), Some(false));
    assert_eq!(fault_code(&response), Some(RpcFault::TIMEOUT));
    assert!(eventually(|| f.server.in_flight_calls() == 0).await);
    assert_eq!(f.client.pending_calls(), 0);
}

#[tokio::test]
async fn test_timeout_header_is_read_as_seconds() {
    let f = fixture(ServerOptions::default()).await;
    let mut responses = observe(&f.broker, "spy", "from/+/rpc_response/to/+").await;
    let legacy = f.broker.connect("legacy").unwrap();

    // A 5 second budget comfortably covers a 100 ms handler
    legacy
        .publish(
            Message::new(format!("from/legacy/rpc/to/{}/qos1", SERVER_ID))
                .with_payload("application/json", b"100".to_vec(), true)
                .with_property(headers::METHOD, "Sleep")
                .with_property(headers::ID, "budget")
                .with_property(headers::TIMEOUT, 5),
        )
        .await
        .unwrap();

    let response = responses.next(Duration::from_secs(2)).await.unwrap();
    assert_eq!(response.properties.get_bool(headers::SUCCESS), Some(true));
    assert_eq!(fault_code(&response), None);
    assert_eq!(response.expiry, Some(Duration::from_secs(5)));
    let slept: u64 = serde_json::from_slice(&response.payload).unwrap();
    assert_eq!(slept, 100);
}
