// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Combined timeout and caller cancellation.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Which signal ended a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSource {
    /// The call's own deadline elapsed
    Timeout,
    /// The caller's token was cancelled
    Caller,
}

/// Resolve when the first of `timeout` or `caller` fires.
///
/// With neither signal present the future never resolves. When both fire
/// together the caller wins, so a cancelled caller never sees a timeout.
pub async fn first_signal(
    timeout: Option<Duration>,
    caller: Option<&CancellationToken>,
) -> CancelSource {
    let deadline = async {
        match timeout {
            Some(after) => tokio::time::sleep(after).await,
            None => std::future::pending().await,
        }
    };
    let cancelled = async {
        match caller {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        () = cancelled => CancelSource::Caller,
        () = deadline => {
            if caller.is_some_and(CancellationToken::is_cancelled) {
                CancelSource::Caller
            } else {
                CancelSource::Timeout
            }
        }
    }
}
