// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic naming for RPC over pub/sub.
//!
//! # Topic Naming
//!
//! For caller `A` invoking callee `B` at QoS 1:
//! - Request topic: `from/A/rpc/to/B/qos1`
//! - Broadcast request topic: `from/A/rpc/qos1`
//! - Response topic: `from/B/rpc_response/to/A`
//!
//! Method names, correlation ids and flags travel as message properties,
//! so routing never depends on call semantics.

use crate::error::{RpcError, RpcResult};
use crate::message::QoS;

/// Topic hierarchy separator.
pub const SEPARATOR: char = '/';
/// Single-level wildcard.
pub const SINGLE_LEVEL_WILDCARD: char = '+';
/// Multi-level wildcard.
pub const MULTI_LEVEL_WILDCARD: char = '#';

const FROM: &str = "from";
const TO: &str = "to";
const REQUEST: &str = "rpc";
const RESPONSE: &str = "rpc_response";
const ANY: &str = "+";

fn is_reserved(c: char) -> bool {
    c == SEPARATOR || c == SINGLE_LEVEL_WILDCARD || c == MULTI_LEVEL_WILDCARD
}

/// Reject method names that would break topic routing.
pub fn validate_method_name(name: &str) -> RpcResult<()> {
    if name.is_empty() || name.chars().any(is_reserved) {
        return Err(RpcError::InvalidMethodName(name.to_string()));
    }
    Ok(())
}

/// Reject peer identities that cannot be used as a topic segment.
pub fn validate_identity(id: &str) -> RpcResult<()> {
    if id.is_empty() || id.chars().any(is_reserved) {
        return Err(RpcError::InvalidIdentity(id.to_string()));
    }
    Ok(())
}

/// Request topic; `target == None` produces a broadcast request.
pub fn request_topic(caller: &str, target: Option<&str>, qos: QoS) -> String {
    match target {
        Some(target) => format!("{FROM}/{caller}/{REQUEST}/{TO}/{target}/{qos}"),
        None => format!("{FROM}/{caller}/{REQUEST}/{qos}"),
    }
}

/// Filter a server subscribes to for requests addressed to it.
pub fn request_filter(callee: &str, qos: QoS) -> String {
    format!("{FROM}/{ANY}/{REQUEST}/{TO}/{callee}/{qos}")
}

/// Filter a server subscribes to for broadcast requests.
pub fn broadcast_filter(qos: QoS) -> String {
    format!("{FROM}/{ANY}/{REQUEST}/{qos}")
}

/// Response topic published by `callee` back to `caller`.
pub fn response_topic(callee: &str, caller: &str) -> String {
    format!("{FROM}/{callee}/{RESPONSE}/{TO}/{caller}")
}

/// Filter a client subscribes to for its responses.
pub fn response_filter(caller: &str) -> String {
    response_topic(ANY, caller)
}

/// Identity of the publisher: the segment following the leading `from/`.
pub fn source_of(topic: &str) -> Option<&str> {
    let rest = topic.strip_prefix(FROM)?.strip_prefix(SEPARATOR)?;
    let source = rest.split(SEPARATOR).next()?;
    (!source.is_empty()).then_some(source)
}

/// Parsed request topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestRoute<'a> {
    /// Calling peer
    pub source: &'a str,
    /// Addressed peer; `None` for broadcast requests
    pub target: Option<&'a str>,
    /// Delivery level encoded in the topic
    pub qos: QoS,
}

/// Parse `from/<src>/rpc/to/<dst>/qos<N>` or `from/<src>/rpc/qos<N>`.
pub fn parse_request_topic(topic: &str) -> Option<RequestRoute<'_>> {
    let segments: Vec<&str> = topic.split(SEPARATOR).collect();
    let (source, target, qos) = match segments.as_slice() {
        [FROM, source, REQUEST, TO, target, qos] => (*source, Some(*target), *qos),
        [FROM, source, REQUEST, qos] => (*source, None, *qos),
        _ => return None,
    };
    if source.is_empty() || target.is_some_and(str::is_empty) {
        return None;
    }
    let qos = qos
        .strip_prefix("qos")
        .and_then(|level| level.parse::<u8>().ok())
        .and_then(QoS::from_level)?;
    Some(RequestRoute {
        source,
        target,
        qos,
    })
}

/// True if `topic` is a response addressed to `caller`.
pub fn is_response_for(topic: &str, caller: &str) -> bool {
    matches_filter(&response_filter(caller), topic)
}

/// MQTT filter matching: `+` matches one level, a trailing `#` any number.
pub fn matches_filter(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split(SEPARATOR);
    let mut topic_levels = topic.split(SEPARATOR);
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
