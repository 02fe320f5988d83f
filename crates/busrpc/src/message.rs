// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bus messages, delivery levels and the property bag carrying RPC headers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// RPC header names. Lookups are ASCII case-insensitive.
pub mod headers {
    /// Method name (request only)
    pub const METHOD: &str = "Method";
    /// Correlation id (absent for fire-and-forget)
    pub const ID: &str = "Id";
    /// Call timeout in whole seconds
    pub const TIMEOUT: &str = "Timeout";
    /// Response success flag
    pub const SUCCESS: &str = "Success";
    /// Error code (failed responses)
    pub const ERROR_CODE: &str = "ErrorCode";
    /// Error message (failed responses)
    pub const ERROR_MESSAGE: &str = "ErrorMessage";
    /// One-to-many exchange marker, passed through to the response
    pub const BROADCAST: &str = "Broadcast";
    /// Request expects no response
    pub const NO_RESPONSE: &str = "NoResponse";
}

/// Transport delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QoS {
    /// Fire and forget at the transport level
    AtMostOnce = 0,
    /// Delivered one or more times
    #[default]
    AtLeastOnce = 1,
    /// Delivered exactly once
    ExactlyOnce = 2,
}

impl QoS {
    /// All levels, lowest first.
    pub const ALL: [QoS; 3] = [QoS::AtMostOnce, QoS::AtLeastOnce, QoS::ExactlyOnce];

    /// Numeric level used in topics (`qos<N>`).
    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            2 => Some(Self::ExactlyOnce),
            _ => None,
        }
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "qos{}", self.level())
    }
}

/// Ordered name/value bag (MQTT user properties).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: Vec<(String, String)>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, replacing any existing one with the same name.
    pub fn set(&mut self, name: &str, value: impl ToString) {
        let value = value.to_string();
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    /// Builder form of [`Properties::set`].
    pub fn with(mut self, name: &str, value: impl ToString) -> Self {
        self.set(name, value);
        self
    }

    /// Raw value of the first property matching `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parsed value; `None` when absent or unparsable.
    pub fn get_parsed<T: FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    /// Boolean flag, accepting any ASCII case of `true`/`false`.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        let value = self.get(name)?.trim();
        if value.eq_ignore_ascii_case("true") {
            Some(true)
        } else if value.eq_ignore_ascii_case("false") {
            Some(false)
        } else {
            None
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A message published to or delivered from the bus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Topic name
    pub topic: String,
    /// Payload content type (codec key)
    pub content_type: Option<String>,
    /// Serialized payload; empty when the call carries no value
    pub payload: Vec<u8>,
    /// Payload is UTF-8 text
    pub payload_utf8: bool,
    /// User properties (RPC headers)
    pub properties: Properties,
    /// Delivery guarantee
    pub qos: QoS,
    /// Broker-side expiry
    pub expiry: Option<Duration>,
}

impl Message {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn with_payload(mut self, content_type: &str, payload: Vec<u8>, utf8: bool) -> Self {
        self.content_type = Some(content_type.to_string());
        self.payload = payload;
        self.payload_utf8 = utf8;
        self
    }

    pub fn with_property(mut self, name: &str, value: impl ToString) -> Self {
        self.properties.set(name, value);
        self
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_are_case_insensitive() {
        let props = Properties::new().with("Method", "Ping").with("id", "abc");
        assert_eq!(props.get("method"), Some("Ping"));
        assert_eq!(props.get("ID"), Some("abc"));
        assert_eq!(props.get("Timeout"), None);
    }

    #[test]
    fn set_replaces_existing_value() {
        let mut props = Properties::new().with("Success", true);
        props.set("SUCCESS", false);
        assert_eq!(props.len(), 1);
        assert_eq!(props.get_bool("success"), Some(false));
    }

    #[test]
    fn bool_and_number_parsing() {
        let props = Properties::new()
            .with("Broadcast", "True")
            .with("Timeout", " 15 ")
            .with("ErrorCode", "oops");
        assert_eq!(props.get_bool("Broadcast"), Some(true));
        assert_eq!(props.get_parsed::<u64>("Timeout"), Some(15));
        assert_eq!(props.get_parsed::<i32>("ErrorCode"), None);
    }

    #[test]
    fn qos_levels() {
        for qos in QoS::ALL {
            assert_eq!(QoS::from_level(qos.level()), Some(qos));
        }
        assert_eq!(QoS::from_level(3), None);
        assert_eq!(QoS::ExactlyOnce.to_string(), "qos2");
    }
}
