// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Payload codecs and the content-type registry.
//!
//! A codec turns a JSON-model value into bytes and back. Typed helpers on
//! `dyn Codec` ([`serialize`](trait.Codec.html#method.serialize),
//! [`deserialize`](trait.Codec.html#method.deserialize)) convert between
//! Rust values and that model, short-circuiting null values and empty
//! payloads so codecs never see them.

mod json;
mod shape;

#[cfg(feature = "bson")]
mod bson;

#[cfg(feature = "bson")]
pub use self::bson::BsonCodec;
pub use json::JsonCodec;
pub use shape::{zero_value, Shape};

use crate::error::{RpcError, RpcResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "bson")]
    #[error("BSON encode error: {0}")]
    BsonEncode(#[from] ::bson::ser::Error),

    #[cfg(feature = "bson")]
    #[error("BSON decode error: {0}")]
    BsonDecode(#[from] ::bson::de::Error),

    #[error("Payload carrier field '{0}' missing")]
    MissingCarrier(&'static str),

    #[error("No zero value: {0}")]
    NoZeroValue(String),

    #[error("Unknown codec '{0}'")]
    Unknown(String),
}

/// Encode/decode pair identified by a content type.
pub trait Codec: Send + Sync + 'static {
    /// Content type carried with every payload this codec produces.
    fn content_type(&self) -> &str;

    /// Whether encoded payloads are UTF-8 text.
    fn is_utf8(&self) -> bool;

    /// Encode a non-null value of the given shape.
    fn encode(&self, value: &Value, shape: Shape) -> Result<Vec<u8>, CodecError>;

    /// Decode a non-empty payload into a value of the given shape.
    fn decode(&self, payload: &[u8], shape: Shape) -> Result<Value, CodecError>;
}

impl dyn Codec {
    /// Serialize a Rust value; `None`/unit-like nulls produce an empty payload.
    pub fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let value = serde_json::to_value(value)?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        self.encode(&value, Shape::of_value(&value))
    }

    /// Deserialize into `T`; an empty payload yields `T`'s zero value.
    pub fn deserialize<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CodecError> {
        if payload.is_empty() {
            return zero_value::<T>().map_err(|e| CodecError::NoZeroValue(e.to_string()));
        }
        let value = self.decode(payload, Shape::of::<T>())?;
        Ok(serde_json::from_value(value)?)
    }
}

impl fmt::Debug for dyn Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("content_type", &self.content_type())
            .finish()
    }
}

/// Create a built-in codec from its content type.
pub fn builtin(content_type: &str) -> Option<Arc<dyn Codec>> {
    if content_type.eq_ignore_ascii_case(JsonCodec::CONTENT_TYPE) {
        return Some(Arc::new(JsonCodec));
    }
    #[cfg(feature = "bson")]
    if content_type.eq_ignore_ascii_case(BsonCodec::CONTENT_TYPE) {
        return Some(Arc::new(BsonCodec));
    }
    None
}

/// Ordered set of codecs; the first registered one is the default.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON first (default), then BSON when enabled.
    pub fn with_defaults() -> Self {
        let registry = Self::new().with(JsonCodec);
        #[cfg(feature = "bson")]
        let registry = registry.with(BsonCodec);
        registry
    }

    /// Build from content types in preference order.
    pub fn from_content_types<S: AsRef<str>>(content_types: &[S]) -> Result<Self, CodecError> {
        let mut registry = Self::new();
        for content_type in content_types {
            let content_type = content_type.as_ref();
            let codec =
                builtin(content_type).ok_or_else(|| CodecError::Unknown(content_type.to_string()))?;
            registry.register_arc(codec);
        }
        Ok(registry)
    }

    /// Builder form of [`CodecRegistry::register`].
    pub fn with<C: Codec>(mut self, codec: C) -> Self {
        self.register(codec);
        self
    }

    pub fn register<C: Codec>(&mut self, codec: C) {
        self.register_arc(Arc::new(codec));
    }

    /// Register a shared codec. A codec with the same content type is
    /// replaced in place, keeping its position.
    pub fn register_arc(&mut self, codec: Arc<dyn Codec>) {
        match self
            .codecs
            .iter_mut()
            .find(|c| c.content_type().eq_ignore_ascii_case(codec.content_type()))
        {
            Some(slot) => {
                tracing::debug!("Replacing codec for '{}'", codec.content_type());
                *slot = codec;
            }
            None => self.codecs.push(codec),
        }
    }

    /// Codec for a content type (ASCII case-insensitive).
    pub fn get(&self, content_type: &str) -> Option<&Arc<dyn Codec>> {
        self.codecs
            .iter()
            .find(|c| c.content_type().eq_ignore_ascii_case(content_type))
    }

    /// First registered codec.
    pub fn default_codec(&self) -> Option<&Arc<dyn Codec>> {
        self.codecs.first()
    }

    /// Codec for `content_type`, or the default when none is requested.
    pub fn resolve(&self, content_type: Option<&str>) -> RpcResult<&Arc<dyn Codec>> {
        match content_type {
            Some(content_type) => self
                .get(content_type)
                .ok_or_else(|| RpcError::CodecNotFound(content_type.to_string())),
            None => self
                .default_codec()
                .ok_or_else(|| RpcError::CodecNotFound("<default>".to_string())),
        }
    }

    pub fn content_types(&self) -> impl Iterator<Item = &str> {
        self.codecs.iter().map(|c| c.content_type())
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.content_types()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    impl Codec for Plain {
        fn content_type(&self) -> &str {
            "text/plain"
        }

        fn is_utf8(&self) -> bool {
            true
        }

        fn encode(&self, value: &Value, _shape: Shape) -> Result<Vec<u8>, CodecError> {
            Ok(value.to_string().into_bytes())
        }

        fn decode(&self, _payload: &[u8], _shape: Shape) -> Result<Value, CodecError> {
            panic!("empty payloads must not reach the codec");
        }
    }

    #[test]
    fn first_registered_is_default() {
        let registry = CodecRegistry::new().with(Plain).with(JsonCodec);
        assert_eq!(registry.default_codec().unwrap().content_type(), "text/plain");
        assert_eq!(
            registry.get("APPLICATION/JSON").unwrap().content_type(),
            "application/json"
        );
        assert!(registry.get("application/xml").is_none());
    }

    #[test]
    fn replacing_keeps_position() {
        let mut registry = CodecRegistry::new().with(JsonCodec).with(Plain);
        registry.register(JsonCodec);
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.content_types().collect::<Vec<_>>(),
            vec!["application/json", "text/plain"]
        );
    }

    #[test]
    fn resolve_unknown_content_type() {
        let registry = CodecRegistry::new().with(JsonCodec);
        assert!(registry.resolve(None).is_ok());
        assert!(matches!(
            registry.resolve(Some("application/x-unknown")),
            Err(RpcError::CodecNotFound(ct)) if ct == "application/x-unknown"
        ));
        assert!(CodecRegistry::new().resolve(None).is_err());
    }

    #[test]
    fn empty_payload_skips_codec() {
        let codec: Arc<dyn Codec> = Arc::new(Plain);
        let value: Option<String> = codec.deserialize(&[]).unwrap();
        assert_eq!(value, None);
        let value: u32 = codec.deserialize(&[]).unwrap();
        assert_eq!(value, 0);
    }

    #[test]
    fn null_serializes_to_empty_payload() {
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
        assert!(codec.serialize(&None::<u8>).unwrap().is_empty());
        assert!(codec.serialize(&()).unwrap().is_empty());
        assert_eq!(codec.serialize("Ping").unwrap(), b"\"Ping\"");
    }

    #[test]
    fn registry_from_content_types() {
        let registry = CodecRegistry::from_content_types(&["application/json"]).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(matches!(
            CodecRegistry::from_content_types(&["application/yaml"]),
            Err(CodecError::Unknown(_))
        ));
    }
}
