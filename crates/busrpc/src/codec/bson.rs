// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! BSON payload codec.
//!
//! A BSON payload must be a document. Records are encoded as-is; scalars
//! and sequences are boxed as `{"Data": <value>}` and unboxed on decode.

use super::{Codec, CodecError, Shape};
use bson::{Bson, Document};
use serde_json::Value;

/// Field holding a boxed scalar or sequence.
pub const CARRIER_FIELD: &str = "Data";

/// `application/bson` codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct BsonCodec;

impl BsonCodec {
    pub const CONTENT_TYPE: &'static str = "application/bson";
}

impl Codec for BsonCodec {
    fn content_type(&self) -> &str {
        Self::CONTENT_TYPE
    }

    fn is_utf8(&self) -> bool {
        false
    }

    fn encode(&self, value: &Value, shape: Shape) -> Result<Vec<u8>, CodecError> {
        let document = match bson::to_bson(value)? {
            Bson::Document(document) if !shape.is_boxed() => document,
            other => {
                let mut carrier = Document::new();
                carrier.insert(CARRIER_FIELD, other);
                carrier
            }
        };
        Ok(bson::to_vec(&document)?)
    }

    fn decode(&self, payload: &[u8], shape: Shape) -> Result<Value, CodecError> {
        let mut document: Document = bson::from_slice(payload)?;
        let value = match shape {
            Shape::Scalar | Shape::Sequence => document
                .remove(CARRIER_FIELD)
                .ok_or(CodecError::MissingCarrier(CARRIER_FIELD))?,
            Shape::Dynamic if document.len() == 1 && document.contains_key(CARRIER_FIELD) => document
                .remove(CARRIER_FIELD)
                .ok_or(CodecError::MissingCarrier(CARRIER_FIELD))?,
            Shape::Record | Shape::Dynamic => Bson::Document(document),
        };
        Ok(value.into_relaxed_extjson())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Reading {
        sensor: String,
        value: f64,
    }

    fn codec() -> Arc<dyn Codec> {
        Arc::new(BsonCodec)
    }

    #[test]
    fn scalar_is_boxed_in_carrier() {
        let bytes = codec().serialize("Pong").unwrap();
        let document: Document = bson::from_slice(&bytes).unwrap();
        assert_eq!(document.get_str(CARRIER_FIELD).unwrap(), "Pong");

        let back: String = codec().deserialize(&bytes).unwrap();
        assert_eq!(back, "Pong");
    }

    #[test]
    fn sequence_is_boxed_in_carrier() {
        let bytes = codec().serialize(&vec![1i64, 2, 3]).unwrap();
        let document: Document = bson::from_slice(&bytes).unwrap();
        assert!(document.get_array(CARRIER_FIELD).is_ok());

        let back: Vec<i64> = codec().deserialize(&bytes).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }

    #[test]
    fn record_is_encoded_unboxed() {
        let reading = Reading {
            sensor: "t1".into(),
            value: 21.5,
        };
        let bytes = codec().serialize(&reading).unwrap();
        let document: Document = bson::from_slice(&bytes).unwrap();
        assert!(!document.contains_key(CARRIER_FIELD));
        assert_eq!(document.get_str("sensor").unwrap(), "t1");

        let back: Reading = codec().deserialize(&bytes).unwrap();
        assert_eq!(back, reading);
    }

    #[test]
    fn dynamic_value_unwraps_carrier() {
        let bytes = codec().serialize(&42i64).unwrap();
        let value: Value = codec().deserialize(&bytes).unwrap();
        assert_eq!(value, Value::from(42));
    }

    #[test]
    fn missing_carrier_is_reported() {
        let bytes = bson::to_vec(&doc! { "Other": 1 }).unwrap();
        assert!(matches!(
            codec().deserialize::<i32>(&bytes),
            Err(CodecError::MissingCarrier(CARRIER_FIELD))
        ));
    }
}
