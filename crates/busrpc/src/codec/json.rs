// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JSON payload codec.

use super::{Codec, CodecError, Shape};
use serde_json::Value;

/// `application/json` codec. Every shape maps directly onto JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    pub const CONTENT_TYPE: &'static str = "application/json";
}

impl Codec for JsonCodec {
    fn content_type(&self) -> &str {
        Self::CONTENT_TYPE
    }

    fn is_utf8(&self) -> bool {
        true
    }

    fn encode(&self, value: &Value, _shape: Shape) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, payload: &[u8], _shape: Shape) -> Result<Value, CodecError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Operands {
        a: i64,
        b: i64,
    }

    #[test]
    fn record_and_scalar_payloads() {
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
        let bytes = codec.serialize(&Operands { a: 2, b: 3 }).unwrap();
        assert_eq!(bytes, br#"{"a":2,"b":3}"#);
        let back: Operands = codec.deserialize(&bytes).unwrap();
        assert_eq!(back, Operands { a: 2, b: 3 });

        let sum: i64 = codec.deserialize(b"5").unwrap();
        assert_eq!(sum, 5);
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
        assert!(matches!(
            codec.deserialize::<Operands>(b"{not json"),
            Err(CodecError::Json(_))
        ));
        assert!(codec.deserialize::<Operands>(b"\"text\"").is_err());
    }
}
