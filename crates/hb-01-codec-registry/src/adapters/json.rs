//! # JSON Codec
//!
//! Encodes a value as UTF-8 JSON. Useful for application events that do not
//! need a schema.

use crate::domain::codec::Codec;
use crate::domain::errors::CodecError;
use serde_json::Value;

/// Codec storing payloads as JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_codec() {
        let value = json!({"bar": "world", "id": 23});
        let bytes = JsonCodec.encode(&value).unwrap();
        assert_eq!(JsonCodec.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        assert!(matches!(
            JsonCodec.decode(&[0xff, 0x00]),
            Err(CodecError::Decode(_))
        ));
    }
}
