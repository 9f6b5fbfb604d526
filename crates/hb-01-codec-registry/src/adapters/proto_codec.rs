//! # Protocol-Buffer Message Codec
//!
//! Encodes a flat JSON object as a protocol-buffer message whose fields are
//! scalars, using the same wire encoding as any other protobuf
//! implementation. Fields are written in tag order; unknown fields are skipped
//! on decode; absent optional fields are left out of the decoded object.

use crate::domain::codec::Codec;
use crate::domain::errors::CodecError;
use prost::encoding::{decode_key, decode_varint, encode_key, encode_varint, WireType};
use serde_json::{Map, Number, Value};

/// Scalar field types supported by the schema compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
}

impl ScalarType {
    /// Parse a schema type keyword.
    #[must_use]
    pub fn parse(keyword: &str) -> Option<Self> {
        let scalar = match keyword {
            "double" => Self::Double,
            "float" => Self::Float,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint32" => Self::Uint32,
            "uint64" => Self::Uint64,
            "sint32" => Self::Sint32,
            "sint64" => Self::Sint64,
            "fixed32" => Self::Fixed32,
            "fixed64" => Self::Fixed64,
            "sfixed32" => Self::Sfixed32,
            "sfixed64" => Self::Sfixed64,
            "bool" => Self::Bool,
            "string" => Self::String,
            "bytes" => Self::Bytes,
            _ => return None,
        };
        Some(scalar)
    }

    /// Wire type used to encode this scalar.
    #[must_use]
    pub fn wire_type(self) -> WireType {
        match self {
            Self::Int32
            | Self::Int64
            | Self::Uint32
            | Self::Uint64
            | Self::Sint32
            | Self::Sint64
            | Self::Bool => WireType::Varint,
            Self::Fixed64 | Self::Sfixed64 | Self::Double => WireType::SixtyFourBit,
            Self::Fixed32 | Self::Sfixed32 | Self::Float => WireType::ThirtyTwoBit,
            Self::String | Self::Bytes => WireType::LengthDelimited,
        }
    }
}

/// One field of a compiled message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub tag: u32,
    pub scalar: ScalarType,
    pub required: bool,
}

/// Codec for one compiled message type.
#[derive(Debug, Clone)]
pub struct ProtoMessageCodec {
    message: String,
    fields: Vec<FieldSpec>,
}

impl ProtoMessageCodec {
    /// Create a codec for `message` with the given fields.
    pub fn new(message: impl Into<String>, mut fields: Vec<FieldSpec>) -> Self {
        fields.sort_by_key(|field| field.tag);
        Self {
            message: message.into(),
            fields,
        }
    }

    /// The message name.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Fields in tag order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn field_by_tag(&self, tag: u32) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.tag == tag)
    }

    fn mismatch(&self, field: &FieldSpec, value: &Value) -> CodecError {
        CodecError::Encode(format!(
            "{}.{}: cannot encode {} as {:?}",
            self.message, field.name, value, field.scalar
        ))
    }

    fn write_field(&self, field: &FieldSpec, value: &Value, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        let mismatch = || self.mismatch(field, value);
        encode_key(field.tag, field.scalar.wire_type(), buf);

        match field.scalar {
            ScalarType::Int32 => {
                let n = value.as_i64().filter(|n| i32::try_from(*n).is_ok()).ok_or_else(mismatch)?;
                encode_varint(n as u64, buf);
            }
            ScalarType::Int64 => {
                let n = value.as_i64().ok_or_else(mismatch)?;
                encode_varint(n as u64, buf);
            }
            ScalarType::Uint32 => {
                let n = value.as_u64().filter(|n| u32::try_from(*n).is_ok()).ok_or_else(mismatch)?;
                encode_varint(n, buf);
            }
            ScalarType::Uint64 => {
                encode_varint(value.as_u64().ok_or_else(mismatch)?, buf);
            }
            ScalarType::Sint32 => {
                let n = value
                    .as_i64()
                    .and_then(|n| i32::try_from(n).ok())
                    .ok_or_else(mismatch)?;
                encode_varint(u64::from(((n << 1) ^ (n >> 31)) as u32), buf);
            }
            ScalarType::Sint64 => {
                let n = value.as_i64().ok_or_else(mismatch)?;
                encode_varint(((n << 1) ^ (n >> 63)) as u64, buf);
            }
            ScalarType::Bool => {
                encode_varint(u64::from(value.as_bool().ok_or_else(mismatch)?), buf);
            }
            ScalarType::Fixed32 => {
                let n = value
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(mismatch)?;
                buf.extend_from_slice(&n.to_le_bytes());
            }
            ScalarType::Sfixed32 => {
                let n = value
                    .as_i64()
                    .and_then(|n| i32::try_from(n).ok())
                    .ok_or_else(mismatch)?;
                buf.extend_from_slice(&n.to_le_bytes());
            }
            ScalarType::Float => {
                let n = value.as_f64().ok_or_else(mismatch)? as f32;
                buf.extend_from_slice(&n.to_le_bytes());
            }
            ScalarType::Fixed64 => {
                buf.extend_from_slice(&value.as_u64().ok_or_else(mismatch)?.to_le_bytes());
            }
            ScalarType::Sfixed64 => {
                buf.extend_from_slice(&value.as_i64().ok_or_else(mismatch)?.to_le_bytes());
            }
            ScalarType::Double => {
                buf.extend_from_slice(&value.as_f64().ok_or_else(mismatch)?.to_le_bytes());
            }
            ScalarType::String => {
                let text = value.as_str().ok_or_else(mismatch)?;
                encode_varint(text.len() as u64, buf);
                buf.extend_from_slice(text.as_bytes());
            }
            ScalarType::Bytes => {
                let bytes = bytes_from_value(value).ok_or_else(mismatch)?;
                encode_varint(bytes.len() as u64, buf);
                buf.extend_from_slice(&bytes);
            }
        }
        Ok(())
    }

    fn read_field(&self, field: &FieldSpec, buf: &mut &[u8]) -> Result<Value, CodecError> {
        let value = match field.scalar {
            ScalarType::Int32 => Value::from(read_varint(buf)? as i64 as i32),
            ScalarType::Int64 => Value::from(read_varint(buf)? as i64),
            ScalarType::Uint32 => Value::from(read_varint(buf)? as u32),
            ScalarType::Uint64 => Value::from(read_varint(buf)?),
            ScalarType::Sint32 => {
                let raw = read_varint(buf)? as u32;
                Value::from(((raw >> 1) as i32) ^ -((raw & 1) as i32))
            }
            ScalarType::Sint64 => {
                let raw = read_varint(buf)?;
                Value::from(((raw >> 1) as i64) ^ -((raw & 1) as i64))
            }
            ScalarType::Bool => Value::from(read_varint(buf)? != 0),
            ScalarType::Fixed32 => Value::from(u32::from_le_bytes(take_array(buf)?)),
            ScalarType::Sfixed32 => Value::from(i32::from_le_bytes(take_array(buf)?)),
            ScalarType::Float => float_value(f64::from(f32::from_le_bytes(take_array(buf)?))),
            ScalarType::Fixed64 => Value::from(u64::from_le_bytes(take_array(buf)?)),
            ScalarType::Sfixed64 => Value::from(i64::from_le_bytes(take_array(buf)?)),
            ScalarType::Double => float_value(f64::from_le_bytes(take_array(buf)?)),
            ScalarType::String => {
                let bytes = take_delimited(buf)?;
                let text = std::str::from_utf8(bytes).map_err(|e| {
                    CodecError::Decode(format!("{}.{}: {}", self.message, field.name, e))
                })?;
                Value::from(text)
            }
            ScalarType::Bytes => Value::from(take_delimited(buf)?.to_vec()),
        };
        Ok(value)
    }
}

impl Codec for ProtoMessageCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        let object = value.as_object().ok_or_else(|| {
            CodecError::Encode(format!("{}: expected an object, got {}", self.message, value))
        })?;

        let mut buf = Vec::new();
        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(CodecError::MissingField(format!(
                        "{}.{}",
                        self.message, field.name
                    )))
                }
                None | Some(Value::Null) => {}
                Some(value) => self.write_field(field, value, &mut buf)?,
            }
        }
        Ok(buf)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        let mut buf = bytes;
        let mut object = Map::new();

        while !buf.is_empty() {
            let (tag, wire_type) = decode_key(&mut buf).map_err(|e| CodecError::Decode(e.to_string()))?;
            let Some(field) = self.field_by_tag(tag) else {
                skip_field(wire_type, &mut buf)?;
                continue;
            };

            if field.scalar.wire_type() != wire_type {
                return Err(CodecError::Decode(format!(
                    "{}.{}: wire type {:?}, expected {:?}",
                    self.message,
                    field.name,
                    wire_type,
                    field.scalar.wire_type()
                )));
            }
            let value = self.read_field(field, &mut buf)?;
            object.insert(field.name.clone(), value);
        }

        if let Some(missing) = self
            .fields
            .iter()
            .find(|field| field.required && !object.contains_key(&field.name))
        {
            return Err(CodecError::MissingField(format!(
                "{}.{}",
                self.message, missing.name
            )));
        }

        Ok(Value::Object(object))
    }
}

fn bytes_from_value(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(text) => Some(text.as_bytes().to_vec()),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect(),
        _ => None,
    }
}

fn float_value(n: f64) -> Value {
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

fn read_varint(buf: &mut &[u8]) -> Result<u64, CodecError> {
    decode_varint(buf).map_err(|e| CodecError::Decode(e.to_string()))
}

fn take<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8], CodecError> {
    if buf.len() < len {
        return Err(CodecError::Decode(format!(
            "truncated field: need {} bytes, {} left",
            len,
            buf.len()
        )));
    }
    let (head, rest) = buf.split_at(len);
    *buf = rest;
    Ok(head)
}

fn take_array<const N: usize>(buf: &mut &[u8]) -> Result<[u8; N], CodecError> {
    let mut out = [0u8; N];
    out.copy_from_slice(take(buf, N)?);
    Ok(out)
}

fn take_delimited<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8], CodecError> {
    let len = usize::try_from(read_varint(buf)?)
        .map_err(|_| CodecError::Decode("length overflows usize".to_string()))?;
    take(buf, len)
}

fn skip_field(wire_type: WireType, buf: &mut &[u8]) -> Result<(), CodecError> {
    match wire_type {
        WireType::Varint => {
            read_varint(buf)?;
        }
        WireType::SixtyFourBit => {
            take(buf, 8)?;
        }
        WireType::ThirtyTwoBit => {
            take(buf, 4)?;
        }
        WireType::LengthDelimited => {
            take_delimited(buf)?;
        }
        WireType::StartGroup | WireType::EndGroup => {
            return Err(CodecError::Decode("groups are not supported".to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str, tag: u32, scalar: ScalarType, required: bool) -> FieldSpec {
        FieldSpec {
            name: name.to_string(),
            tag,
            scalar,
            required,
        }
    }

    fn test1() -> ProtoMessageCodec {
        ProtoMessageCodec::new(
            "Test1",
            vec![
                field("num", 2, ScalarType::Int32, false),
                field("foo", 1, ScalarType::String, false),
            ],
        )
    }

    #[test]
    fn test_encode_matches_protobuf_wire() {
        let bytes = test1().encode(&json!({"foo": "hello", "num": 42})).unwrap();
        // field 1 "hello", then field 2 varint 42
        assert_eq!(
            bytes,
            vec![0x0a, 0x05, b'h', b'e', b'l', b'l', b'o', 0x10, 0x2a]
        );
        assert_eq!(test1().decode(&bytes).unwrap(), json!({"foo": "hello", "num": 42}));
    }

    #[test]
    fn test_negative_int32_uses_ten_byte_varint() {
        let bytes = test1().encode(&json!({"num": -1})).unwrap();
        assert_eq!(bytes.len(), 1 + 10);
        assert_eq!(test1().decode(&bytes).unwrap(), json!({"num": -1}));
    }

    #[test]
    fn test_zigzag_and_fixed_types() {
        let codec = ProtoMessageCodec::new(
            "Mixed",
            vec![
                field("s", 1, ScalarType::Sint64, true),
                field("f", 2, ScalarType::Fixed32, true),
                field("d", 3, ScalarType::Double, true),
                field("b", 4, ScalarType::Bool, true),
                field("raw", 5, ScalarType::Bytes, true),
            ],
        );
        let value = json!({"s": -3, "f": 7, "d": 1.5, "b": true, "raw": [0, 255]});
        let bytes = codec.encode(&value).unwrap();

        // sint64 -3 zigzags to 5
        assert_eq!(&bytes[..2], &[0x08, 0x05]);
        assert_eq!(codec.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_absent_optional_fields_are_omitted() {
        let bytes = test1().encode(&json!({"foo": "only"})).unwrap();
        assert_eq!(test1().decode(&bytes).unwrap(), json!({"foo": "only"}));
    }

    #[test]
    fn test_required_field_missing() {
        let codec = ProtoMessageCodec::new("Req", vec![field("id", 1, ScalarType::Uint64, true)]);
        assert!(matches!(
            codec.encode(&json!({})),
            Err(CodecError::MissingField(name)) if name == "Req.id"
        ));
        assert!(matches!(codec.decode(&[]), Err(CodecError::MissingField(_))));
    }

    #[test]
    fn test_type_mismatch() {
        assert!(matches!(
            test1().encode(&json!({"num": "forty-two"})),
            Err(CodecError::Encode(_))
        ));
        assert!(matches!(
            test1().encode(&json!({"num": 5_000_000_000i64})),
            Err(CodecError::Encode(_))
        ));
        assert!(matches!(test1().encode(&json!([1, 2])), Err(CodecError::Encode(_))));
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        // field 9 varint 1, then field 1 "x"
        let bytes = vec![0x48, 0x01, 0x0a, 0x01, b'x'];
        assert_eq!(test1().decode(&bytes).unwrap(), json!({"foo": "x"}));
    }

    #[test]
    fn test_truncated_input() {
        let bytes = vec![0x0a, 0x05, b'h'];
        assert!(matches!(test1().decode(&bytes), Err(CodecError::Decode(_))));
    }

    #[test]
    fn test_wrong_wire_type() {
        // field 1 encoded as varint while the schema says string
        let bytes = vec![0x08, 0x01];
        assert!(matches!(test1().decode(&bytes), Err(CodecError::Decode(_))));
    }
}
