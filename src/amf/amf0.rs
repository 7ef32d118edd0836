//! AMF0 wire codec
//!
//! Markers and layouts follow the AMF0 specification. Only the types that
//! appear in RTMP command traffic are supported; anything else fails with
//! `AmfError::UnsupportedMarker` so the caller can drop the message instead
//! of misreading it.

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::AmfError;

use super::value::AmfValue;

mod marker {
    pub const NUMBER: u8 = 0x00;
    pub const BOOLEAN: u8 = 0x01;
    pub const STRING: u8 = 0x02;
    pub const OBJECT: u8 = 0x03;
    pub const NULL: u8 = 0x05;
    pub const UNDEFINED: u8 = 0x06;
    pub const ECMA_ARRAY: u8 = 0x08;
    pub const OBJECT_END: u8 = 0x09;
    pub const LONG_STRING: u8 = 0x0c;
    pub const TYPED_OBJECT: u8 = 0x10;
}

/// Encode one value, appending to `out`
pub fn encode(value: &AmfValue, out: &mut BytesMut) {
    match value {
        AmfValue::Number(n) => {
            out.put_u8(marker::NUMBER);
            out.put_f64(*n);
        }
        AmfValue::Boolean(b) => {
            out.put_u8(marker::BOOLEAN);
            out.put_u8(u8::from(*b));
        }
        AmfValue::String(s) => {
            if s.len() > u16::MAX as usize {
                out.put_u8(marker::LONG_STRING);
                out.put_u32(s.len() as u32);
            } else {
                out.put_u8(marker::STRING);
                out.put_u16(s.len() as u16);
            }
            out.put_slice(s.as_bytes());
        }
        AmfValue::Null => out.put_u8(marker::NULL),
        AmfValue::Undefined => out.put_u8(marker::UNDEFINED),
        AmfValue::Object(props) => {
            out.put_u8(marker::OBJECT);
            encode_properties(props, out);
        }
        AmfValue::EcmaArray(props) => {
            out.put_u8(marker::ECMA_ARRAY);
            out.put_u32(props.len() as u32);
            encode_properties(props, out);
        }
        AmfValue::TypedObject {
            class_name,
            properties,
        } => {
            out.put_u8(marker::TYPED_OBJECT);
            out.put_u16(class_name.len() as u16);
            out.put_slice(class_name.as_bytes());
            encode_properties(properties, out);
        }
    }
}

/// Encode a sequence of values into a fresh body
pub fn encode_all(values: &[AmfValue]) -> Bytes {
    let mut out = BytesMut::new();
    for value in values {
        encode(value, &mut out);
    }
    out.freeze()
}

fn encode_properties(props: &HashMap<String, AmfValue>, out: &mut BytesMut) {
    for (name, value) in props {
        out.put_u16(name.len() as u16);
        out.put_slice(name.as_bytes());
        encode(value, out);
    }
    // Empty property name followed by the object-end marker
    out.put_u16(0);
    out.put_u8(marker::OBJECT_END);
}

/// Decode one value, consuming from `data`
pub fn decode(data: &mut Bytes) -> Result<AmfValue, AmfError> {
    if data.remaining() < 1 {
        return Err(AmfError::Truncated);
    }
    let mark = data.get_u8();
    match mark {
        marker::NUMBER => {
            if data.remaining() < 8 {
                return Err(AmfError::Truncated);
            }
            Ok(AmfValue::Number(data.get_f64()))
        }
        marker::BOOLEAN => {
            if data.remaining() < 1 {
                return Err(AmfError::Truncated);
            }
            Ok(AmfValue::Boolean(data.get_u8() != 0))
        }
        marker::STRING => Ok(AmfValue::String(read_short_string(data)?)),
        marker::LONG_STRING => {
            if data.remaining() < 4 {
                return Err(AmfError::Truncated);
            }
            let len = data.get_u32() as usize;
            read_utf8(data, len).map(AmfValue::String)
        }
        marker::NULL => Ok(AmfValue::Null),
        marker::UNDEFINED => Ok(AmfValue::Undefined),
        marker::OBJECT => decode_properties(data).map(AmfValue::Object),
        marker::ECMA_ARRAY => {
            if data.remaining() < 4 {
                return Err(AmfError::Truncated);
            }
            // The declared length is advisory; properties are still
            // terminated by the object-end marker.
            let _count = data.get_u32();
            decode_properties(data).map(AmfValue::EcmaArray)
        }
        marker::TYPED_OBJECT => {
            let class_name = read_short_string(data)?;
            let properties = decode_properties(data)?;
            Ok(AmfValue::TypedObject {
                class_name,
                properties,
            })
        }
        other => Err(AmfError::UnsupportedMarker(other)),
    }
}

/// Decode every value remaining in `data`
pub fn decode_all(data: &mut Bytes) -> Result<Vec<AmfValue>, AmfError> {
    let mut values = Vec::new();
    while data.has_remaining() {
        values.push(decode(data)?);
    }
    Ok(values)
}

fn decode_properties(data: &mut Bytes) -> Result<HashMap<String, AmfValue>, AmfError> {
    let mut props = HashMap::new();
    loop {
        let name = read_short_string(data)?;
        if name.is_empty() {
            if data.remaining() < 1 {
                return Err(AmfError::Truncated);
            }
            let end = data.get_u8();
            if end != marker::OBJECT_END {
                return Err(AmfError::Expected("object-end marker"));
            }
            return Ok(props);
        }
        let value = decode(data)?;
        props.insert(name, value);
    }
}

fn read_short_string(data: &mut Bytes) -> Result<String, AmfError> {
    if data.remaining() < 2 {
        return Err(AmfError::Truncated);
    }
    let len = data.get_u16() as usize;
    read_utf8(data, len)
}

fn read_utf8(data: &mut Bytes, len: usize) -> Result<String, AmfError> {
    if data.remaining() < len {
        return Err(AmfError::Truncated);
    }
    let raw = data.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| AmfError::Expected("valid utf-8 string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: AmfValue) -> AmfValue {
        let mut out = BytesMut::new();
        encode(&value, &mut out);
        let mut data = out.freeze();
        decode(&mut data).unwrap()
    }

    #[test]
    fn test_number_layout() {
        let mut out = BytesMut::new();
        encode(&AmfValue::Number(1.0), &mut out);
        assert_eq!(&out[..], &[0x00, 0x3f, 0xf0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_string_layout() {
        let mut out = BytesMut::new();
        encode(&AmfValue::string("connect"), &mut out);
        assert_eq!(out[0], 0x02);
        assert_eq!(&out[1..3], &[0x00, 0x07]);
        assert_eq!(&out[3..], b"connect");
    }

    #[test]
    fn test_object_roundtrip() {
        let obj = AmfValue::object([
            ("app", AmfValue::string("oflaDemo")),
            ("tcUrl", AmfValue::string("rtmp://localhost/oflaDemo")),
            ("objectEncoding", AmfValue::Number(0.0)),
        ]);
        assert_eq!(roundtrip(obj.clone()), obj);
    }

    #[test]
    fn test_null_and_undefined_roundtrip() {
        assert_eq!(roundtrip(AmfValue::Null), AmfValue::Null);
        assert_eq!(roundtrip(AmfValue::Undefined), AmfValue::Undefined);
    }

    #[test]
    fn test_typed_object_roundtrip() {
        let value = AmfValue::TypedObject {
            class_name: "flex.messaging.io.ArrayCollection".into(),
            properties: [("length".to_string(), AmfValue::Number(3.0))]
                .into_iter()
                .collect(),
        };
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn test_decode_all_command_shape() {
        let body = encode_all(&[
            AmfValue::string("connect"),
            AmfValue::Number(1.0),
            AmfValue::object([("app", AmfValue::string("live"))]),
        ]);
        let mut data = body;
        let values = decode_all(&mut data).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0].as_str(), Some("connect"));
        assert_eq!(values[1].as_number(), Some(1.0));
    }

    #[test]
    fn test_truncated_fails() {
        let mut data = Bytes::from_static(&[0x00, 0x3f]);
        assert!(matches!(decode(&mut data), Err(AmfError::Truncated)));
    }

    #[test]
    fn test_unknown_marker_fails() {
        let mut data = Bytes::from_static(&[0x42]);
        assert!(matches!(
            decode(&mut data),
            Err(AmfError::UnsupportedMarker(0x42))
        ));
    }
}
