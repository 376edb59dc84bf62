//! Canonical CBOR encoding for deterministic serialization.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats
//!
//! The canonical encoding is critical: logically identical content must
//! produce identical bytes (and thus an identical [`PayloadId`]) across all
//! platforms, or dedupe and replay detection break.

use ciborium::value::Value;

use crate::content::{AuthContent, PayloadKind, CONTENT_NONCE_LEN};
use crate::error::CoreError;
use crate::types::ActorId;

/// Content field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const KIND: u64 = 0;
    pub const TARGET: u64 = 1;
    pub const APPROVER: u64 = 2;
    pub const ATTRIBUTES: u64 = 3;
    pub const NONCE: u64 = 4;
}

/// Encode authorization content to canonical CBOR bytes.
///
/// These are the bytes that get hashed into the [`PayloadId`] and signed by
/// the sender.
pub fn canonical_content_bytes(content: &AuthContent) -> Vec<u8> {
    let value = content_to_cbor_value(content);
    let mut buf = Vec::new();
    encode_value_to(&mut buf, &value);
    buf
}

/// Convert content to a CBOR Value (map with integer keys).
fn content_to_cbor_value(content: &AuthContent) -> Value {
    let attrs: Vec<(Value, Value)> = content
        .attributes
        .iter()
        .map(|(k, v)| (Value::Text(k.clone()), Value::Text(v.clone())))
        .collect();

    Value::Map(vec![
        (
            Value::Integer(keys::KIND.into()),
            Value::Integer(content.kind.to_u16().into()),
        ),
        (
            Value::Integer(keys::TARGET.into()),
            Value::Bytes(content.target.0.to_vec()),
        ),
        (
            Value::Integer(keys::APPROVER.into()),
            Value::Bytes(content.approver.0.to_vec()),
        ),
        (Value::Integer(keys::ATTRIBUTES.into()), Value::Map(attrs)),
        (
            Value::Integer(keys::NONCE.into()),
            Value::Bytes(content.nonce.to_vec()),
        ),
    ])
}

/// Recursively encode a CBOR value in canonical form.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item);
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => panic!("floats not supported in canonical encoding"),
        _ => panic!("unsupported CBOR value type"),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type, smallest form.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a map canonically (major type 5): keys sorted by encoded bytes.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

/// Decode authorization content from canonical bytes.
///
/// Used by approvers to re-parse off-chain content before comparing its hash
/// against the chain-stored payload.
pub fn decode_content(bytes: &[u8]) -> Result<AuthContent, CoreError> {
    let cursor = std::io::Cursor::new(bytes);
    let value: Value =
        ciborium::from_reader(cursor).map_err(|e| CoreError::DecodingError(e.to_string()))?;

    let map = match &value {
        Value::Map(m) => m,
        _ => return Err(CoreError::MalformedContent("expected map".into())),
    };

    let get = |key: u64| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == key as i128))
            .map(|(_, v)| v)
    };

    let kind = match get(keys::KIND) {
        Some(Value::Integer(i)) => {
            let n = i128::from(*i) as u16;
            PayloadKind::from_u16(n).ok_or(CoreError::UnsupportedKind(n))?
        }
        _ => return Err(CoreError::MalformedContent("missing kind".into())),
    };

    let target = parse_actor(get(keys::TARGET), "target")?;
    let approver = parse_actor(get(keys::APPROVER), "approver")?;

    let attributes = match get(keys::ATTRIBUTES) {
        Some(Value::Map(entries)) => {
            let mut attrs = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                match (k, v) {
                    (Value::Text(k), Value::Text(v)) => attrs.push((k.clone(), v.clone())),
                    _ => {
                        return Err(CoreError::MalformedContent(
                            "attributes must be text pairs".into(),
                        ))
                    }
                }
            }
            attrs
        }
        None => Vec::new(),
        _ => return Err(CoreError::MalformedContent("invalid attributes".into())),
    };

    let nonce = match get(keys::NONCE) {
        Some(Value::Bytes(b)) if b.len() == CONTENT_NONCE_LEN => {
            let mut arr = [0u8; CONTENT_NONCE_LEN];
            arr.copy_from_slice(b);
            arr
        }
        _ => return Err(CoreError::MalformedContent("invalid nonce".into())),
    };

    Ok(AuthContent {
        kind,
        target,
        approver,
        attributes,
        nonce,
    })
}

fn parse_actor(value: Option<&Value>, field: &str) -> Result<ActorId, CoreError> {
    match value {
        Some(Value::Bytes(b)) if b.len() == 32 => {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(b);
            Ok(ActorId(arr))
        }
        _ => Err(CoreError::MalformedContent(format!("invalid {}", field))),
    }
}
