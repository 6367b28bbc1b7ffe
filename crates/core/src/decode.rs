//! Object-type specific decoding of data-section values.

use base64::Engine as _;

use crate::error::{BindingError, BindingResult};
use crate::value::Entry;
use crate::ObjectType;

/// Base64-decode Secret data; every other object type passes through untouched.
///
/// Only a malformed encoding fails. Decoded bytes that are not UTF-8 come back as `Entry::Bytes`.
pub fn decode(object_type: ObjectType, key: &str, raw: &str) -> BindingResult<Entry> {
    if object_type != ObjectType::Secret {
        return Ok(Entry::Scalar(raw.to_string()));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw)
        .map_err(|e| BindingError::Decode { key: key.to_string(), reason: e.to_string() })?;
    Ok(Entry::from_bytes(bytes))
}
