//! Envelope Codec Module
//!
//! Application values travel in the frame's `data` field as a stringified
//! `{"value": ...}` object, so `null`, primitives and structured values all
//! produce a non-empty string.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

// == Envelope ==
/// Single-field wrapper around an application value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// The wrapped application value
    pub value: T,
}

// == Encode ==
/// Wraps `value` in an envelope and serializes it to a string.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(&Envelope { value })?)
}

// == Decode ==
/// Parses an envelope string and unwraps its value.
///
/// Fails with `MalformedEnvelope` when the string is not JSON, has no `value`
/// field, or the value does not fit `T`.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str::<Envelope<T>>(raw)
        .map(|envelope| envelope.value)
        .map_err(|e| ClientError::MalformedEnvelope(e.to_string()))
}
