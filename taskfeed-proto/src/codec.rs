//! JSON encoding for payloads exchanged with the task service.
//!
//! The REST backend speaks JSON; these helpers wrap `serde_json` with a
//! single error type so transports can map codec failures uniformly.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("encode error: {0}")]
    Encode(String),
    /// The bytes were not a valid payload.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Encodes a payload into JSON bytes.
///
/// # Errors
///
/// Returns `CodecError::Encode` if the value cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decodes a payload from JSON bytes.
///
/// # Errors
///
/// Returns `CodecError::Decode` if the bytes cannot be deserialized into `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}
