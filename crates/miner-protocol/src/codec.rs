//! JSON-lines wire codec
//!
//! One envelope per line, `\n` terminated.

use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use serde::Serialize;

/// Codec errors
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Line is not a valid envelope
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Line is empty
    #[error("empty line")]
    Empty,
}

/// Encode a value as one newline-terminated JSON line
///
/// # Errors
/// - `CodecError::Malformed` if serialization fails
pub fn encode_line<T: Serialize>(value: &T) -> Result<String, CodecError> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

/// Decode a request line
///
/// # Errors
/// - `CodecError::Empty` for blank lines
/// - `CodecError::Malformed` for anything that is not a request envelope
pub fn decode_request(line: &str) -> Result<RequestEnvelope, CodecError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}

/// Decode a response line
///
/// # Errors
/// - `CodecError::Empty` for blank lines
/// - `CodecError::Malformed` for anything that is not a response envelope
pub fn decode_response(line: &str) -> Result<ResponseEnvelope, CodecError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(CodecError::Empty);
    }
    Ok(serde_json::from_str(line)?)
}

/// Recover the request id from a line whose body failed to decode
#[must_use]
pub fn peek_request_id(line: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(line.trim()).ok()?;
    value.get("requestId")?.as_u64()
}
