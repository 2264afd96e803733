//! Request/response envelopes exchanged with session workers

use crate::command::Command;
use crate::types::ErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parent → worker envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    /// Correlation id, unique per pool
    pub request_id: u64,
    /// Command to execute
    pub body: Command,
}

impl RequestEnvelope {
    /// Wrap a command
    #[inline]
    #[must_use]
    pub fn new(request_id: u64, body: Command) -> Self {
        Self { request_id, body }
    }
}

/// Worker → parent envelope
///
/// Exactly one of `error` and `results` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    /// Correlation id copied from the request
    pub request_id: u64,
    /// Error message when the command failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Classification of `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    /// Command results on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
}

impl ResponseEnvelope {
    /// Successful response
    #[must_use]
    pub fn success(request_id: u64, results: Value) -> Self {
        Self {
            request_id,
            error: None,
            kind: None,
            results: Some(results),
        }
    }

    /// Failed response
    #[must_use]
    pub fn failure(request_id: u64, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            request_id,
            error: Some(message.into()),
            kind: Some(kind),
            results: None,
        }
    }

    /// Whether the command failed
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Split into results or a remote error
    ///
    /// # Errors
    /// Returns the carried message and kind (`Internal` when unclassified)
    /// if the worker reported a failure.
    pub fn into_result(self) -> Result<Value, RemoteError> {
        match self.error {
            Some(message) => Err(RemoteError {
                kind: self.kind.unwrap_or(ErrorKind::Internal),
                message,
            }),
            None => Ok(self.results.unwrap_or(Value::Null)),
        }
    }
}

/// Error reconstructed from a failed response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RemoteError {
    /// Error classification
    pub kind: ErrorKind,
    /// Message reported by the worker
    pub message: String,
}
