//! Error types for the session pool

use miner_protocol::{ErrorKind, RemoteError, SessionId};

/// Session pool errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The worker rejected the request content
    #[error("validation error: {0}")]
    Validation(String),

    /// The worker could not find a referenced entity
    #[error("not found: {0}")]
    NotFound(String),

    /// No worker registered for the session
    #[error("session {0} not found; create it first")]
    SessionNotFound(SessionId),

    /// The request exhausted its deadline extensions
    #[error("request {request_id} timed out")]
    Timeout {
        /// Correlation id of the expired request
        request_id: u64,
    },

    /// The worker exited or its channel is closed
    #[error("worker for session {0} disconnected")]
    WorkerDisconnected(SessionId),

    /// The worker did not exit in time after `SHUTDOWN`
    #[error("worker for session {session_id} did not exit in time")]
    ShutdownTimeout {
        /// Session being closed
        session_id: SessionId,
    },

    /// A method failed on its input data
    #[error("training failed: {0}")]
    Training(String),

    /// Unclassified worker failure
    #[error("worker error: {0}")]
    Remote(String),

    /// The worker could not be started
    #[error("failed to spawn worker: {0}")]
    Spawn(String),

    /// Invalid pool configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl PoolError {
    /// HTTP status for the error
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Training(_) => 400,
            Self::NotFound(_) | Self::SessionNotFound(_) => 404,
            Self::WorkerDisconnected(_) => 503,
            Self::Timeout { .. } | Self::ShutdownTimeout { .. } => 504,
            Self::Remote(_) | Self::Spawn(_) | Self::Config(_) => 500,
        }
    }

    /// Whether the caller is at fault (4xx)
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::WorkerDisconnected(_) | Self::ShutdownTimeout { .. }
        )
    }
}

impl From<RemoteError> for PoolError {
    fn from(err: RemoteError) -> Self {
        match err.kind {
            ErrorKind::Validation => Self::Validation(err.message),
            ErrorKind::NotFound => Self::NotFound(err.message),
            ErrorKind::Training => Self::Training(err.message),
            ErrorKind::Internal => Self::Remote(err.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(PoolError::Validation("x".into()).status_code(), 400);
        assert_eq!(PoolError::Training("x".into()).status_code(), 400);
        assert_eq!(PoolError::SessionNotFound(SessionId(1)).status_code(), 404);
        assert_eq!(PoolError::Timeout { request_id: 1 }.status_code(), 504);
        assert_eq!(PoolError::WorkerDisconnected(SessionId(1)).status_code(), 503);
        assert_eq!(PoolError::Remote("x".into()).status_code(), 500);
    }

    #[test]
    fn classification() {
        assert!(PoolError::NotFound("subset 3".into()).is_client_error());
        assert!(!PoolError::Spawn("no binary".into()).is_client_error());
        assert!(PoolError::Timeout { request_id: 9 }.is_retryable());
        assert!(!PoolError::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn remote_errors_keep_kind_and_message() {
        let err = PoolError::from(RemoteError {
            kind: ErrorKind::Training,
            message: "need both classes".into(),
        });
        assert_eq!(err, PoolError::Training("need both classes".into()));

        let err = PoolError::from(RemoteError {
            kind: ErrorKind::Internal,
            message: "boom".into(),
        });
        assert_eq!(err.status_code(), 500);
    }
}
