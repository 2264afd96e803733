//! Error types for session workers

use miner_engine::EngineError;
use miner_graph::GraphError;
use miner_protocol::ErrorKind;

/// Session errors
///
/// Every variant is reported to the control plane as an error response;
/// none of them terminates the worker.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Request content is malformed or inconsistent
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced entity does not exist
    #[error("{0}")]
    NotFound(String),

    /// A method failed on its input data
    #[error("training failed: {0}")]
    Training(String),

    /// No dataset attached to this worker yet
    #[error("no dataset attached; send CREATE_DATASET or OPEN_DATASET first")]
    NotInitialized,

    /// Record graph failure
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// File system failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Wire classification of the error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::NotInitialized => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Training(_) => ErrorKind::Training,
            Self::Graph(e) if e.is_not_found() => ErrorKind::NotFound,
            Self::Graph(GraphError::IllegalTransition { .. }) => ErrorKind::Validation,
            Self::Graph(_) | Self::Io(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Validation error from anything displayable
    pub fn validation(msg: impl std::fmt::Display) -> Self {
        Self::Validation(msg.to_string())
    }
}

/// Worker loop errors
///
/// These end the worker; command failures never do.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Reading requests or writing responses failed
    #[error("worker I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A response could not be encoded
    #[error(transparent)]
    Codec(#[from] miner_protocol::CodecError),

    /// The blocking command task panicked or was cancelled
    #[error("command task failed: {0}")]
    Task(String),

    /// The session could not be closed cleanly
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<EngineError> for SessionError {
    fn from(err: EngineError) -> Self {
        Self::Training(err.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miner_protocol::{MethodStatus, SubsetId};

    #[test]
    fn kinds() {
        assert_eq!(SessionError::NotInitialized.kind(), ErrorKind::Validation);
        assert_eq!(
            SessionError::from(GraphError::SubsetNotFound(SubsetId(2))).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            SessionError::from(GraphError::IllegalTransition {
                from: MethodStatus::Finished,
                to: MethodStatus::Training,
            })
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            SessionError::from(EngineError::EmptyFeatureSpace).kind(),
            ErrorKind::Training
        );
    }

    #[test]
    fn graph_errors_keep_their_message() {
        let err = SessionError::from(GraphError::SubsetNotFound(SubsetId(7)));
        assert_eq!(err.to_string(), "subset 7 not found");
    }
}
