//! Error types for the record graph

use miner_protocol::{DocumentId, MethodId, MethodStatus, SubsetId};

/// Record graph errors
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Subset does not exist or is deleted
    #[error("subset {0} not found")]
    SubsetNotFound(SubsetId),

    /// Method does not exist or is deleted
    #[error("method {0} not found")]
    MethodNotFound(MethodId),

    /// Document does not exist
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),

    /// Status change not permitted by the method lifecycle
    #[error("illegal method status transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current status
        from: MethodStatus,
        /// Requested status
        to: MethodStatus,
    },

    /// Provenance edges form a cycle
    #[error("provenance graph contains a cycle")]
    CycleDetected,

    /// An edge points at a missing entity or lacks its reverse edge
    #[error("dangling reference: {0}")]
    DanglingReference(String),

    /// Store file I/O failed
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store snapshot could not be (de)serialized
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl GraphError {
    /// Check if the error refers to a missing entity
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SubsetNotFound(_) | Self::MethodNotFound(_) | Self::DocumentNotFound(_)
        )
    }
}
