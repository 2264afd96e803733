//! Error types for the analytics engine

/// Analytics engine errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// No usable features in the input
    #[error("feature space is empty: no tokens left after stopword removal")]
    EmptyFeatureSpace,

    /// No rows to work on
    #[error("input contains no rows")]
    EmptyInput,

    /// Vector or matrix shapes disagree
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected size
        expected: usize,
        /// Actual size
        actual: usize,
    },

    /// Training labels lack one of the two classes
    #[error("training requires at least one positive and one negative label")]
    DegenerateLabels,

    /// Invalid option or argument
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
