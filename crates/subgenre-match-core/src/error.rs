//! Error taxonomy for classification runs.
//!
//! Every variant is fatal to the run that raised it, except
//! [`MatchError::MalformedQueryRecord`], whose handling (abort or skip)
//! is chosen by the caller. [`MatchError::InvalidInput`] is fatal even
//! when malformed records are skipped.

use thiserror::Error;

/// Errors raised by the core ranking and loading operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    /// Two vectors compared by cosine similarity have different lengths.
    #[error("Vector length mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// The reference store could not be opened or read.
    #[error("Reference store unavailable: {0}")]
    StoreUnavailable(String),

    /// A stored reference vector could not be parsed.
    #[error("Malformed reference entry {id}: {reason}")]
    MalformedEntry { id: i64, reason: String },

    /// An input query record is missing a required field or vector.
    #[error("Malformed query record at position {position}: {reason}")]
    MalformedQueryRecord { position: usize, reason: String },

    /// The input as a whole cannot be split into records.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl MatchError {
    /// Stable machine-readable code used in structured error reports.
    pub fn code(&self) -> &'static str {
        match self {
            MatchError::DimensionMismatch { .. } => "dimension_mismatch",
            MatchError::StoreUnavailable(_) => "store_unavailable",
            MatchError::MalformedEntry { .. } => "malformed_entry",
            MatchError::MalformedQueryRecord { .. } => "malformed_query_record",
            MatchError::InvalidInput(_) => "invalid_input",
        }
    }
}
