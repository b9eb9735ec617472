//! Error taxonomy shared by every stage of the pipeline.
//!
//! Callers match on the variant to decide between retrying, rebuilding
//! the index, or surfacing the failure. Retrieval that finds nothing is
//! never an error.

use thiserror::Error;

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad chunking, retrieval or provider parameters. Never retried.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A vector's width disagrees with the index. The corpus has to be
    /// re-embedded with a matching provider.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding provider failed for a whole batch.
    #[error("embedding failed: {0}")]
    EmbeddingFailure(String),

    /// A persisted index artifact cannot be used with the running config.
    #[error("incompatible index: {0}")]
    IncompatibleIndex(String),

    /// The primary generation capability failed after retries.
    #[error("generation failed: {0}")]
    GenerationFailure(String),

    /// A chunk id is already present in the index.
    #[error("duplicate index entry: {0}")]
    DuplicateEntry(String),

    /// A caller-supplied deadline elapsed.
    #[error("{operation} timed out after {millis} ms")]
    Timeout { operation: &'static str, millis: u128 },

    /// Reading or writing the index artifact failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        Self::EmbeddingFailure(message.into())
    }

    pub fn incompatible(message: impl Into<String>) -> Self {
        Self::IncompatibleIndex(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Whether retrying the same operation could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::EmbeddingFailure(_) | Error::GenerationFailure(_) | Error::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_dimension_mismatch() {
        let err = Error::DimensionMismatch {
            expected: 384,
            actual: 1536,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 384, got 1536");
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::embedding("503").is_transient());
        assert!(Error::Timeout {
            operation: "generate",
            millis: 10
        }
        .is_transient());
        assert!(!Error::invalid_config("overlap").is_transient());
        assert!(!Error::incompatible("v0").is_transient());
    }
}
