//! Generation provider trait.
//!
//! Concrete providers (OpenAI chat completions, Ollama, disabled) live in
//! the app crate. The answer assembler only needs to know whether a
//! failure is worth retrying, so providers classify their own errors.

use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a [`GenerationProvider`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// Rate limiting, server errors, network trouble, timeouts.
    #[error("transient generation error: {0}")]
    Transient(String),
    /// Missing credentials, unconfigured provider, rejected request.
    #[error("generation unavailable: {0}")]
    Permanent(String),
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerationError::Transient(_))
    }
}

/// A text-generation backend.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Provider label used in logs (e.g. `"openai:gpt-4o-mini"`).
    fn name(&self) -> &str;

    /// Produce a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}
