//! Embedding provider contract.

use async_trait::async_trait;
use thiserror::Error;

/// Failure from an embedding provider call, classified at the boundary so
/// callers never have to guess from message text.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Worth waiting longer before retrying: timeouts, connection resets,
    /// rate limiting.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Unlikely to improve on retry: auth, validation, malformed requests.
    #[error("provider error: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Generates embedding vectors for batches of text.
///
/// Implementations must return one vector per input text, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Dimensionality of the vectors this provider produces.
    fn dimension(&self) -> usize;
}
