//! Processing failure taxonomy.

use thiserror::Error;
use uuid::Uuid;

use courseloom_embed::EmbeddingError;

/// Why one processing attempt failed.
///
/// `NotFound` and `Busy` describe a call that never started real work; they
/// are the only variants that leave the document record untouched.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("document not found: {0}")]
    NotFound(Uuid),

    #[error("document {0} is already in flight or the pipeline is at capacity")]
    Busy(Uuid),

    #[error("unsupported mime type: {0}")]
    UnsupportedMimeType(String),

    #[error("no text content extracted")]
    EmptyContent,

    #[error("splitter produced no chunks")]
    NoChunks,

    // `EmbeddingError`'s own message carries the batch label.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Other(#[from] courseloom_core::Error),
}
