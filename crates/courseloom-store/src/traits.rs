//! Collaborator contracts the processing pipeline depends on.

use async_trait::async_trait;
use uuid::Uuid;

use crate::types::{Document, DocumentStatus, EmbeddedChunk, NewDocument};
use courseloom_core::Result;

/// CRUD over document records, keyed by document id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Register an uploaded document with `Pending` status.
    async fn insert(&self, new: NewDocument) -> Result<Document>;

    async fn get(&self, id: Uuid) -> Result<Option<Document>>;

    async fn list_by_status(&self, status: DocumentStatus) -> Result<Vec<Document>>;

    /// Error-status documents with fewer than `max_attempts` attempts.
    async fn list_retryable(&self, max_attempts: i64) -> Result<Vec<Document>>;

    /// Mark a document as in-flight: status=processing, attempts+1, error
    /// cleared. Returns the incremented attempt count.
    async fn begin_processing(&self, id: Uuid) -> Result<i64>;

    /// Record a successful attempt: status=processed, chunk_count updated,
    /// last_processed_at stamped, error cleared.
    async fn complete(&self, id: Uuid, chunk_count: i64) -> Result<()>;

    /// Record a failed attempt: status=error with the failure message,
    /// last_processed_at stamped. The attempt count from `begin_processing`
    /// is retained.
    async fn fail(&self, id: Uuid, message: &str) -> Result<()>;
}

/// Chunk + embedding index, keyed by owning document id.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Ensure backing tables/collections exist. Idempotent.
    async fn init(&self) -> Result<()>;

    /// Insert a document's chunk set. Callers delete the previous set first;
    /// this only appends.
    async fn insert_chunks(&self, document_id: Uuid, chunks: &[EmbeddedChunk]) -> Result<()>;

    /// Remove every chunk owned by the document. Idempotent.
    async fn delete_by_document(&self, document_id: Uuid) -> Result<()>;

    async fn count_by_document(&self, document_id: Uuid) -> Result<i64>;
}
