//! Document lifecycle manager.
//!
//! Runs one document's processing transaction end to end: fetch the source
//! file, extract text, split, embed, and replace the document's chunk set in
//! the vector index. Document status moves `pending|error → processing →
//! processed|error`; every failure is captured into the record and the
//! returned outcome rather than thrown.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use courseloom_core::config::{ProcessingConfig, ProcessingOverrides};
use courseloom_embed::{EmbeddingBatcher, EmbeddingProvider};
use courseloom_ingest::{split_into_chunks, ExtractorRegistry, Storage};
use courseloom_store::{ChunkMetadata, Document, DocumentStore, EmbeddedChunk, VectorStore};

use crate::error::ProcessError;
use crate::gate::ConcurrencyGate;

/// Result of one `process_document` call. Never an `Err`: failures are
/// carried in `error` so batch callers can keep going.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub document_id: Uuid,
    pub success: bool,
    pub chunk_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: i64,
}

impl ProcessOutcome {
    fn succeeded(document_id: Uuid, chunk_count: usize, attempts: i64) -> Self {
        Self {
            document_id,
            success: true,
            chunk_count,
            error: None,
            attempts,
        }
    }

    fn failed(document_id: Uuid, attempts: i64, error: String) -> Self {
        Self {
            document_id,
            success: false,
            chunk_count: 0,
            error: Some(error),
            attempts,
        }
    }
}

/// Orchestrates document processing over injected collaborators.
pub struct DocumentPipeline {
    documents: Arc<dyn DocumentStore>,
    vectors: Arc<dyn VectorStore>,
    storage: Arc<dyn Storage>,
    extractors: ExtractorRegistry,
    batcher: EmbeddingBatcher,
    gate: ConcurrencyGate,
    defaults: ProcessingConfig,
}

impl DocumentPipeline {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        vectors: Arc<dyn VectorStore>,
        storage: Arc<dyn Storage>,
        extractors: ExtractorRegistry,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            documents,
            vectors,
            storage,
            extractors,
            batcher: EmbeddingBatcher::new(provider),
            gate: ConcurrencyGate::default(),
            defaults: ProcessingConfig::default(),
        }
    }

    /// Replace the default processing configuration.
    pub fn with_defaults(mut self, defaults: ProcessingConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Use a caller-owned gate, e.g. one shared with another pipeline.
    pub fn with_gate(mut self, gate: ConcurrencyGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub(crate) fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    /// Process one document through the full pipeline.
    ///
    /// `NotFound` and `Busy` outcomes leave the document record untouched;
    /// any later failure is persisted as `status=error` with its message.
    pub async fn process_document(
        &self,
        id: Uuid,
        overrides: Option<&ProcessingOverrides>,
    ) -> ProcessOutcome {
        let document = match self.documents.get(id).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                debug!("Document {} not found", id);
                return ProcessOutcome::failed(id, 0, ProcessError::NotFound(id).to_string());
            }
            Err(e) => return ProcessOutcome::failed(id, 0, e.to_string()),
        };

        // Scheduling rejection, not a document failure: no status mutation.
        let _permit = match self.gate.try_acquire(id) {
            Some(permit) => permit,
            None => {
                info!("Document {} deferred: pipeline at capacity or already in flight", id);
                return ProcessOutcome::failed(
                    id,
                    document.processing_attempts,
                    ProcessError::Busy(id).to_string(),
                );
            }
        };

        // Optimistic pre-work update, visible to observers immediately.
        let attempts = match self.documents.begin_processing(id).await {
            Ok(attempts) => attempts,
            Err(e) => return ProcessOutcome::failed(id, document.processing_attempts, e.to_string()),
        };

        info!(
            "Processing document {} ({}), attempt {}",
            id, document.original_name, attempts
        );

        match self.run_stages(&document, overrides).await {
            Ok(chunk_count) => {
                if let Err(e) = self.documents.complete(id, chunk_count as i64).await {
                    error!("Failed to record completion for {}: {}", id, e);
                    return ProcessOutcome::failed(id, attempts, e.to_string());
                }
                info!("Document {} processed: {} chunks", id, chunk_count);
                ProcessOutcome::succeeded(id, chunk_count, attempts)
            }
            Err(process_error) => {
                let message = process_error.to_string();
                error!("Document {} failed: {}", id, message);
                if let Err(e) = self.documents.fail(id, &message).await {
                    error!("Failed to record failure for {}: {}", id, e);
                }
                ProcessOutcome::failed(id, attempts, message)
            }
        }
        // The gate permit drops here on every path.
    }

    async fn run_stages(
        &self,
        document: &Document,
        overrides: Option<&ProcessingOverrides>,
    ) -> Result<usize, ProcessError> {
        let config =
            self.defaults
                .resolved_for(overrides, document.chunk_size, document.chunk_overlap);

        // A remote fetch lands in a temp file deleted when `source` drops,
        // whichever way this function exits.
        let source = self.storage.fetch(&document.storage_key).await?;
        let bytes = source.read().await?;

        let extractor = self
            .extractors
            .get(&document.mime_type)
            .ok_or_else(|| ProcessError::UnsupportedMimeType(document.mime_type.clone()))?;
        let text = extractor.extract(&bytes, &document.mime_type)?;
        if text.trim().is_empty() {
            return Err(ProcessError::EmptyContent);
        }

        let chunks = split_into_chunks(&text, config.chunk_size, config.chunk_overlap);
        if chunks.is_empty() {
            return Err(ProcessError::NoChunks);
        }
        debug!(
            "Split {} into {} chunks (size {}, overlap {})",
            document.original_name,
            chunks.len(),
            config.chunk_size,
            config.chunk_overlap
        );

        let embeddings = self
            .batcher
            .embed_with_retry(&chunks, config.batch_size, config.max_retries)
            .await?;

        self.vectors.init().await?;
        // Idempotent overwrite: clear any chunks from a prior attempt before
        // inserting, so reprocessing never leaves duplicates.
        self.vectors.delete_by_document(document.id).await?;

        let total_chunks = chunks.len();
        let stage_ids = document
            .stage_ids
            .as_ref()
            .filter(|ids| !ids.is_empty())
            .cloned();
        let payload: Vec<EmbeddedChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_index, (content, embedding))| EmbeddedChunk {
                content,
                embedding,
                metadata: ChunkMetadata {
                    original_name: document.original_name.clone(),
                    chunk_index,
                    total_chunks,
                    stage_ids: stage_ids.clone(),
                },
            })
            .collect();
        self.vectors.insert_chunks(document.id, &payload).await?;

        let stored = self.vectors.count_by_document(document.id).await?;
        if stored == 0 {
            // A processed document must not sit on an empty index.
            return Err(ProcessError::Other(courseloom_core::Error::Storage(
                format!("vector store reports no chunks after inserting {total_chunks}"),
            )));
        }
        if stored as usize != total_chunks {
            warn!(
                "Document {}: stored {} chunks but splitter produced {}",
                document.id, stored, total_chunks
            );
        }
        Ok(stored as usize)
    }
}
