//! Data types for documents and embedded chunks.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Processing state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Processed,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "processed" => Ok(Self::Processed),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown document status: {other}")),
        }
    }
}

/// A document record. Created on upload with `Pending` status and mutated
/// only by the processing pipeline afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub storage_key: String,
    pub original_name: String,
    pub mime_type: String,
    pub status: DocumentStatus,
    pub chunk_count: i64,
    pub processing_attempts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Unix millis of the last completed or failed processing attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_processed_at: Option<i64>,
    /// Per-document chunking override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_overlap: Option<usize>,
    /// Curriculum stages this document is tagged with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_ids: Option<Vec<String>>,
    pub created_at: i64,
}

/// Fields for registering a freshly uploaded document.
#[derive(Debug, Clone, Default)]
pub struct NewDocument {
    pub storage_key: String,
    pub original_name: String,
    pub mime_type: String,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub stage_ids: Option<Vec<String>>,
}

/// Metadata stored alongside each chunk in the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub original_name: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_ids: Option<Vec<String>>,
}

/// A chunk ready for insertion: text span, its embedding, and metadata.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A chunk row read back from the index.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub document_id: Uuid,
    pub chunk_index: i64,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Option<ChunkMetadata>,
}
