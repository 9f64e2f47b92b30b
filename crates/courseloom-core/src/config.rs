//! Processing configuration with per-call and per-document overrides.

use serde::{Deserialize, Serialize};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default overlap between consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;
/// Default number of attempts per embedding batch.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default number of chunks per embedding request.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Effective settings for one document processing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub max_retries: u32,
    pub batch_size: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            max_retries: DEFAULT_MAX_RETRIES,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ProcessingConfig {
    /// Resolve the effective config for a run.
    ///
    /// Precedence: per-document chunk overrides > call-supplied overrides >
    /// these defaults. Retry and batch settings have no per-document form.
    pub fn resolved_for(
        &self,
        call: Option<&ProcessingOverrides>,
        doc_chunk_size: Option<usize>,
        doc_chunk_overlap: Option<usize>,
    ) -> ProcessingConfig {
        let mut effective = *self;
        if let Some(overrides) = call {
            if let Some(size) = overrides.chunk_size {
                effective.chunk_size = size;
            }
            if let Some(overlap) = overrides.chunk_overlap {
                effective.chunk_overlap = overlap;
            }
            if let Some(retries) = overrides.max_retries {
                effective.max_retries = retries;
            }
            if let Some(batch) = overrides.batch_size {
                effective.batch_size = batch;
            }
        }
        if let Some(size) = doc_chunk_size {
            effective.chunk_size = size;
        }
        if let Some(overlap) = doc_chunk_overlap {
            effective.chunk_overlap = overlap;
        }
        effective
    }
}

/// Partial settings supplied by a caller; `None` fields fall through.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProcessingOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_overlap: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}
