//! Sequential batch embedding with per-batch retry.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::provider::{EmbeddingProvider, ProviderError};
use crate::retry::retry_with_backoff;

/// Pause between successful batches to stay under provider rate limits.
pub const INTER_BATCH_DELAY: Duration = Duration::from_millis(500);
/// Backoff base for transient provider failures.
pub const TRANSIENT_BASE_DELAY: Duration = Duration::from_secs(5);
/// Backoff base for everything else.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(3);

/// A batch exhausted its retry budget; nothing was returned for any batch.
#[derive(Debug, Error)]
#[error("embedding failed on batch {batch_index}: {source}")]
pub struct EmbeddingError {
    pub batch_index: usize,
    #[source]
    pub source: ProviderError,
}

type ProgressFn = dyn Fn(usize, usize) + Send + Sync;

/// Drives an `EmbeddingProvider` over ordered fixed-size batches.
///
/// Batches run strictly one at a time; the returned vector at index `i`
/// embeds the chunk at index `i` of the input.
pub struct EmbeddingBatcher {
    provider: Arc<dyn EmbeddingProvider>,
    progress: Option<Box<ProgressFn>>,
}

impl EmbeddingBatcher {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            progress: None,
        }
    }

    /// Observe progress as `(embedded_so_far, total)` after each batch.
    pub fn with_progress(mut self, callback: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Embed every chunk, retrying each batch up to `max_retries` times with
    /// exponential backoff. Fails whole on the first exhausted batch.
    pub async fn embed_with_retry(
        &self,
        chunks: &[String],
        batch_size: usize,
        max_retries: u32,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let total = chunks.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(total);
        let batches = chunks.chunks(batch_size.max(1));

        for (batch_index, batch) in batches.enumerate() {
            let embedded = retry_with_backoff(
                || self.provider.embed(batch),
                max_retries,
                |error: &ProviderError| {
                    if error.is_transient() {
                        TRANSIENT_BASE_DELAY
                    } else {
                        DEFAULT_BASE_DELAY
                    }
                },
            )
            .await
            .map_err(|source| EmbeddingError {
                batch_index,
                source,
            })?;

            if embedded.len() != batch.len() {
                return Err(EmbeddingError {
                    batch_index,
                    source: ProviderError::Permanent(format!(
                        "provider returned {} vectors for {} inputs",
                        embedded.len(),
                        batch.len()
                    )),
                });
            }
            vectors.extend(embedded);

            let done = vectors.len();
            debug!(
                "Embedded {}/{} chunks ({}%)",
                done,
                total,
                done * 100 / total
            );
            if let Some(progress) = &self.progress {
                progress(done, total);
            }

            if done < total {
                tokio::time::sleep(INTER_BATCH_DELAY).await;
            }
        }

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every batch a scripted provider sees.
    #[derive(Default)]
    struct CallLog {
        batches: Mutex<Vec<Vec<String>>>,
    }

    impl CallLog {
        fn record(&self, batch: &[String]) {
            self.batches.lock().unwrap().push(batch.to_vec());
        }

        fn batches(&self) -> Vec<Vec<String>> {
            self.batches.lock().unwrap().clone()
        }

        fn count(&self) -> usize {
            self.batches.lock().unwrap().len()
        }
    }

    /// Deterministic vector for a text: [char count, first byte].
    fn vector_for(text: &str) -> Vec<f32> {
        vec![
            text.chars().count() as f32,
            text.bytes().next().unwrap_or(0) as f32,
        ]
    }

    /// Provider that fails the first `fail_first` calls, then echoes.
    struct ScriptedProvider {
        fail_first: usize,
        error: ProviderError,
        log: CallLog,
        fail_marker: Option<String>,
    }

    impl ScriptedProvider {
        fn ok() -> Self {
            Self::failing(0, ProviderError::Transient("unused".into()))
        }

        fn failing(fail_first: usize, error: ProviderError) -> Self {
            Self {
                fail_first,
                error,
                log: CallLog::default(),
                fail_marker: None,
            }
        }

        fn failing_on_marker(marker: &str) -> Self {
            Self {
                fail_first: 0,
                error: ProviderError::Permanent("bad input".into()),
                log: CallLog::default(),
                fail_marker: Some(marker.to_string()),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedProvider {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            self.log.record(texts);
            if self.log.count() <= self.fail_first {
                return Err(self.error.clone());
            }
            if let Some(marker) = &self.fail_marker {
                if texts.iter().any(|t| t.contains(marker.as_str())) {
                    return Err(self.error.clone());
                }
            }
            Ok(texts.iter().map(|t| vector_for(t)).collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn chunks(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("chunk number {i}")).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_input() {
        let batcher = EmbeddingBatcher::new(Arc::new(ScriptedProvider::ok()));
        let vectors = batcher.embed_with_retry(&[], 20, 3).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_preserve_input_order() {
        let provider = Arc::new(ScriptedProvider::ok());
        let batcher = EmbeddingBatcher::new(provider.clone());
        let input = chunks(45);

        let vectors = batcher.embed_with_retry(&input, 20, 3).await.unwrap();
        assert_eq!(vectors.len(), 45);
        for (chunk, vector) in input.iter().zip(&vectors) {
            assert_eq!(vector, &vector_for(chunk));
        }

        // 45 chunks at batch size 20: sizes 20, 20, 5 in order.
        let batches = provider.log.batches();
        assert_eq!(
            batches.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![20, 20, 5]
        );
        assert_eq!(batches[0][0], input[0]);
        assert_eq!(batches[2][4], input[44]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_once_then_succeed_invokes_twice() {
        let provider = Arc::new(ScriptedProvider::failing(
            1,
            ProviderError::Transient("connection reset".into()),
        ));
        let batcher = EmbeddingBatcher::new(provider.clone());
        let input = chunks(7);

        let vectors = batcher.embed_with_retry(&input, 20, 3).await.unwrap();
        assert_eq!(vectors.len(), input.len());
        assert_eq!(provider.log.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_abort_whole_operation() {
        let provider = Arc::new(ScriptedProvider::failing(
            usize::MAX,
            ProviderError::Transient("timeout".into()),
        ));
        let batcher = EmbeddingBatcher::new(provider.clone());

        let error = batcher
            .embed_with_retry(&chunks(30), 20, 3)
            .await
            .unwrap_err();
        assert_eq!(error.batch_index, 0);
        assert!(error.source.is_transient());
        // Only the first batch was attempted, max_retries times.
        assert_eq!(provider.log.count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_names_the_failing_batch() {
        let mut input = chunks(25);
        input[23] = "POISON chunk".to_string(); // lands in the second batch
        let provider = Arc::new(ScriptedProvider::failing_on_marker("POISON"));
        let batcher = EmbeddingBatcher::new(provider);

        let error = batcher.embed_with_retry(&input, 20, 2).await.unwrap_err();
        assert_eq!(error.batch_index, 1);
        assert!(error.to_string().contains("batch 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reports_after_each_batch() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let batcher = EmbeddingBatcher::new(Arc::new(ScriptedProvider::ok()))
            .with_progress(move |done, total| sink.lock().unwrap().push((done, total)));

        batcher.embed_with_retry(&chunks(45), 20, 3).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(20, 45), (40, 45), (45, 45)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatched_vector_count_is_an_error() {
        struct ShortProvider;

        #[async_trait]
        impl EmbeddingProvider for ShortProvider {
            async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
                Ok(vec![vec![0.0]; texts.len().saturating_sub(1)])
            }

            fn dimension(&self) -> usize {
                1
            }
        }

        let batcher = EmbeddingBatcher::new(Arc::new(ShortProvider));
        let error = batcher.embed_with_retry(&chunks(3), 20, 3).await.unwrap_err();
        assert_eq!(error.batch_index, 0);
        assert!(!error.source.is_transient());
    }
}
