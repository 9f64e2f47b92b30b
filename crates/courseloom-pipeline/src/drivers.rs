//! Batch drivers: sweep pending documents and retry failed ones.

use serde::Serialize;
use tracing::info;

use courseloom_core::config::ProcessingOverrides;
use courseloom_core::Result;
use courseloom_store::DocumentStatus;

use crate::processor::{DocumentPipeline, ProcessOutcome};

/// Documents at or beyond this many attempts are left for manual
/// intervention by the automatic retry sweep.
pub const DEFAULT_RETRY_ATTEMPT_CAP: i64 = 5;

/// Tally of one pending-documents sweep.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    pub details: Vec<ProcessOutcome>,
}

/// Tally of one failed-documents retry sweep.
#[derive(Debug, Clone, Serialize)]
pub struct RetryReport {
    pub retried: usize,
    pub succeeded: usize,
    pub still_failed: usize,
}

impl DocumentPipeline {
    /// Process every pending document, one at a time. A document's failure
    /// is recorded in the report and never aborts the rest of the sweep.
    pub async fn process_pending(
        &self,
        overrides: Option<&ProcessingOverrides>,
    ) -> Result<BatchReport> {
        let pending = self.documents().list_by_status(DocumentStatus::Pending).await?;
        info!("Processing {} pending documents", pending.len());

        let mut report = BatchReport {
            processed: 0,
            failed: 0,
            details: Vec::with_capacity(pending.len()),
        };
        for document in pending {
            let outcome = self.process_document(document.id, overrides).await;
            if outcome.success {
                report.processed += 1;
            } else {
                report.failed += 1;
            }
            report.details.push(outcome);
        }

        info!(
            "Pending sweep done: {} processed, {} failed",
            report.processed, report.failed
        );
        Ok(report)
    }

    /// Reprocess error-status documents that still have retry budget, i.e.
    /// fewer than `max_attempts` attempts. Documents at the cap stay
    /// untouched until someone intervenes.
    pub async fn retry_failed(
        &self,
        max_attempts: i64,
        overrides: Option<&ProcessingOverrides>,
    ) -> Result<RetryReport> {
        let retryable = self.documents().list_retryable(max_attempts).await?;
        info!(
            "Retrying {} failed documents (attempt cap {})",
            retryable.len(),
            max_attempts
        );

        let mut report = RetryReport {
            retried: 0,
            succeeded: 0,
            still_failed: 0,
        };
        for document in retryable {
            report.retried += 1;
            let outcome = self.process_document(document.id, overrides).await;
            if outcome.success {
                report.succeeded += 1;
            } else {
                report.still_failed += 1;
            }
        }

        info!(
            "Retry sweep done: {} succeeded, {} still failing",
            report.succeeded, report.still_failed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::processor::tests::{Fixture, TestProvider};
    use crate::DEFAULT_RETRY_ATTEMPT_CAP;
    use courseloom_store::{DocumentStatus, DocumentStore, NewDocument};

    #[tokio::test(start_paused = true)]
    async fn test_process_pending_isolates_failures() {
        let fixture = Fixture::new();
        let good_a = fixture.upload_text("a.txt", "First lesson body.").await;
        let good_b = fixture.upload_text("b.txt", "Second lesson body.").await;
        fixture.write_upload("c.bin", "opaque bytes");
        let bad = fixture
            .store
            .insert(NewDocument {
                storage_key: "c.bin".into(),
                original_name: "c.bin".into(),
                mime_type: "application/octet-stream".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let report = fixture.pipeline.process_pending(None).await.unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.details.len(), 3);

        for id in [good_a.id, good_b.id] {
            let record = fixture.store.get(id).await.unwrap().unwrap();
            assert_eq!(record.status, DocumentStatus::Processed);
        }
        let record = fixture.store.get(bad.id).await.unwrap().unwrap();
        assert_eq!(record.status, DocumentStatus::Error);

        // Nothing left pending after the sweep.
        assert!(fixture
            .store
            .list_by_status(DocumentStatus::Pending)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_pending_empty() {
        let fixture = Fixture::new();
        let report = fixture.pipeline.process_pending(None).await.unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(report.failed, 0);
        assert!(report.details.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_failed_respects_attempt_cap() {
        let fixture = Fixture::new();

        // Three error-status documents with attempts 2, 2, and 5.
        let mut docs = Vec::new();
        for (name, attempts) in [("a.txt", 2), ("b.txt", 2), ("c.txt", 5)] {
            let doc = fixture.upload_text(name, "Recoverable lesson content.").await;
            for _ in 0..attempts {
                fixture.store.begin_processing(doc.id).await.unwrap();
            }
            fixture.store.fail(doc.id, "embedding failed on batch 0: transient provider error: timeout")
                .await
                .unwrap();
            docs.push(doc);
        }

        let report = fixture
            .pipeline
            .retry_failed(DEFAULT_RETRY_ATTEMPT_CAP, None)
            .await
            .unwrap();
        assert_eq!(report.retried, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.still_failed, 0);

        let a = fixture.store.get(docs[0].id).await.unwrap().unwrap();
        let b = fixture.store.get(docs[1].id).await.unwrap().unwrap();
        assert_eq!(a.status, DocumentStatus::Processed);
        assert_eq!(a.processing_attempts, 3);
        assert_eq!(b.status, DocumentStatus::Processed);

        // The capped document is excluded and untouched.
        let c = fixture.store.get(docs[2].id).await.unwrap().unwrap();
        assert_eq!(c.status, DocumentStatus::Error);
        assert_eq!(c.processing_attempts, 5);
        assert!(c.error_message.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_failed_counts_persistent_failures() {
        let fixture = Fixture::with_provider(TestProvider::failing(usize::MAX));
        let doc = fixture.upload_text("a.txt", "Lesson content.").await;
        fixture.store.begin_processing(doc.id).await.unwrap();
        fixture.store.fail(doc.id, "boom").await.unwrap();

        let report = fixture.pipeline.retry_failed(5, None).await.unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.still_failed, 1);

        let record = fixture.store.get(doc.id).await.unwrap().unwrap();
        assert_eq!(record.status, DocumentStatus::Error);
        assert_eq!(record.processing_attempts, 2);
    }
}
