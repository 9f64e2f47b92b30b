//! Bounded in-flight document set.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

/// Default number of documents processed simultaneously.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Limits how many documents are processed at once and rejects a second
/// pipeline run for a document already in flight.
///
/// `try_acquire` never blocks or queues; a caller that gets `None` is
/// expected to come back later. Clones share the same in-flight set.
#[derive(Clone)]
pub struct ConcurrencyGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    in_flight: Mutex<HashSet<Uuid>>,
    max_concurrent: usize,
}

impl ConcurrencyGate {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(GateInner {
                in_flight: Mutex::new(HashSet::new()),
                max_concurrent: max_concurrent.max(1),
            }),
        }
    }

    /// Claim a slot for the document. Returns `None` if the document is
    /// already in flight or the gate is at capacity. The permit releases the
    /// slot when dropped, so release happens on every exit path.
    pub fn try_acquire(&self, document_id: Uuid) -> Option<GatePermit> {
        let mut in_flight = self.inner.in_flight.lock();
        if in_flight.len() >= self.inner.max_concurrent || !in_flight.insert(document_id) {
            return None;
        }
        Some(GatePermit {
            inner: self.inner.clone(),
            document_id,
        })
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    pub fn is_in_flight(&self, document_id: Uuid) -> bool {
        self.inner.in_flight.lock().contains(&document_id)
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}

/// Held for the duration of one document's pipeline run.
pub struct GatePermit {
    inner: Arc<GateInner>,
    document_id: Uuid,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.inner.in_flight.lock().remove(&self.document_id);
    }
}
