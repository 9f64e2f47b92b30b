//! Courseloom Pipeline — document lifecycle orchestration.
//!
//! `DocumentPipeline` runs one document's full processing transaction —
//! fetch, extract, split, embed, index — under a bounded `ConcurrencyGate`,
//! and the batch drivers sweep pending and failed documents with isolated
//! per-document failure domains.

pub mod drivers;
pub mod error;
pub mod gate;
pub mod processor;

pub use drivers::{BatchReport, RetryReport, DEFAULT_RETRY_ATTEMPT_CAP};
pub use error::ProcessError;
pub use gate::{ConcurrencyGate, GatePermit, DEFAULT_MAX_CONCURRENT};
pub use processor::{DocumentPipeline, ProcessOutcome};
