//! Courseloom Ingest — chunk splitting, text extraction, source file access.

pub mod extract;
pub mod source;
pub mod splitter;

pub use extract::{ExtractorRegistry, PlainTextExtractor, TextExtractor};
pub use source::{FetchedSource, HttpStorage, LocalStorage, Storage};
pub use splitter::split_into_chunks;
