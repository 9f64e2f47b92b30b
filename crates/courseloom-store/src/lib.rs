//! Courseloom Store — document records and the chunk vector index.
//!
//! Defines the `DocumentStore` and `VectorStore` collaborator contracts the
//! processing pipeline depends on, plus `SqliteStore`, a single SQLite-backed
//! implementation of both.

pub mod embedding;
pub mod schema;
pub mod sqlite;
pub mod traits;
pub mod types;

pub use sqlite::SqliteStore;
pub use traits::{DocumentStore, VectorStore};
pub use types::*;
