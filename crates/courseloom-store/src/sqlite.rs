//! SQLite-backed document record store and chunk vector index.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;
use uuid::Uuid;

use crate::embedding::{blob_to_embedding, embedding_to_blob};
use crate::schema::SCHEMA_SQL;
use crate::traits::{DocumentStore, VectorStore};
use crate::types::*;
use courseloom_core::{Error, Result};

/// SQLite store implementing both `DocumentStore` and `VectorStore`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create the store.
    ///
    /// `db_dir` is the directory (e.g., `data/indexdb/`). The file will be
    /// `db_dir/courseloom.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        let db_path = db_dir.join("courseloom.db");

        let conn = Self::create_connection(&db_path)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        let doc_count = store.count_documents()?;
        info!(
            "SqliteStore initialized: {} documents, path={}",
            doc_count,
            store.db_path.display()
        );

        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        Ok(())
    }

    /// Count total documents.
    pub fn count_documents(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count)
    }

    /// Read back a document's chunks ordered by chunk index.
    pub fn chunks_for_document(&self, document_id: Uuid) -> Result<Vec<StoredChunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT document_id, chunk_index, content, embedding, metadata_json
                 FROM chunks WHERE document_id = ?1 ORDER BY chunk_index ASC",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![document_id.to_string()], |row| {
                let id_text: String = row.get(0)?;
                let document_id = parse_uuid(&id_text, 0)?;
                let blob: Vec<u8> = row.get(3)?;
                let metadata_json: Option<String> = row.get(4)?;
                Ok(StoredChunk {
                    document_id,
                    chunk_index: row.get(1)?,
                    content: row.get(2)?,
                    embedding: blob_to_embedding(&blob),
                    metadata: metadata_json.and_then(|s| serde_json::from_str(&s).ok()),
                })
            })
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))
    }

    fn list_where(&self, condition: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Document>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE {condition} ORDER BY created_at ASC"
        );
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params, row_to_document)
            .map_err(|e| Error::Database(e.to_string()))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| Error::Database(e.to_string()))
    }
}

const DOCUMENT_COLUMNS: &str = "id, storage_key, original_name, mime_type, status, chunk_count, \
     processing_attempts, error_message, last_processed_at, chunk_size, chunk_overlap, \
     stage_ids_json, created_at";

fn parse_uuid(text: &str, column: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let id_text: String = row.get(0)?;
    let id = parse_uuid(&id_text, 0)?;
    let status_text: String = row.get(4)?;
    let status = status_text.parse::<DocumentStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
    })?;
    let stage_ids_json: Option<String> = row.get(11)?;
    Ok(Document {
        id,
        storage_key: row.get(1)?,
        original_name: row.get(2)?,
        mime_type: row.get(3)?,
        status,
        chunk_count: row.get(5)?,
        processing_attempts: row.get(6)?,
        error_message: row.get(7)?,
        last_processed_at: row.get(8)?,
        chunk_size: row.get::<_, Option<i64>>(9)?.map(|v| v as usize),
        chunk_overlap: row.get::<_, Option<i64>>(10)?.map(|v| v as usize),
        stage_ids: stage_ids_json.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get(12)?,
    })
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert(&self, new: NewDocument) -> Result<Document> {
        let id = Uuid::new_v4();
        let now = now_millis();
        let stage_ids_json = new
            .stage_ids
            .as_ref()
            .map(|ids| serde_json::to_string(ids))
            .transpose()?;

        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO documents \
                 (id, storage_key, original_name, mime_type, status, chunk_size, chunk_overlap, \
                  stage_ids_json, created_at) \
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8)",
        )
        .map_err(|e| Error::Database(e.to_string()))?
        .execute(params![
            id.to_string(),
            new.storage_key,
            new.original_name,
            new.mime_type,
            new.chunk_size.map(|v| v as i64),
            new.chunk_overlap.map(|v| v as i64),
            stage_ids_json,
            now,
        ])
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Document {
            id,
            storage_key: new.storage_key,
            original_name: new.original_name,
            mime_type: new.mime_type,
            status: DocumentStatus::Pending,
            chunk_count: 0,
            processing_attempts: 0,
            error_message: None,
            last_processed_at: None,
            chunk_size: new.chunk_size,
            chunk_overlap: new.chunk_overlap,
            stage_ids: new.stage_ids,
            created_at: now,
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1");
        let row = conn
            .prepare_cached(&sql)
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![id.to_string()], row_to_document)
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row)
    }

    async fn list_by_status(&self, status: DocumentStatus) -> Result<Vec<Document>> {
        self.list_where("status = ?1", &[&status.as_str()])
    }

    async fn list_retryable(&self, max_attempts: i64) -> Result<Vec<Document>> {
        self.list_where(
            "status = 'error' AND processing_attempts < ?1",
            &[&max_attempts],
        )
    }

    async fn begin_processing(&self, id: Uuid) -> Result<i64> {
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE documents SET status = 'processing', \
                     processing_attempts = processing_attempts + 1, \
                     error_message = NULL \
                 WHERE id = ?1",
                params![id.to_string()],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        if updated == 0 {
            return Err(Error::NotFound(format!("document {id}")));
        }
        let attempts: i64 = conn
            .query_row(
                "SELECT processing_attempts FROM documents WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(attempts)
    }

    async fn complete(&self, id: Uuid, chunk_count: i64) -> Result<()> {
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE documents SET status = 'processed', chunk_count = ?1, \
                     last_processed_at = ?2, error_message = NULL \
                 WHERE id = ?3",
                params![chunk_count, now_millis(), id.to_string()],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        if updated == 0 {
            return Err(Error::NotFound(format!("document {id}")));
        }
        Ok(())
    }

    async fn fail(&self, id: Uuid, message: &str) -> Result<()> {
        let conn = self.conn.lock();
        let updated = conn
            .execute(
                "UPDATE documents SET status = 'error', error_message = ?1, \
                     last_processed_at = ?2 \
                 WHERE id = ?3",
                params![message, now_millis(), id.to_string()],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        if updated == 0 {
            return Err(Error::NotFound(format!("document {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn init(&self) -> Result<()> {
        let conn = self.conn.lock();
        Self::init_schema(&conn)
    }

    async fn insert_chunks(&self, document_id: Uuid, chunks: &[EmbeddedChunk]) -> Result<()> {
        let now = now_millis();
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO chunks \
                         (document_id, chunk_index, content, embedding, metadata_json, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(|e| Error::Database(e.to_string()))?;
            for chunk in chunks {
                let metadata_json = serde_json::to_string(&chunk.metadata)?;
                stmt.execute(params![
                    document_id.to_string(),
                    chunk.metadata.chunk_index as i64,
                    chunk.content,
                    embedding_to_blob(&chunk.embedding),
                    metadata_json,
                    now,
                ])
                .map_err(|e| Error::Database(e.to_string()))?;
            }
        }
        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_by_document(&self, document_id: Uuid) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM chunks WHERE document_id = ?1",
            params![document_id.to_string()],
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn count_by_document(&self, document_id: Uuid) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE document_id = ?1",
                params![document_id.to_string()],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count)
    }
}
