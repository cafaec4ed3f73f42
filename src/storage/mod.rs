//! Result persistence
//!
//! Per crawl: one record with status and counters, and an append-only list
//! of completed documents keyed by `(crawl_id, sequence)`. Scrape results
//! are returned synchronously and never stored.

mod schema;
mod sqlite;

pub use sqlite::SqliteStorage;

use crate::document::Document;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Errors from storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Crawl not found: {0}")]
    CrawlNotFound(Uuid),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Persisted crawl record
#[derive(Debug, Clone)]
pub struct CrawlRecord {
    pub id: Uuid,
    pub tenant: String,
    pub root: String,

    /// CrawlOptions as JSON
    pub options: String,

    pub status: String,
    pub completed_count: u32,
    pub failed_count: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Storage backend interface
///
/// Implementations are shared across tasks; interior locking keeps
/// operations atomic.
pub trait Storage: Send + Sync {
    /// Inserts or replaces a crawl record
    fn upsert_crawl(&self, record: &CrawlRecord) -> StorageResult<()>;

    fn get_crawl(&self, id: Uuid) -> StorageResult<Option<CrawlRecord>>;

    /// Appends one completed document; sequences are dense per crawl
    fn append_document(
        &self,
        crawl_id: Uuid,
        sequence: u64,
        url: &str,
        document: &Document,
    ) -> StorageResult<()>;

    /// Reads a page of documents ordered by sequence
    fn documents_page(
        &self,
        crawl_id: Uuid,
        offset: u64,
        limit: u32,
    ) -> StorageResult<Vec<Document>>;

    fn document_count(&self, crawl_id: Uuid) -> StorageResult<u64>;
}
