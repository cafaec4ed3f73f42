//! SQLite storage backend

use crate::document::Document;
use crate::storage::schema;
use crate::storage::{CrawlRecord, Storage, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path` and applies the schema
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database, used by tests and ephemeral workers
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> StorageResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        conn.execute(schema::CREATE_CRAWLS_TABLE, [])?;
        conn.execute(schema::CREATE_DOCUMENTS_TABLE, [])?;
        conn.execute(schema::CREATE_DOCUMENTS_CRAWL_INDEX, [])?;
        conn.pragma_update(None, "user_version", schema::SCHEMA_VERSION)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Storage for SqliteStorage {
    fn upsert_crawl(&self, record: &CrawlRecord) -> StorageResult<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO crawls (id, tenant, root, options, status, completed_count, failed_count, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                completed_count = excluded.completed_count,
                failed_count = excluded.failed_count,
                finished_at = excluded.finished_at",
            params![
                record.id.to_string(),
                record.tenant,
                record.root,
                record.options,
                record.status,
                record.completed_count,
                record.failed_count,
                record.started_at.to_rfc3339(),
                record.finished_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn get_crawl(&self, id: Uuid) -> StorageResult<Option<CrawlRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                "SELECT id, tenant, root, options, status, completed_count, failed_count, started_at, finished_at
                 FROM crawls WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(RawCrawlRow {
                        id: row.get(0)?,
                        tenant: row.get(1)?,
                        root: row.get(2)?,
                        options: row.get(3)?,
                        status: row.get(4)?,
                        completed_count: row.get(5)?,
                        failed_count: row.get(6)?,
                        started_at: row.get(7)?,
                        finished_at: row.get(8)?,
                    })
                },
            )
            .optional()?;

        record.map(RawCrawlRow::into_record).transpose()
    }

    fn append_document(
        &self,
        crawl_id: Uuid,
        sequence: u64,
        url: &str,
        document: &Document,
    ) -> StorageResult<()> {
        let blob = serde_json::to_string(document)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO documents (crawl_id, sequence, url, document, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                crawl_id.to_string(),
                sequence as i64,
                url,
                blob,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn documents_page(
        &self,
        crawl_id: Uuid,
        offset: u64,
        limit: u32,
    ) -> StorageResult<Vec<Document>> {
        let conn = self.lock();
        let mut statement = conn.prepare(
            "SELECT document FROM documents
             WHERE crawl_id = ?1
             ORDER BY sequence
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = statement.query_map(
            params![crawl_id.to_string(), limit as i64, offset as i64],
            |row| row.get::<_, String>(0),
        )?;

        let mut documents = Vec::new();
        for blob in rows {
            let blob = blob?;
            let document = serde_json::from_str(&blob)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            documents.push(document);
        }
        Ok(documents)
    }

    fn document_count(&self, crawl_id: Uuid) -> StorageResult<u64> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE crawl_id = ?1",
            params![crawl_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

struct RawCrawlRow {
    id: String,
    tenant: String,
    root: String,
    options: String,
    status: String,
    completed_count: u32,
    failed_count: u32,
    started_at: String,
    finished_at: Option<String>,
}

impl RawCrawlRow {
    fn into_record(self) -> StorageResult<CrawlRecord> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| StorageError::Serialization(format!("bad crawl id: {e}")))?;
        let started_at = parse_timestamp(&self.started_at)?;
        let finished_at = self
            .finished_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;

        Ok(CrawlRecord {
            id,
            tenant: self.tenant,
            root: self.root,
            options: self.options,
            status: self.status,
            completed_count: self.completed_count,
            failed_count: self.failed_count,
            started_at,
            finished_at,
        })
    }
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp {raw}: {e}")))
}
