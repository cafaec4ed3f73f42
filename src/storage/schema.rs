//! SQLite schema
//!
//! One row per crawl plus an append-only table of completed documents
//! keyed by `(crawl_id, sequence)`.

/// Schema version, stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: i32 = 1;

pub const CREATE_CRAWLS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS crawls (
    id              TEXT PRIMARY KEY,
    tenant          TEXT NOT NULL,
    root            TEXT NOT NULL,
    options         TEXT NOT NULL,
    status          TEXT NOT NULL,
    completed_count INTEGER NOT NULL DEFAULT 0,
    failed_count    INTEGER NOT NULL DEFAULT 0,
    started_at      TEXT NOT NULL,
    finished_at     TEXT
)";

pub const CREATE_DOCUMENTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS documents (
    crawl_id  TEXT NOT NULL,
    sequence  INTEGER NOT NULL,
    url       TEXT NOT NULL,
    document  TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (crawl_id, sequence)
)";

pub const CREATE_DOCUMENTS_CRAWL_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_documents_crawl ON documents (crawl_id, sequence)";
