//! Dredge: a web scraping and crawling service
//!
//! This crate implements the scrape pipeline engine: multi-strategy fetching
//! with ordered fallback, HTML cleaning and Markdown conversion, and a
//! bounded-concurrency crawler with robots.txt compliance, job retries, and
//! per-crawl progress reporting.

pub mod config;
pub mod crawl;
pub mod document;
pub mod fetch;
pub mod frontier;
pub mod options;
pub mod pipeline;
pub mod queue;
pub mod robots;
pub mod service;
pub mod storage;
pub mod url;
pub mod worker;

use thiserror::Error;

/// Main error type for Dredge operations
#[derive(Debug, Error)]
pub enum DredgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Fetch failed for {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Crawl not found: {0}")]
    CrawlNotFound(uuid::Uuid),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Service is shutting down")]
    ShuttingDown,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Dredge operations
pub type Result<T> = std::result::Result<T, DredgeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use document::{Document, ErrorKind, ErrorRecord};
pub use options::{CrawlOptions, Format, ScrapeOptions};
pub use service::ScrapeService;
pub use url::canonicalize;
