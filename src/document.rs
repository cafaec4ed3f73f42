//! Document model: the result of processing one URL
//!
//! A [`Document`] is produced by the content pipeline and handed off to the
//! caller (or persisted by a crawl). The pipeline retains no reference after
//! delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Error kinds surfaced to clients
///
/// The serialized string of each kind is stable and safe to expose; clients
/// match on it programmatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    NotFound,
    RateLimited,
    Timeout,
    FetchBlocked,
    FetchFailed,
    TransformFailed,
    ExtractFailed,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Returns the stable client-facing string for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "badRequest",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "notFound",
            Self::RateLimited => "rateLimited",
            Self::Timeout => "timeout",
            Self::FetchBlocked => "fetchBlocked",
            Self::FetchFailed => "fetchFailed",
            Self::TransformFailed => "transformFailed",
            Self::ExtractFailed => "extractFailed",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }

    /// Returns true if a job failing with this kind may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::FetchFailed | Self::Internal)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified error attached to a document or a failed page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }
}

/// The result of processing one URL
///
/// Invariant: if `error` is present, `markdown` and `html` may be absent;
/// otherwise `markdown` is always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// URL as requested
    pub source_url: String,

    /// URL after redirects
    pub final_url: String,

    pub status_code: u16,

    pub fetched_at: DateTime<Utc>,

    /// Untouched response body, present only when the `rawHtml` format was
    /// requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,

    /// Cleaned HTML
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,

    /// Plain text derived from the markdown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Ordered unique list of absolute URLs discovered in the body
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,

    /// Page metadata (title, description, Open Graph tags, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,

    /// PNG screenshot bytes, when requested and the fetcher supports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<Vec<u8>>,

    /// Structured extraction output, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl Document {
    /// Creates an empty document shell for a fetched URL
    pub fn new(source_url: impl Into<String>, final_url: impl Into<String>, status_code: u16) -> Self {
        Self {
            source_url: source_url.into(),
            final_url: final_url.into(),
            status_code,
            fetched_at: Utc::now(),
            raw_html: None,
            html: None,
            markdown: None,
            text: None,
            title: None,
            description: None,
            language: None,
            links: Vec::new(),
            metadata: HashMap::new(),
            screenshot: None,
            extract: None,
            error: None,
        }
    }

    /// Creates a document representing a failed page
    pub fn failed(source_url: impl Into<String>, error: ErrorRecord) -> Self {
        let source_url = source_url.into();
        let mut doc = Self::new(source_url.clone(), source_url, 0);
        doc.error = Some(error);
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_strings_are_stable() {
        assert_eq!(ErrorKind::FetchBlocked.as_str(), "fetchBlocked");
        assert_eq!(ErrorKind::TransformFailed.as_str(), "transformFailed");
        assert_eq!(ErrorKind::BadRequest.as_str(), "badRequest");
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::FetchFailed.is_retryable());
        assert!(!ErrorKind::FetchBlocked.is_retryable());
        assert!(!ErrorKind::BadRequest.is_retryable());
        assert!(!ErrorKind::Cancelled.is_retryable());
    }

    #[test]
    fn test_failed_document_carries_error() {
        let doc = Document::failed(
            "https://example.com/",
            ErrorRecord::new(ErrorKind::FetchFailed, "connection reset"),
        );
        assert!(doc.markdown.is_none());
        assert_eq!(doc.error.unwrap().kind, ErrorKind::FetchFailed);
    }

    #[test]
    fn test_document_serializes_camel_case() {
        let doc = Document::new("https://a.test/", "https://a.test/", 200);
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("sourceUrl").is_some());
        assert!(json.get("finalUrl").is_some());
        assert!(json.get("statusCode").is_some());
    }
}
