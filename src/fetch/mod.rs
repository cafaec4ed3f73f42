//! Fetcher strategies
//!
//! A fetcher retrieves raw HTML for one URL via one method. The closed set
//! of strategies, ordered cheapest-first:
//!
//! - [`PlainHttpFetcher`] - single GET, no JS
//! - [`HeadlessFetcher`] - drives the browser sidecar
//! - [`StealthFetcher`] - headless through a residential proxy with
//!   fingerprint evasion
//! - [`FireEngineFetcher`] - external fetching service of last resort
//!
//! The [`FetcherSelector`] orders strategies by capability needs and falls
//! back on recoverable failures.

mod fire_engine;
mod headless;
mod http;
mod proxy;
mod selector;
mod stealth;

pub use fire_engine::FireEngineFetcher;
pub use headless::{HeadlessFetcher, SidecarRequest, SidecarResponse};
pub use http::PlainHttpFetcher;
pub use proxy::{ProxyEndpoint, ProxyPool};
pub use selector::{FetchAttempt, FetchOutcome, FetcherSelector};
pub use stealth::StealthFetcher;

use crate::options::ScrapeOptions;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Per-strategy capability flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetcherCapability {
    pub executes_js: bool,
    pub supports_screenshot: bool,
    pub supports_proxy: bool,
    pub supports_stealth: bool,
    pub respects_wait_for: bool,
}

/// Classified fetch failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Connection reset, 5xx, timeout; worth retrying elsewhere
    Transient,
    /// 403, 429, or bot-detection markers in the body
    Blocked,
    /// 404 or 410
    NotFound,
    /// Empty body or non-HTML content where HTML was required
    InvalidContent,
    /// Invalid URL, DNS failure, TLS failure; no strategy will recover
    Fatal,
}

/// A classified failure from one fetch strategy
#[derive(Debug, Clone, Error)]
#[error("{kind:?} fetching {url}: {message}")]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub url: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl FetchFailure {
    pub fn new(kind: FailureKind, url: &Url, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.to_string(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }
}

/// Raw result of one successful fetch
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Final URL after redirects
    pub final_url: String,

    pub status_code: u16,

    /// Response headers, lowercased keys
    pub headers: HashMap<String, String>,

    pub body: String,

    /// PNG screenshot, when requested and supported
    pub screenshot: Option<Vec<u8>>,

    /// Wall-clock time spent in the strategy
    pub timing: Duration,
}

/// A strategy that retrieves raw HTML for one URL
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Stable strategy name, used in logs and attempt trails
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> FetcherCapability;

    /// Fetches one URL within the given wall-clock budget
    async fn fetch(
        &self,
        url: &Url,
        options: &ScrapeOptions,
        budget: Duration,
    ) -> Result<FetchResult, FetchFailure>;
}

/// Maps an HTTP status to a failure kind, or None for success statuses
pub fn classify_status(status: u16) -> Option<FailureKind> {
    match status {
        200..=299 => None,
        403 | 429 => Some(FailureKind::Blocked),
        404 | 410 => Some(FailureKind::NotFound),
        500..=599 => Some(FailureKind::Transient),
        _ => Some(FailureKind::Fatal),
    }
}

/// Bot-detection markers that make a 200 response worthless
const CHALLENGE_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "cf_chl_opt",
    "Just a moment...",
    "Attention Required! | Cloudflare",
    "Checking if the site connection is secure",
    "DDoS protection by",
    "Access denied | ",
];

/// Checks a response body for bot-challenge interstitials
///
/// Only the leading slice is searched; challenge pages announce themselves
/// early.
pub fn looks_like_challenge(body: &str) -> bool {
    let head = body.get(..8_192).unwrap_or(body);
    CHALLENGE_MARKERS.iter().any(|m| head.contains(m))
}

/// Checks that a content-type header carries HTML
pub fn is_html_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim();
    essence.is_empty()
        || essence.eq_ignore_ascii_case("text/html")
        || essence.eq_ignore_ascii_case("application/xhtml+xml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(200), None);
        assert_eq!(classify_status(204), None);
        assert_eq!(classify_status(403), Some(FailureKind::Blocked));
        assert_eq!(classify_status(429), Some(FailureKind::Blocked));
        assert_eq!(classify_status(404), Some(FailureKind::NotFound));
        assert_eq!(classify_status(410), Some(FailureKind::NotFound));
        assert_eq!(classify_status(500), Some(FailureKind::Transient));
        assert_eq!(classify_status(503), Some(FailureKind::Transient));
        assert_eq!(classify_status(400), Some(FailureKind::Fatal));
    }

    #[test]
    fn test_challenge_detection() {
        assert!(looks_like_challenge(
            "<html><title>Just a moment...</title></html>"
        ));
        assert!(!looks_like_challenge("<html><body>Hello</body></html>"));
    }

    #[test]
    fn test_html_content_types() {
        assert!(is_html_content_type("text/html"));
        assert!(is_html_content_type("text/html; charset=utf-8"));
        assert!(is_html_content_type("application/xhtml+xml"));
        assert!(is_html_content_type(""));
        assert!(!is_html_content_type("application/json"));
        assert!(!is_html_content_type("image/png"));
    }
}
