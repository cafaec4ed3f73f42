//! Request options for scrapes and crawls
//!
//! Both option bags are closed sets: unknown keys are rejected at the
//! boundary by serde (`deny_unknown_fields`), and the pure `validate_*`
//! functions enforce range and consistency rules before any work is queued.

use crate::document::{ErrorKind, ErrorRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Output formats a scrape may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Format {
    Markdown,
    Html,
    RawHtml,
    Links,
    Screenshot,
    Extract,
}

/// Proxy tier for a fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProxyTier {
    #[default]
    None,
    Basic,
    Stealth,
}

/// Options for structured extraction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExtractOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Configuration for one URL fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ScrapeOptions {
    /// Requested output formats; defaults to markdown only
    pub formats: Vec<Format>,

    /// Run readability extraction to keep only the main content block
    pub only_main_content: bool,

    /// CSS selectors whose subtrees are kept (with their ancestors)
    pub include_tags: Vec<String>,

    /// CSS selectors whose subtrees are removed
    pub exclude_tags: Vec<String>,

    /// Milliseconds to wait after page load for dynamic content; only
    /// meaningful for headless strategies
    pub wait_for: u64,

    /// Total wall-clock budget for the fetch, in milliseconds
    pub timeout: u64,

    /// Extra request headers
    pub headers: HashMap<String, String>,

    /// Emulate a mobile viewport and user agent
    pub mobile: bool,

    pub skip_tls_verification: bool,

    /// Drop `<img>` elements whose src is a data: URI
    pub remove_base64_images: bool,

    /// Block ad and media requests during headless navigation
    pub block_ads: bool,

    pub proxy: ProxyTier,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractOptions>,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            formats: vec![Format::Markdown],
            only_main_content: false,
            include_tags: Vec::new(),
            exclude_tags: Vec::new(),
            wait_for: 0,
            timeout: 30_000,
            headers: HashMap::new(),
            mobile: false,
            skip_tls_verification: false,
            remove_base64_images: false,
            block_ads: false,
            proxy: ProxyTier::None,
            extract: None,
        }
    }
}

impl ScrapeOptions {
    /// Returns true if the given format was requested
    pub fn wants(&self, format: Format) -> bool {
        self.formats.contains(&format)
    }

    /// Returns true if this scrape needs a JS-executing fetcher up front
    pub fn needs_browser(&self) -> bool {
        self.wants(Format::Screenshot) || self.wait_for > 0 || self.proxy != ProxyTier::None
    }
}

/// Configuration for a crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CrawlOptions {
    /// Maximum link depth from the root
    pub max_depth: u32,

    /// Maximum number of pages (completed + failed)
    pub limit: u32,

    /// Path patterns at least one of which must match, when non-empty
    pub include_paths: Vec<String>,

    /// Path patterns none of which may match
    pub exclude_paths: Vec<String>,

    /// Allow URLs whose path is not a prefix-extension of the root's path
    pub allow_backward_links: bool,

    /// Allow URLs outside the root's registrable domain
    pub allow_external_links: bool,

    /// Skip sitemap.xml seeding
    pub ignore_sitemap: bool,

    /// Options applied to every crawled page
    pub scrape_options: ScrapeOptions,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_depth: 10,
            limit: 10_000,
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            allow_backward_links: false,
            allow_external_links: false,
            ignore_sitemap: false,
            scrape_options: ScrapeOptions::default(),
        }
    }
}

/// Validates scrape options
///
/// Pure function; returns a `BadRequest` error record on the first
/// violation found.
pub fn validate_scrape_options(options: &ScrapeOptions) -> Result<(), ErrorRecord> {
    if options.formats.is_empty() {
        return Err(bad_request("formats must not be empty"));
    }

    if options.timeout == 0 || options.timeout > 300_000 {
        return Err(bad_request(format!(
            "timeout must be between 1 and 300000 ms, got {}",
            options.timeout
        )));
    }

    if options.wait_for > options.timeout {
        return Err(bad_request(format!(
            "waitFor ({} ms) must not exceed timeout ({} ms)",
            options.wait_for, options.timeout
        )));
    }

    for selector in options.include_tags.iter().chain(&options.exclude_tags) {
        if scraper::Selector::parse(selector).is_err() {
            return Err(bad_request(format!("invalid CSS selector: {selector}")));
        }
    }

    if options.wants(Format::Extract) && options.extract.is_none() {
        return Err(bad_request(
            "extract format requested without extract options",
        ));
    }

    Ok(())
}

/// Validates crawl options, including the nested scrape options
pub fn validate_crawl_options(options: &CrawlOptions) -> Result<(), ErrorRecord> {
    if options.limit == 0 {
        return Err(bad_request("limit must be at least 1"));
    }

    if options.max_depth > 100 {
        return Err(bad_request(format!(
            "maxDepth must be at most 100, got {}",
            options.max_depth
        )));
    }

    validate_scrape_options(&options.scrape_options)
}

fn bad_request(message: impl Into<String>) -> ErrorRecord {
    ErrorRecord::new(ErrorKind::BadRequest, message)
}
