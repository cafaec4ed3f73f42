//! Crawl admissibility filtering
//!
//! Decides whether a discovered URL may enter a crawl's frontier. The
//! predicate is deterministic and side-effect-free: the robots verdict is
//! resolved by the caller (through the shared cache) and passed in.

use crate::options::CrawlOptions;
use crate::url::domain::same_site;
use crate::url::matcher::matches_path_pattern;
use std::collections::HashSet;
use url::Url;

/// File extensions that never contain crawlable HTML
const BINARY_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "zip", "tar", "gz", "bz2", "rar", "7z",
    "png", "jpg", "jpeg", "gif", "webp", "svg", "ico", "bmp", "tiff", "mp3", "wav", "flac", "ogg",
    "mp4", "avi", "mov", "mkv", "webm", "exe", "dmg", "apk", "iso", "bin", "css", "js", "woff",
    "woff2", "ttf",
];

/// Why a URL was rejected from the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Scheme is not http or https
    Scheme,
    /// Host is outside the crawl root's registrable domain
    ExternalHost,
    /// Path points at binary media
    BinaryPath,
    /// robots.txt disallows the configured user agent
    RobotsDenied,
    /// includePaths is set and no pattern matched
    NotIncluded,
    /// An excludePaths pattern matched
    Excluded,
    /// Link depth exceeds maxDepth
    DepthExceeded,
    /// Already visited or enqueued in this crawl
    AlreadySeen,
    /// Path is not a prefix-extension of the root's path
    BackwardLink,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheme => "scheme",
            Self::ExternalHost => "external-host",
            Self::BinaryPath => "binary-path",
            Self::RobotsDenied => "robots-denied",
            Self::NotIncluded => "not-included",
            Self::Excluded => "excluded",
            Self::DepthExceeded => "depth-exceeded",
            Self::AlreadySeen => "already-seen",
            Self::BackwardLink => "backward-link",
        }
    }
}

/// Everything the admissibility predicate needs besides the URL itself
pub struct AdmissionCheck<'a> {
    /// Canonicalized crawl root
    pub root: &'a Url,

    pub options: &'a CrawlOptions,

    /// Verdict from the robots cache for this URL
    pub robots_allowed: bool,

    /// Canonical URL strings already visited or enqueued by the crawl
    pub seen: &'a HashSet<String>,
}

/// Decides whether `url` at `depth` may enter the frontier
///
/// Checks are ordered cheapest-first; the first failing check wins.
pub fn admissible(url: &Url, depth: u32, check: &AdmissionCheck<'_>) -> Result<(), RejectReason> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(RejectReason::Scheme);
    }

    if depth > check.options.max_depth {
        return Err(RejectReason::DepthExceeded);
    }

    let host = url.host_str().unwrap_or("");
    let root_host = check.root.host_str().unwrap_or("");
    if !check.options.allow_external_links && !same_site(root_host, host) {
        return Err(RejectReason::ExternalHost);
    }

    if has_binary_extension(url.path()) {
        return Err(RejectReason::BinaryPath);
    }

    let path = url.path();

    if !check.options.include_paths.is_empty()
        && !check
            .options
            .include_paths
            .iter()
            .any(|p| matches_path_pattern(p, path))
    {
        return Err(RejectReason::NotIncluded);
    }

    if check
        .options
        .exclude_paths
        .iter()
        .any(|p| matches_path_pattern(p, path))
    {
        return Err(RejectReason::Excluded);
    }

    if !check.options.allow_backward_links
        && same_site(root_host, host)
        && !is_prefix_extension(check.root.path(), path)
    {
        return Err(RejectReason::BackwardLink);
    }

    if !check.robots_allowed {
        return Err(RejectReason::RobotsDenied);
    }

    if check.seen.contains(url.as_str()) {
        return Err(RejectReason::AlreadySeen);
    }

    Ok(())
}

/// True when `path` lives at or below `root_path`
///
/// The root's final segment is treated as a directory: a root of `/docs`
/// admits `/docs` and `/docs/intro` but not `/downloads`.
fn is_prefix_extension(root_path: &str, path: &str) -> bool {
    let base = root_path.trim_end_matches('/');
    if base.is_empty() {
        return true;
    }

    path == base || path.starts_with(&format!("{base}/"))
}

fn has_binary_extension(path: &str) -> bool {
    let Some(last_segment) = path.rsplit('/').next() else {
        return false;
    };
    let Some((_, ext)) = last_segment.rsplit_once('.') else {
        return false;
    };

    BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}
