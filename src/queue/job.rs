//! Job model
//!
//! A job is one unit of work on the shared queue: a synchronous scrape, a
//! crawl root, or one page of a crawl. Priorities are integers; lower is
//! more urgent, FIFO within a priority.

use crate::options::ScrapeOptions;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Priority assigned to synchronous scrape jobs
pub const SCRAPE_PRIORITY: i32 = 100;

/// Priority assigned to crawl page jobs
pub const CRAWL_PAGE_PRIORITY: i32 = 200;

/// Default retry ceiling for a job
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Ceiling on one retry delay
const MAX_BACKOFF: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobKind {
    Scrape,
    Crawl,
    CrawlPage,
}

impl JobKind {
    pub fn default_priority(&self) -> i32 {
        match self {
            Self::Scrape | Self::Crawl => SCRAPE_PRIORITY,
            Self::CrawlPage => CRAWL_PAGE_PRIORITY,
        }
    }
}

/// What a job operates on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub url: String,

    /// Tenant the work is billed and capped against
    pub tenant: String,

    pub options: ScrapeOptions,

    /// Parent crawl, for crawl and crawlPage jobs
    pub crawl_id: Option<Uuid>,

    /// Link depth from the crawl root; zero for scrapes
    pub depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub payload: JobPayload,
    pub priority: i32,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(kind: JobKind, payload: JobPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            priority: kind.default_priority(),
            payload,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            created_at: Utc::now(),
        }
    }

    pub fn scrape(url: impl Into<String>, tenant: impl Into<String>, options: ScrapeOptions) -> Self {
        Self::new(
            JobKind::Scrape,
            JobPayload {
                url: url.into(),
                tenant: tenant.into(),
                options,
                crawl_id: None,
                depth: 0,
            },
        )
    }

    pub fn crawl_root(
        url: impl Into<String>,
        tenant: impl Into<String>,
        crawl_id: Uuid,
        options: ScrapeOptions,
    ) -> Self {
        Self::new(
            JobKind::Crawl,
            JobPayload {
                url: url.into(),
                tenant: tenant.into(),
                options,
                crawl_id: Some(crawl_id),
                depth: 0,
            },
        )
    }

    pub fn crawl_page(
        url: impl Into<String>,
        tenant: impl Into<String>,
        crawl_id: Uuid,
        depth: u32,
        options: ScrapeOptions,
    ) -> Self {
        Self::new(
            JobKind::CrawlPage,
            JobPayload {
                url: url.into(),
                tenant: tenant.into(),
                options,
                crawl_id: Some(crawl_id),
                depth,
            },
        )
    }

    /// True if the job may be re-queued after a retryable failure
    pub fn can_retry(&self) -> bool {
        self.attempts + 1 < self.max_attempts
    }
}

/// Computes the delay before re-queueing a failed job
///
/// Exponential backoff `base * 2^attempts`, jittered by up to 25% to keep
/// retry storms from aligning, capped at five minutes.
pub fn backoff_delay(base: Duration, attempts: u32) -> Duration {
    let exponent = attempts.min(16);
    let raw = base.saturating_mul(2u32.saturating_pow(exponent));
    let capped = raw.min(MAX_BACKOFF);

    let jitter_range = capped.as_millis() as u64 / 4;
    let jitter = if jitter_range == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_range)
    };

    capped + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities() {
        let scrape = Job::scrape("https://a.test/", "t1", ScrapeOptions::default());
        assert_eq!(scrape.priority, 100);

        let page = Job::crawl_page(
            "https://a.test/p",
            "t1",
            Uuid::new_v4(),
            1,
            ScrapeOptions::default(),
        );
        assert_eq!(page.priority, 200);
        // Lower value wins: scrape outranks crawl page
        assert!(scrape.priority < page.priority);
    }

    #[test]
    fn test_can_retry_respects_max_attempts() {
        let mut job = Job::scrape("https://a.test/", "t1", ScrapeOptions::default());
        assert_eq!(job.max_attempts, DEFAULT_MAX_ATTEMPTS);

        assert!(job.can_retry());
        job.attempts = 1;
        assert!(job.can_retry());
        job.attempts = 2;
        assert!(!job.can_retry());
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let base = Duration::from_secs(1);

        for attempts in 0..4 {
            let expected_floor = Duration::from_secs(1 << attempts);
            let delay = backoff_delay(base, attempts);
            assert!(delay >= expected_floor, "attempt {attempts}: {delay:?}");
            // Jitter adds at most 25%
            assert!(delay <= expected_floor + expected_floor / 4 + Duration::from_millis(1));
        }
    }

    #[test]
    fn test_backoff_capped() {
        let delay = backoff_delay(Duration::from_secs(5), 30);
        assert!(delay <= MAX_BACKOFF + MAX_BACKOFF / 4);
    }
}
