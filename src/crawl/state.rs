//! Per-crawl state
//!
//! A [`CrawlState`] is exclusively owned by its controller task; workers
//! never touch it directly. Invariants maintained here:
//!
//! - `enqueued ⊇ completed ∪ keys(failed)`
//! - `completed + failed ≤ limit`
//! - once cancelled, no new children are enqueued

use crate::document::ErrorRecord;
use crate::frontier::Frontier;
use crate::options::CrawlOptions;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use url::Url;
use uuid::Uuid;

/// Crawl lifecycle
///
/// ```text
/// created --start--> Active --frontier-empty--> Draining --inflight=0--> Completed
///              |                                   ^
///              |--cancel--> Cancelled              `--limit-reached
///              `--fatal-error--> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStatus {
    Active,
    Draining,
    Completed,
    Cancelled,
    Failed,
}

impl CrawlStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug)]
pub struct CrawlState {
    pub id: Uuid,
    pub tenant: String,
    pub root: Url,
    pub options: CrawlOptions,

    /// Canonical URLs handed to the queue at least once
    pub enqueued: HashSet<String>,

    /// Canonical URLs whose page job finished successfully
    pub completed: HashSet<String>,

    /// Canonical URLs whose page job failed terminally
    pub failed: HashMap<String, ErrorRecord>,

    pub frontier: Frontier,
    pub status: CrawlStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Page jobs currently queued or running
    pub in_flight: usize,

    /// Next document sequence number for persistence
    pub doc_sequence: u64,
}

impl CrawlState {
    pub fn new(id: Uuid, tenant: impl Into<String>, root: Url, options: CrawlOptions) -> Self {
        Self {
            id,
            tenant: tenant.into(),
            root,
            options,
            enqueued: HashSet::new(),
            completed: HashSet::new(),
            failed: HashMap::new(),
            frontier: Frontier::new(),
            status: CrawlStatus::Active,
            started_at: Utc::now(),
            finished_at: None,
            in_flight: 0,
            doc_sequence: 0,
        }
    }

    /// Pages that have reached a terminal state
    pub fn pages_settled(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    /// True while the page budget admits more work
    pub fn budget_remaining(&self) -> bool {
        self.pages_settled() + self.in_flight < self.options.limit as usize
    }

    /// Fraction complete: settled pages over the larger of enqueued count
    /// and the page limit
    pub fn progress(&self) -> f64 {
        let denominator = self.enqueued.len().max(self.options.limit as usize);
        if denominator == 0 {
            return 0.0;
        }
        self.completed.len() as f64 / denominator as f64
    }

    /// Moves to Draining: no new children, let in-flight work finish
    pub fn drain(&mut self) {
        if self.status == CrawlStatus::Active {
            tracing::debug!("Crawl {} draining", self.id);
            self.status = CrawlStatus::Draining;
        }
    }

    pub fn finish(&mut self, status: CrawlStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
        tracing::info!(
            "Crawl {} finished: {} ({} completed, {} failed)",
            self.id,
            status.as_str(),
            self.completed.len(),
            self.failed.len()
        );
    }
}
