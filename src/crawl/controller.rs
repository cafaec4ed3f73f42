//! Crawl controller
//!
//! One controller task per crawl. It is the single writer of the crawl's
//! state and frontier; workers report page outcomes over the event channel
//! and never touch the state directly. The controller seeds the frontier
//! (root plus sitemap), keeps the queue fed within the per-crawl cap and
//! page budget, folds discovered links back in, and drives the status
//! machine to a terminal state.

use crate::crawl::registry::{CrawlHandle, CrawlSnapshot};
use crate::crawl::sitemap::discover_sitemap_urls;
use crate::crawl::state::{CrawlState, CrawlStatus};
use crate::document::{Document, ErrorRecord};
use crate::queue::{Job, MemoryQueue};
use crate::robots::RobotsCache;
use crate::storage::{CrawlRecord, Storage};
use crate::url::{admissible, canonicalize_with, AdmissionCheck};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Worker-to-controller events
#[derive(Debug)]
pub enum CrawlEvent {
    /// The crawl root job was leased; seed and start pumping
    Start,

    PageCompleted {
        job_id: Uuid,
        url: String,
        depth: u32,
        document: Box<Document>,
    },

    PageFailed {
        job_id: Uuid,
        url: String,
        error: ErrorRecord,
        /// Raw fetch classification, for the controller-fault policy
        fatal: bool,
    },

    Cancel,
}

/// Shared dependencies a controller needs
#[derive(Clone)]
pub struct ControllerContext {
    pub queue: Arc<MemoryQueue>,
    pub robots: Arc<RobotsCache>,
    pub storage: Arc<dyn Storage>,
    pub client: reqwest::Client,

    /// Maximum page jobs in flight per crawl
    pub per_crawl_cap: usize,

    /// Retry ceiling applied to page jobs
    pub max_attempts: u32,

    /// Whole-crawl wall-clock bound; None disables it
    pub crawl_timeout: Option<Duration>,

    /// Hosts whose query strings are preserved verbatim
    pub param_sensitive_hosts: HashSet<String>,
}

pub struct CrawlController {
    state: CrawlState,
    ctx: ControllerContext,
    events: mpsc::Receiver<CrawlEvent>,
    cancelled: Arc<AtomicBool>,
    snapshot: Arc<RwLock<CrawlSnapshot>>,

    /// Page jobs handed to the queue and not yet settled
    open_jobs: HashSet<Uuid>,

    /// The root page failed with a Fatal classification
    root_fatal: bool,
}

impl CrawlController {
    /// Creates the controller, spawns its task, and returns the handle to
    /// register
    pub fn spawn(state: CrawlState, ctx: ControllerContext) -> CrawlHandle {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancelled = Arc::new(AtomicBool::new(false));
        let snapshot = Arc::new(RwLock::new(CrawlSnapshot::new(state.started_at)));

        let handle = CrawlHandle {
            events: tx,
            cancelled: cancelled.clone(),
            snapshot: snapshot.clone(),
        };

        let controller = Self {
            state,
            ctx,
            events: rx,
            cancelled,
            snapshot,
            open_jobs: HashSet::new(),
            root_fatal: false,
        };
        tokio::spawn(controller.run());

        handle
    }

    async fn run(mut self) {
        self.persist();
        self.publish_snapshot().await;

        let deadline = self
            .ctx
            .crawl_timeout
            .map(|t| tokio::time::Instant::now() + t);
        let mut timed_out = false;

        loop {
            let event = match deadline.filter(|_| !timed_out) {
                Some(d) => match tokio::time::timeout_at(d, self.events.recv()).await {
                    Ok(event) => event,
                    Err(_) => {
                        tracing::warn!("Crawl {} hit its time budget, draining", self.state.id);
                        timed_out = true;
                        self.state.drain();
                        if self.maybe_finish().await {
                            break;
                        }
                        continue;
                    }
                },
                None => self.events.recv().await,
            };

            let Some(event) = event else {
                // Registry dropped the handle; nothing can reach us anymore
                break;
            };

            match event {
                CrawlEvent::Start => {
                    self.seed().await;
                    self.pump();
                    self.publish_snapshot().await;
                    if self.maybe_finish().await {
                        break;
                    }
                }
                CrawlEvent::PageCompleted {
                    job_id,
                    url,
                    depth,
                    document,
                } => {
                    self.handle_page_completed(job_id, url, depth, *document).await;
                    if self.maybe_finish().await {
                        break;
                    }
                }
                CrawlEvent::PageFailed {
                    job_id,
                    url,
                    error,
                    fatal,
                } => {
                    self.handle_page_failed(job_id, url, error, fatal).await;
                    if self.maybe_finish().await {
                        break;
                    }
                }
                CrawlEvent::Cancel => {
                    self.cancel().await;
                    break;
                }
            }
        }
    }

    /// Seeds the frontier with the root and admissible sitemap URLs
    async fn seed(&mut self) {
        tracing::info!("Crawl {} starting at {}", self.state.id, self.state.root);

        self.ctx.robots.preload(&self.state.root).await;

        let root = self.state.root.clone();
        self.state.frontier.push(root, 0);

        if !self.state.options.ignore_sitemap {
            let limit = self.state.options.limit as usize;
            let discovered =
                discover_sitemap_urls(&self.ctx.client, &self.state.root, limit).await;

            for url in discovered {
                self.consider_link(url.as_str(), 1).await;
            }
        }
    }

    /// Canonicalizes and filters one discovered URL, pushing it when
    /// admissible
    async fn consider_link(&mut self, raw: &str, depth: u32) {
        let Ok(url) = canonicalize_with(raw, &self.ctx.param_sensitive_hosts) else {
            return;
        };

        if self.state.frontier.contains(&url) {
            return;
        }

        // Cheap checks first; the robots verdict may cost a fetch
        let optimistic = AdmissionCheck {
            root: &self.state.root,
            options: &self.state.options,
            robots_allowed: true,
            seen: &self.state.enqueued,
        };
        if let Err(reason) = admissible(&url, depth, &optimistic) {
            tracing::trace!("Rejected {} at depth {}: {}", url, depth, reason.as_str());
            return;
        }

        if !self.ctx.robots.is_allowed(&url).await {
            tracing::trace!("Rejected {} at depth {}: robots-denied", url, depth);
            return;
        }

        self.state.frontier.push(url, depth);
    }

    /// Feeds the queue while the crawl is active, the per-crawl cap has
    /// room, and the page budget is not exhausted
    fn pump(&mut self) {
        while self.state.status == CrawlStatus::Active
            && self.state.in_flight < self.ctx.per_crawl_cap
            && self.state.budget_remaining()
        {
            let Some((url, depth)) = self.state.frontier.pop() else {
                break;
            };

            let mut job = Job::crawl_page(
                url.as_str(),
                &self.state.tenant,
                self.state.id,
                depth,
                self.state.options.scrape_options.clone(),
            );
            job.max_attempts = self.ctx.max_attempts;

            self.state.enqueued.insert(url.as_str().to_string());
            self.open_jobs.insert(job.id);
            self.state.in_flight += 1;
            self.ctx.queue.enqueue(job);
        }

        if !self.state.budget_remaining() {
            self.state.drain();
        }
    }

    async fn handle_page_completed(
        &mut self,
        job_id: Uuid,
        url: String,
        depth: u32,
        document: Document,
    ) {
        self.open_jobs.remove(&job_id);
        self.state.in_flight = self.state.in_flight.saturating_sub(1);
        self.state.completed.insert(url.clone());

        let sequence = self.state.doc_sequence;
        self.state.doc_sequence += 1;
        if let Err(e) = self
            .ctx
            .storage
            .append_document(self.state.id, sequence, &url, &document)
        {
            tracing::error!("Failed to persist document for {}: {}", url, e);
        }

        // Only an active crawl grows; cancelled and draining crawls do not
        if self.state.status == CrawlStatus::Active {
            for link in &document.links {
                self.consider_link(link, depth + 1).await;
            }
        }

        self.ctx.queue.publish_progress(
            self.state.id,
            self.state.progress(),
            Some(url),
        );

        self.pump();
        self.persist();
        self.publish_snapshot().await;
    }

    async fn handle_page_failed(
        &mut self,
        job_id: Uuid,
        url: String,
        error: ErrorRecord,
        fatal: bool,
    ) {
        self.open_jobs.remove(&job_id);
        self.state.in_flight = self.state.in_flight.saturating_sub(1);

        if url == self.state.root.as_str() && fatal {
            self.root_fatal = true;
        }

        tracing::debug!(
            "Crawl {} page {} failed: {}",
            self.state.id,
            url,
            error.message
        );
        self.state.failed.insert(url, error);

        self.pump();
        self.persist();
        self.publish_snapshot().await;
    }

    /// Checks for a terminal condition; returns true when the controller
    /// should exit
    async fn maybe_finish(&mut self) -> bool {
        if self.state.status.is_terminal() {
            return true;
        }

        let drained = self.state.frontier.is_empty() || self.state.status == CrawlStatus::Draining;
        if !(drained && self.state.in_flight == 0) {
            return false;
        }

        // Controller-level fault policy: a crawl fails only when nothing
        // succeeded and the root itself died a fatal death
        let status = if self.state.completed.is_empty() && self.root_fatal {
            CrawlStatus::Failed
        } else {
            CrawlStatus::Completed
        };

        self.state.finish(status);
        self.persist();
        self.publish_snapshot().await;
        self.ctx
            .queue
            .publish_progress(self.state.id, 1.0, None);
        true
    }

    async fn cancel(&mut self) {
        tracing::info!("Crawl {} cancelled", self.state.id);
        self.cancelled.store(true, Ordering::Relaxed);

        for job_id in self.open_jobs.drain() {
            if let Err(e) = self.ctx.queue.cancel(job_id) {
                tracing::debug!("Cancelling job {}: {}", job_id, e);
            }
        }

        self.state.finish(CrawlStatus::Cancelled);
        self.persist();
        self.publish_snapshot().await;
    }

    fn persist(&self) {
        let record = CrawlRecord {
            id: self.state.id,
            tenant: self.state.tenant.clone(),
            root: self.state.root.to_string(),
            options: serde_json::to_string(&self.state.options).unwrap_or_default(),
            status: self.state.status.as_str().to_string(),
            completed_count: self.state.completed.len() as u32,
            failed_count: self.state.failed.len() as u32,
            started_at: self.state.started_at,
            finished_at: self.state.finished_at,
        };

        if let Err(e) = self.ctx.storage.upsert_crawl(&record) {
            tracing::error!("Failed to persist crawl {}: {}", self.state.id, e);
        }
    }

    async fn publish_snapshot(&self) {
        let mut snapshot = self.snapshot.write().await;
        snapshot.status = self.state.status;
        snapshot.total = self.state.enqueued.len();
        snapshot.completed = self.state.completed.len();
        snapshot.failed = self.state.failed.len();
        snapshot.credits_used = self.state.pages_settled() as u64;
        snapshot.finished_at = self.state.finished_at;
    }
}
