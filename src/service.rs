//! Service facade
//!
//! The composition root and external interface of the engine: synchronous
//! scrapes, asynchronous crawls with paginated status, cancellation, and
//! graceful shutdown. An HTTP controller layer sits in front of this in
//! production; tests drive it directly.

use crate::config::Config;
use crate::crawl::{ControllerContext, CrawlController, CrawlEvent, CrawlRegistry, CrawlState};
use crate::document::{Document, ErrorKind, ErrorRecord};
use crate::fetch::{
    FetcherSelector, FireEngineFetcher, HeadlessFetcher, PlainHttpFetcher, ProxyPool,
    StealthFetcher,
};
use crate::options::{
    validate_crawl_options, validate_scrape_options, CrawlOptions, ScrapeOptions,
};
use crate::pipeline::{ContentPipeline, DisabledExtractor, HtmdConverter, HttpExtractor};
use crate::queue::{Job, JobEvent, MemoryQueue};
use crate::robots::RobotsCache;
use crate::storage::{SqliteStorage, Storage};
use crate::url::canonicalize_with;
use crate::worker::{AdmissionControl, JobExecutor, WorkerPool};
use crate::{DredgeError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Grace added to a scrape's own budget before the held connection gives up
const SCRAPE_WAIT_GRACE: Duration = Duration::from_secs(10);

/// Page size for crawl status results
const STATUS_PAGE_SIZE: u32 = 100;

/// Client-facing error: a stable kind, a safe message, optional details
#[derive(Debug, Clone)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// The `{ success:false, error, details? }` wire shape
    pub fn to_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "success": false,
            "error": self.message,
        });
        let details = self.details.clone().unwrap_or_else(|| {
            serde_json::json!({ "kind": self.kind.as_str() })
        });
        body["details"] = details;
        body
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<ErrorRecord> for ApiError {
    fn from(record: ErrorRecord) -> Self {
        Self {
            kind: record.kind,
            message: record.message,
            details: record.details,
        }
    }
}

/// One page of crawl status
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlStatusPage {
    pub status: String,
    pub total: usize,
    pub completed: usize,
    pub credits_used: u64,
    pub expires_at: DateTime<Utc>,
    /// Cursor for the next page of documents, when more remain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<u64>,
    pub data: Vec<Document>,
}

pub struct ScrapeService {
    config: Config,
    queue: Arc<MemoryQueue>,
    registry: Arc<CrawlRegistry>,
    robots: Arc<RobotsCache>,
    storage: Arc<dyn Storage>,
    pool: WorkerPool,
    client: reqwest::Client,
    headless: Option<Arc<HeadlessFetcher>>,
    param_sensitive_hosts: HashSet<String>,
}

impl ScrapeService {
    /// Builds the service with the default strategy ladder from config
    pub fn new(config: Config) -> Result<Self> {
        let (selector, headless) = Self::build_selector(&config)?;
        Self::with_selector(config, selector, headless)
    }

    /// Builds the service around a caller-supplied fetcher selector
    ///
    /// The seam tests use to substitute stub fetchers.
    pub fn with_selector(
        config: Config,
        selector: Arc<FetcherSelector>,
        headless: Option<Arc<HeadlessFetcher>>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.fetch.user_agent.clone())
            .timeout(Duration::from_millis(config.fetch.request_timeout_ms))
            .build()?;

        let storage: Arc<dyn Storage> = if config.storage.database_path.is_empty() {
            Arc::new(SqliteStorage::in_memory()?)
        } else {
            Arc::new(SqliteStorage::new(Path::new(&config.storage.database_path))?)
        };

        let queue = Arc::new(MemoryQueue::new(
            Duration::from_millis(config.service.lease_ttl_ms),
            Duration::from_millis(config.limits.backoff_base_ms),
        ));

        let robots = Arc::new(RobotsCache::new(
            client.clone(),
            config.fetch.user_agent.clone(),
            config.robots.cache_ttl_secs as i64,
        ));

        let extractor: Arc<dyn crate::pipeline::Extractor> =
            if config.fetch.extractor_endpoint.is_empty() {
                Arc::new(DisabledExtractor)
            } else {
                Arc::new(HttpExtractor::new(config.fetch.extractor_endpoint.clone())?)
            };
        let pipeline = Arc::new(ContentPipeline::new(Arc::new(HtmdConverter), extractor));

        let registry = Arc::new(CrawlRegistry::new());
        let executor = Arc::new(JobExecutor {
            queue: queue.clone(),
            registry: registry.clone(),
            selector,
            pipeline,
        });

        let admission = Arc::new(AdmissionControl::new(
            config.service.per_tenant_concurrency as usize,
            config.service.global_in_flight as usize,
        ));
        let pool = WorkerPool::new(
            executor,
            admission,
            queue.clone(),
            config.service.workers as usize,
        );
        pool.start();

        let param_sensitive_hosts: HashSet<String> = config
            .normalize
            .param_sensitive_hosts
            .iter()
            .map(|h| h.to_lowercase())
            .collect();

        Ok(Self {
            config,
            queue,
            registry,
            robots,
            storage,
            pool,
            client,
            headless,
            param_sensitive_hosts,
        })
    }

    fn build_selector(
        config: &Config,
    ) -> Result<(Arc<FetcherSelector>, Option<Arc<HeadlessFetcher>>)> {
        let mut strategies: Vec<Arc<dyn crate::fetch::Fetcher>> =
            vec![Arc::new(PlainHttpFetcher::new(&config.fetch.user_agent)?)];

        let mut headless = None;
        if !config.fetch.headless_endpoint.is_empty() {
            let sidecar = Arc::new(HeadlessFetcher::new(
                config.fetch.headless_endpoint.clone(),
                config.fetch.browser_pool_size as usize,
            )?);
            strategies.push(sidecar.clone());

            let proxies = Arc::new(ProxyPool::new(config.fetch.proxies.clone()));
            strategies.push(Arc::new(StealthFetcher::new(sidecar.clone(), proxies)));
            headless = Some(sidecar);
        }

        if !config.fetch.fire_engine_endpoint.is_empty() {
            strategies.push(Arc::new(FireEngineFetcher::new(
                config.fetch.fire_engine_endpoint.clone(),
                config.fetch.fire_engine_api_key.clone(),
            )?));
        }

        Ok((Arc::new(FetcherSelector::new(strategies)), headless))
    }

    /// True when every configured external dependency answers its probe
    pub async fn dependencies_healthy(&self) -> bool {
        match &self.headless {
            Some(sidecar) => sidecar.health().await,
            None => true,
        }
    }

    /// Synchronous scrape: enqueue, wait for the terminal event
    pub async fn scrape(
        &self,
        url: &str,
        tenant: &str,
        options: ScrapeOptions,
    ) -> std::result::Result<Document, ApiError> {
        validate_scrape_options(&options).map_err(ApiError::from)?;

        let canonical = canonicalize_with(url, &self.param_sensitive_hosts)
            .map_err(|e| ApiError::new(ErrorKind::BadRequest, format!("invalid url: {e}")))?;

        let mut job = Job::scrape(canonical.as_str(), tenant, options.clone());
        job.max_attempts = self.config.limits.max_attempts;
        let job_id = job.id;

        // Subscribe before enqueueing so the terminal event cannot be missed
        let (snapshot, mut events) = self.queue.subscribe(job_id);
        self.queue.enqueue(job);

        let deadline = Duration::from_millis(options.timeout) + SCRAPE_WAIT_GRACE;
        let result = tokio::time::timeout(deadline, async {
            if let Some(event) = snapshot {
                if let Some(outcome) = Self::settle_event(event) {
                    return outcome;
                }
            }
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(outcome) = Self::settle_event(event) {
                            return outcome;
                        }
                    }
                    Err(_) => {
                        return Err(ApiError::new(
                            ErrorKind::Internal,
                            "progress stream closed unexpectedly",
                        ));
                    }
                }
            }
        })
        .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => {
                let _ = self.queue.cancel(job_id);
                Err(ApiError::new(
                    ErrorKind::Timeout,
                    format!("scrape did not finish within {deadline:?}"),
                ))
            }
        };

        self.queue.forget(job_id);
        outcome
    }

    fn settle_event(event: JobEvent) -> Option<std::result::Result<Document, ApiError>> {
        match event {
            JobEvent::Progress { .. } => None,
            JobEvent::Completed { document } => Some(Ok(*document)),
            JobEvent::Failed { error } => Some(Err(ApiError::from(error))),
            JobEvent::Cancelled => Some(Err(ApiError::new(
                ErrorKind::Cancelled,
                "job was cancelled",
            ))),
        }
    }

    /// Starts a crawl; returns its id immediately
    pub async fn start_crawl(
        &self,
        url: &str,
        tenant: &str,
        options: CrawlOptions,
    ) -> std::result::Result<Uuid, ApiError> {
        validate_crawl_options(&options).map_err(ApiError::from)?;

        let root = canonicalize_with(url, &self.param_sensitive_hosts)
            .map_err(|e| ApiError::new(ErrorKind::BadRequest, format!("invalid url: {e}")))?;

        let crawl_id = Uuid::new_v4();
        let state = CrawlState::new(crawl_id, tenant, root.clone(), options.clone());

        let crawl_timeout = match self.config.limits.crawl_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let ctx = ControllerContext {
            queue: self.queue.clone(),
            robots: self.robots.clone(),
            storage: self.storage.clone(),
            client: self.client.clone(),
            per_crawl_cap: self.config.service.per_crawl_concurrency as usize,
            max_attempts: self.config.limits.max_attempts,
            crawl_timeout,
            param_sensitive_hosts: self.param_sensitive_hosts.clone(),
        };

        let handle = CrawlController::spawn(state, ctx);
        self.registry.register(crawl_id, handle).await;

        let mut job = Job::crawl_root(root.as_str(), tenant, crawl_id, options.scrape_options);
        job.max_attempts = self.config.limits.max_attempts;
        self.queue.enqueue(job);

        tracing::info!("Accepted crawl {} of {}", crawl_id, root);
        Ok(crawl_id)
    }

    /// Reads crawl status with a page of completed documents
    pub async fn crawl_status(
        &self,
        crawl_id: Uuid,
        cursor: Option<u64>,
    ) -> std::result::Result<CrawlStatusPage, ApiError> {
        let (status, total, completed, credits_used, expires_at) =
            match self.registry.get(crawl_id).await {
                Some(handle) => {
                    let snapshot = handle.snapshot.read().await.clone();
                    (
                        snapshot.status.as_str().to_string(),
                        snapshot.total,
                        snapshot.completed,
                        snapshot.credits_used,
                        snapshot.expires_at,
                    )
                }
                None => {
                    // Controller from a previous process life; storage only
                    let record = self
                        .storage
                        .get_crawl(crawl_id)
                        .map_err(|e| ApiError::new(ErrorKind::Internal, e.to_string()))?
                        .ok_or_else(|| {
                            ApiError::new(ErrorKind::NotFound, format!("unknown crawl {crawl_id}"))
                        })?;
                    let expires = record.started_at + chrono::Duration::hours(24);
                    (
                        record.status,
                        (record.completed_count + record.failed_count) as usize,
                        record.completed_count as usize,
                        (record.completed_count + record.failed_count) as u64,
                        expires,
                    )
                }
            };

        let offset = cursor.unwrap_or(0);
        let data = self
            .storage
            .documents_page(crawl_id, offset, STATUS_PAGE_SIZE)
            .map_err(|e| ApiError::new(ErrorKind::Internal, e.to_string()))?;
        let stored = self
            .storage
            .document_count(crawl_id)
            .map_err(|e| ApiError::new(ErrorKind::Internal, e.to_string()))?;

        let consumed = offset + data.len() as u64;
        let next = (consumed < stored).then_some(consumed);

        Ok(CrawlStatusPage {
            status,
            total,
            completed,
            credits_used,
            expires_at,
            next,
            data,
        })
    }

    /// Requests crawl cancellation; best-effort, idempotent
    pub async fn cancel_crawl(&self, crawl_id: Uuid) -> std::result::Result<(), ApiError> {
        let handle = self
            .registry
            .get(crawl_id)
            .await
            .ok_or_else(|| ApiError::new(ErrorKind::NotFound, format!("unknown crawl {crawl_id}")))?;

        handle.send(CrawlEvent::Cancel).await;
        Ok(())
    }

    /// Subscribes to a crawl's progress stream (snapshot + deltas)
    pub fn watch_crawl(
        &self,
        crawl_id: Uuid,
    ) -> (Option<JobEvent>, tokio::sync::broadcast::Receiver<JobEvent>) {
        self.queue.subscribe(crawl_id)
    }

    /// Jobs queued or running right now
    pub fn open_jobs(&self) -> usize {
        self.queue.open_jobs()
    }

    /// Stops leasing new jobs and drains in-flight work
    pub async fn shutdown(&self) {
        let drain = Duration::from_secs(self.config.service.drain_timeout_secs);
        tracing::info!("Shutting down, draining for up to {:?}", drain);
        self.pool.shutdown(drain).await;
    }
}

impl From<DredgeError> for ApiError {
    fn from(e: DredgeError) -> Self {
        ApiError::new(ErrorKind::Internal, e.to_string())
    }
}
