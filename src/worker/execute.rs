//! Job execution
//!
//! One job at a time: select a fetcher with fallback, run the content
//! pipeline, deliver the document. Cancellation is checked between phases;
//! cancelled work fails with a `Cancelled` error and is never re-queued.

use crate::crawl::{CrawlEvent, CrawlRegistry};
use crate::document::{Document, ErrorKind, ErrorRecord};
use crate::fetch::{FailureKind, FetchFailure, FetcherSelector};
use crate::pipeline::ContentPipeline;
use crate::queue::{Job, JobKind, MemoryQueue};
use std::sync::Arc;
use url::Url;

pub struct JobExecutor {
    pub queue: Arc<MemoryQueue>,
    pub registry: Arc<CrawlRegistry>,
    pub selector: Arc<FetcherSelector>,
    pub pipeline: Arc<ContentPipeline>,
}

/// Maps a classified fetch failure to a client error kind and whether the
/// job may be retried
fn classify_failure(failure: &FetchFailure) -> (ErrorKind, bool) {
    match failure.kind {
        FailureKind::Transient => (ErrorKind::FetchFailed, true),
        FailureKind::Blocked | FailureKind::InvalidContent => (ErrorKind::FetchBlocked, false),
        FailureKind::NotFound => (ErrorKind::NotFound, false),
        FailureKind::Fatal => (ErrorKind::FetchFailed, false),
    }
}

fn failure_record(failure: &FetchFailure, kind: ErrorKind) -> ErrorRecord {
    let mut record = ErrorRecord::new(kind, failure.message.clone());
    record.details = Some(serde_json::json!({
        "classified": format!("{:?}", failure.kind),
        "statusCode": failure.status_code,
    }));
    record
}

impl JobExecutor {
    /// Runs one leased job to a terminal queue state
    pub async fn execute(&self, job: Job) {
        match job.kind {
            JobKind::Crawl => self.dispatch_crawl_start(job).await,
            JobKind::Scrape | JobKind::CrawlPage => self.execute_scrape(job).await,
        }
    }

    /// A crawl root job just kicks its controller awake
    async fn dispatch_crawl_start(&self, job: Job) {
        let Some(crawl_id) = job.payload.crawl_id else {
            self.settle_fail(
                &job,
                ErrorRecord::new(ErrorKind::Internal, "crawl job without crawl id"),
                false,
            );
            return;
        };

        match self.registry.get(crawl_id).await {
            Some(handle) => {
                handle.send(CrawlEvent::Start).await;
                let shell = Document::new(job.payload.url.clone(), job.payload.url.clone(), 0);
                if let Err(e) = self.queue.complete(job.id, shell) {
                    tracing::warn!("Completing crawl root job {}: {}", job.id, e);
                }
            }
            None => {
                self.settle_fail(
                    &job,
                    ErrorRecord::new(ErrorKind::NotFound, format!("unknown crawl {crawl_id}")),
                    false,
                );
            }
        }
    }

    async fn execute_scrape(&self, job: Job) {
        if self.is_cancelled(&job).await {
            self.settle_cancelled(&job).await;
            return;
        }

        let url = match Url::parse(&job.payload.url) {
            Ok(url) => url,
            Err(e) => {
                let record =
                    ErrorRecord::new(ErrorKind::BadRequest, format!("invalid URL: {e}"));
                self.settle_fail(&job, record.clone(), false);
                self.notify_page_failed(&job, record, true).await;
                return;
            }
        };

        // Phase 1: fetch with fallback
        let outcome = self.selector.fetch(&url, &job.payload.options).await;
        let fetched = match outcome.result {
            Ok(fetched) => fetched,
            Err(failure) => {
                let (kind, retryable) = classify_failure(&failure);
                let record = failure_record(&failure, kind);

                let will_retry = retryable && job.can_retry();
                self.settle_fail(&job, record.clone(), retryable);
                if !will_retry {
                    self.notify_page_failed(&job, record, failure.kind == FailureKind::Fatal)
                        .await;
                }
                return;
            }
        };

        if self.is_cancelled(&job).await {
            self.settle_cancelled(&job).await;
            return;
        }

        // Phase 2: transform (+ extract); the pipeline is not interruptible
        let document = match self
            .pipeline
            .run(&job.payload.url, &fetched, &job.payload.options)
            .await
        {
            Ok(document) => document,
            Err(e) => {
                // Transform failures get a single attempt
                let record = ErrorRecord::new(ErrorKind::TransformFailed, e.to_string());
                self.settle_fail(&job, record.clone(), false);
                self.notify_page_failed(&job, record, false).await;
                return;
            }
        };

        if self.is_cancelled(&job).await {
            self.settle_cancelled(&job).await;
            return;
        }

        // Phase 3: deliver
        if let Err(e) = self.queue.complete(job.id, document.clone()) {
            tracing::warn!("Completing job {}: {}", job.id, e);
            return;
        }

        if job.kind == JobKind::CrawlPage {
            if let Some(handle) = self.crawl_handle(&job).await {
                handle
                    .send(CrawlEvent::PageCompleted {
                        job_id: job.id,
                        url: job.payload.url.clone(),
                        depth: job.payload.depth,
                        document: Box::new(document),
                    })
                    .await;
            }
        }
    }

    async fn is_cancelled(&self, job: &Job) -> bool {
        if self.queue.is_cancel_requested(job.id) {
            return true;
        }
        match job.payload.crawl_id {
            Some(crawl_id) => self.registry.is_cancelled(crawl_id).await,
            None => false,
        }
    }

    async fn settle_cancelled(&self, job: &Job) {
        tracing::debug!("Job {} observed cancellation", job.id);
        self.settle_fail(
            job,
            ErrorRecord::new(ErrorKind::Cancelled, "job cancelled"),
            false,
        );
    }

    fn settle_fail(&self, job: &Job, record: ErrorRecord, retryable: bool) {
        if let Err(e) = self.queue.fail(job.id, record, retryable) {
            tracing::warn!("Failing job {}: {}", job.id, e);
        }
    }

    async fn crawl_handle(&self, job: &Job) -> Option<crate::crawl::CrawlHandle> {
        let crawl_id = job.payload.crawl_id?;
        self.registry.get(crawl_id).await
    }

    /// Reports a terminal page failure to the crawl controller
    async fn notify_page_failed(&self, job: &Job, error: ErrorRecord, fatal: bool) {
        if job.kind != JobKind::CrawlPage {
            return;
        }
        if let Some(handle) = self.crawl_handle(job).await {
            handle
                .send(CrawlEvent::PageFailed {
                    job_id: job.id,
                    url: job.payload.url.clone(),
                    error,
                    fatal,
                })
                .await;
        }
    }
}
