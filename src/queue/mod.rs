//! Job queue
//!
//! An in-process priority queue with exclusive, time-bounded leases.
//! Highest-priority (lowest value) ready job first, FIFO within a
//! priority. Failed jobs are re-queued with jittered exponential backoff
//! while attempts remain; expired leases make their jobs leasable again.

mod job;
mod progress;

pub use job::{
    backoff_delay, Job, JobKind, JobPayload, CRAWL_PAGE_PRIORITY, DEFAULT_MAX_ATTEMPTS,
    SCRAPE_PRIORITY,
};
pub use progress::{JobEvent, ProgressHub};

use crate::document::{Document, ErrorKind, ErrorRecord};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error("job {0} is not active")]
    NotActive(Uuid),
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Heap entry; lower (priority, seq) pops first
struct ReadyEntry {
    priority: i32,
    seq: u64,
    job: Job,
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the BinaryHeap max is the lowest (priority, seq)
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for ReadyEntry {}

struct ActiveLease {
    job: Job,
    worker_id: String,
    expires_at: Instant,
}

#[derive(Default)]
struct QueueInner {
    ready: BinaryHeap<ReadyEntry>,
    delayed: Vec<(Instant, Job)>,
    active: HashMap<Uuid, ActiveLease>,
    status: HashMap<Uuid, JobStatus>,
    results: HashMap<Uuid, Document>,
    errors: HashMap<Uuid, ErrorRecord>,
    cancel_requested: HashSet<Uuid>,
    seq: u64,
}

/// The shared in-process job queue
pub struct MemoryQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    progress: ProgressHub,
    lease_ttl: Duration,
    backoff_base: Duration,
}

impl MemoryQueue {
    pub fn new(lease_ttl: Duration, backoff_base: Duration) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
            progress: ProgressHub::new(),
            lease_ttl,
            backoff_base,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Accepts a job; returns once it is durably queued
    pub fn enqueue(&self, job: Job) -> Uuid {
        let id = job.id;
        let mut inner = self.lock();
        inner.status.insert(id, JobStatus::Queued);
        let seq = inner.seq;
        inner.seq += 1;
        inner.ready.push(ReadyEntry {
            priority: job.priority,
            seq,
            job,
        });
        drop(inner);

        self.notify.notify_waiters();
        id
    }

    /// Leases the highest-priority ready job, or returns None
    ///
    /// The lease is exclusive until it expires or the worker settles the
    /// job. Due retries and expired leases are folded back in first.
    pub fn lease(&self, worker_id: &str) -> Option<Job> {
        let mut inner = self.lock();
        let now = Instant::now();

        Self::promote_due(&mut inner, now);
        Self::reap_expired(&mut inner, now);

        let entry = inner.ready.pop()?;
        let job = entry.job;
        inner.status.insert(job.id, JobStatus::Active);
        inner.active.insert(
            job.id,
            ActiveLease {
                job: job.clone(),
                worker_id: worker_id.to_string(),
                expires_at: now + self.lease_ttl,
            },
        );

        Some(job)
    }

    /// Waits until a job may be available, bounded by `wait`
    pub async fn wait_for_work(&self, wait: Duration) {
        let _ = tokio::time::timeout(wait, self.notify.notified()).await;
    }

    fn promote_due(inner: &mut QueueInner, now: Instant) {
        let mut index = 0;
        while index < inner.delayed.len() {
            if inner.delayed[index].0 <= now {
                let (_, job) = inner.delayed.swap_remove(index);
                let seq = inner.seq;
                inner.seq += 1;
                inner.ready.push(ReadyEntry {
                    priority: job.priority,
                    seq,
                    job,
                });
            } else {
                index += 1;
            }
        }
    }

    fn reap_expired(inner: &mut QueueInner, now: Instant) {
        let expired: Vec<Uuid> = inner
            .active
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(lease) = inner.active.remove(&id) {
                tracing::warn!(
                    "Lease on job {} held by {} expired, re-queueing",
                    id,
                    lease.worker_id
                );
                inner.status.insert(id, JobStatus::Queued);
                let seq = inner.seq;
                inner.seq += 1;
                inner.ready.push(ReadyEntry {
                    priority: lease.job.priority,
                    seq,
                    job: lease.job,
                });
            }
        }
    }

    /// Returns a leased job to the queue unchanged
    ///
    /// Used when admission control pushes work back; the job keeps its
    /// attempt count and rejoins the back of its priority class.
    pub fn release(&self, id: Uuid) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let Some(lease) = inner.active.remove(&id) else {
            return Err(QueueError::NotActive(id));
        };
        inner.status.insert(id, JobStatus::Queued);
        let seq = inner.seq;
        inner.seq += 1;
        inner.ready.push(ReadyEntry {
            priority: lease.job.priority,
            seq,
            job: lease.job,
        });
        drop(inner);

        self.notify.notify_waiters();
        Ok(())
    }

    /// Releases the lease and stores the job's result
    pub fn complete(&self, id: Uuid, document: Document) -> Result<(), QueueError> {
        let mut inner = self.lock();
        if inner.active.remove(&id).is_none() {
            return Err(QueueError::NotActive(id));
        }
        inner.status.insert(id, JobStatus::Completed);
        inner.results.insert(id, document.clone());
        inner.cancel_requested.remove(&id);
        drop(inner);

        self.progress.publish(
            id,
            JobEvent::Completed {
                document: Box::new(document),
            },
        );
        self.notify.notify_waiters();
        Ok(())
    }

    /// Fails the job; retryable failures re-queue with backoff
    pub fn fail(&self, id: Uuid, error: ErrorRecord, retryable: bool) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let Some(lease) = inner.active.remove(&id) else {
            return Err(QueueError::NotActive(id));
        };

        let mut job = lease.job;
        let cancelled = error.kind == ErrorKind::Cancelled;

        if retryable && !cancelled && job.can_retry() {
            job.attempts += 1;
            let delay = backoff_delay(self.backoff_base, job.attempts);
            tracing::debug!(
                "Job {} attempt {} failed ({}), retrying in {:?}",
                id,
                job.attempts,
                error.message,
                delay
            );
            inner.status.insert(id, JobStatus::Queued);
            inner.delayed.push((Instant::now() + delay, job));
            drop(inner);
            self.notify.notify_waiters();
            return Ok(());
        }

        let status = if cancelled {
            JobStatus::Cancelled
        } else {
            JobStatus::Failed
        };
        inner.status.insert(id, status);
        inner.errors.insert(id, error.clone());
        inner.cancel_requested.remove(&id);
        drop(inner);

        let event = if cancelled {
            JobEvent::Cancelled
        } else {
            JobEvent::Failed { error }
        };
        self.progress.publish(id, event);
        self.notify.notify_waiters();
        Ok(())
    }

    /// Best-effort cancellation
    ///
    /// A queued job is removed immediately; an active job is flagged and
    /// its worker observes the flag between phases.
    pub fn cancel(&self, id: Uuid) -> Result<(), QueueError> {
        let mut inner = self.lock();

        match inner.status.get(&id) {
            None => return Err(QueueError::NotFound(id)),
            Some(status) if status.is_terminal() => return Ok(()),
            _ => {}
        }

        if inner.active.contains_key(&id) {
            inner.cancel_requested.insert(id);
            drop(inner);
            return Ok(());
        }

        // Remove from ready and delayed storage
        let mut ready = BinaryHeap::new();
        for entry in inner.ready.drain() {
            if entry.job.id != id {
                ready.push(entry);
            }
        }
        inner.ready = ready;
        inner.delayed.retain(|(_, job)| job.id != id);
        inner.status.insert(id, JobStatus::Cancelled);
        drop(inner);

        self.progress.publish(id, JobEvent::Cancelled);
        Ok(())
    }

    /// True when cancellation was requested for an active job
    pub fn is_cancel_requested(&self, id: Uuid) -> bool {
        self.lock().cancel_requested.contains(&id)
    }

    /// Subscribes to a job's progress stream (snapshot + deltas)
    pub fn subscribe(
        &self,
        id: Uuid,
    ) -> (Option<JobEvent>, tokio::sync::broadcast::Receiver<JobEvent>) {
        self.progress.subscribe(id)
    }

    /// Publishes a progress delta for a job (used by crawl controllers)
    pub fn publish_progress(&self, id: Uuid, progress: f64, current: Option<String>) {
        self.progress.publish(id, JobEvent::Progress { progress, current });
    }

    pub fn status(&self, id: Uuid) -> Option<JobStatus> {
        self.lock().status.get(&id).copied()
    }

    pub fn result(&self, id: Uuid) -> Option<Document> {
        self.lock().results.get(&id).cloned()
    }

    pub fn error(&self, id: Uuid) -> Option<ErrorRecord> {
        self.lock().errors.get(&id).cloned()
    }

    /// Jobs waiting or running; zero means the queue is drained
    pub fn open_jobs(&self) -> usize {
        let inner = self.lock();
        inner.ready.len() + inner.delayed.len() + inner.active.len()
    }

    /// Drops all bookkeeping for a settled job
    pub fn forget(&self, id: Uuid) {
        let mut inner = self.lock();
        inner.status.remove(&id);
        inner.results.remove(&id);
        inner.errors.remove(&id);
        inner.cancel_requested.remove(&id);
        drop(inner);
        self.progress.forget(id);
    }
}
