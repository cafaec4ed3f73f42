//! Process-wide crawl registry
//!
//! Child jobs carry only their crawl id; everything else is looked up here.
//! Each entry holds the controller's event sender, a shared cancel flag
//! workers poll between phases, and a status snapshot that outlives the
//! controller task.

use crate::crawl::controller::CrawlEvent;
use crate::crawl::state::CrawlStatus;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Read-model of a crawl, refreshed by its controller
#[derive(Debug, Clone)]
pub struct CrawlSnapshot {
    pub status: CrawlStatus,

    /// URLs enqueued so far
    pub total: usize,

    pub completed: usize,
    pub failed: usize,

    /// One credit per settled page
    pub credits_used: u64,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// When stored results become eligible for purging
    pub expires_at: DateTime<Utc>,
}

impl CrawlSnapshot {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            status: CrawlStatus::Active,
            total: 0,
            completed: 0,
            failed: 0,
            credits_used: 0,
            started_at,
            finished_at: None,
            expires_at: started_at + chrono::Duration::hours(24),
        }
    }
}

/// Shared handle to a live (or finished) crawl
#[derive(Clone)]
pub struct CrawlHandle {
    pub events: mpsc::Sender<CrawlEvent>,
    pub cancelled: Arc<AtomicBool>,
    pub snapshot: Arc<RwLock<CrawlSnapshot>>,
}

impl CrawlHandle {
    /// Sends an event to the controller; silently dropped once the
    /// controller has exited (terminal crawls ignore stragglers)
    pub async fn send(&self, event: CrawlEvent) {
        if let Err(e) = self.events.send(event).await {
            tracing::debug!("Crawl controller gone, dropping event: {}", e);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Map of crawl id to handle, reader-writer protected
#[derive(Default)]
pub struct CrawlRegistry {
    inner: RwLock<HashMap<Uuid, CrawlHandle>>,
}

impl CrawlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: Uuid, handle: CrawlHandle) {
        self.inner.write().await.insert(id, handle);
    }

    pub async fn get(&self, id: Uuid) -> Option<CrawlHandle> {
        self.inner.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) {
        self.inner.write().await.remove(&id);
    }

    /// True when the crawl exists and has been cancelled
    pub async fn is_cancelled(&self, id: Uuid) -> bool {
        match self.get(id).await {
            Some(handle) => handle.is_cancelled(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (CrawlHandle, mpsc::Receiver<CrawlEvent>) {
        let (tx, rx) = mpsc::channel(8);
        (
            CrawlHandle {
                events: tx,
                cancelled: Arc::new(AtomicBool::new(false)),
                snapshot: Arc::new(RwLock::new(CrawlSnapshot::new(Utc::now()))),
            },
            rx,
        )
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = CrawlRegistry::new();
        let id = Uuid::new_v4();
        let (h, _rx) = handle();

        registry.register(id, h).await;
        assert!(registry.get(id).await.is_some());
        assert!(registry.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_flag_visible_through_registry() {
        let registry = CrawlRegistry::new();
        let id = Uuid::new_v4();
        let (h, _rx) = handle();
        let flag = h.cancelled.clone();

        registry.register(id, h).await;
        assert!(!registry.is_cancelled(id).await);

        flag.store(true, Ordering::Relaxed);
        assert!(registry.is_cancelled(id).await);
    }

    #[tokio::test]
    async fn test_send_after_controller_exit_is_silent() {
        let (h, rx) = handle();
        drop(rx);
        // Must not panic
        h.send(CrawlEvent::Cancel).await;
    }
}
