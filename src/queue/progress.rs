//! Per-job progress streaming
//!
//! Each job gets a broadcast channel. A subscriber receives the latest
//! snapshot immediately, then deltas in order until a terminal event. The
//! channel is dropped once the terminal event has been delivered to the
//! hub.

use crate::document::{Document, ErrorRecord};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 64;

/// One event in a job's progress stream
#[derive(Debug, Clone)]
pub enum JobEvent {
    Progress {
        /// Fraction complete, 0..=1
        progress: f64,
        /// URL of the document most recently finished, when known
        current: Option<String>,
    },
    Completed {
        document: Box<Document>,
    },
    Failed {
        error: ErrorRecord,
    },
    Cancelled,
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

#[derive(Default)]
struct HubState {
    channels: HashMap<Uuid, broadcast::Sender<JobEvent>>,
    snapshots: HashMap<Uuid, JobEvent>,
}

/// Routes job events to subscribers
#[derive(Default)]
pub struct ProgressHub {
    state: Mutex<HubState>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a job's events
    ///
    /// Returns the latest snapshot (if any) and a receiver for subsequent
    /// events. Subscribing to an already-terminal job yields the terminal
    /// event as the snapshot and a receiver that will deliver nothing.
    pub fn subscribe(&self, job_id: Uuid) -> (Option<JobEvent>, broadcast::Receiver<JobEvent>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let snapshot = state.snapshots.get(&job_id).cloned();
        let sender = state
            .channels
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);

        (snapshot, sender.subscribe())
    }

    /// Publishes an event for a job
    ///
    /// The event becomes the job's snapshot. A terminal event closes the
    /// channel; late subscribers still see it as the snapshot.
    pub fn publish(&self, job_id: Uuid, event: JobEvent) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let terminal = event.is_terminal();
        if let Some(sender) = state.channels.get(&job_id) {
            // Send errors just mean no subscriber is listening right now
            let _ = sender.send(event.clone());
        }
        state.snapshots.insert(job_id, event);

        if terminal {
            state.channels.remove(&job_id);
        }
    }

    /// Drops all record of a job (after its result has been consumed)
    pub fn forget(&self, job_id: Uuid) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.channels.remove(&job_id);
        state.snapshots.remove(&job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ErrorKind;

    fn progress(p: f64) -> JobEvent {
        JobEvent::Progress {
            progress: p,
            current: None,
        }
    }

    #[tokio::test]
    async fn test_subscriber_sees_deltas_in_order() {
        let hub = ProgressHub::new();
        let id = Uuid::new_v4();

        let (snapshot, mut rx) = hub.subscribe(id);
        assert!(snapshot.is_none());

        hub.publish(id, progress(0.25));
        hub.publish(id, progress(0.5));

        match rx.recv().await.unwrap() {
            JobEvent::Progress { progress, .. } => assert_eq!(progress, 0.25),
            other => panic!("unexpected event {other:?}"),
        }
        match rx.recv().await.unwrap() {
            JobEvent::Progress { progress, .. } => assert_eq!(progress, 0.5),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_snapshot_on_subscribe() {
        let hub = ProgressHub::new();
        let id = Uuid::new_v4();

        hub.publish(id, progress(0.75));

        let (snapshot, _rx) = hub.subscribe(id);
        match snapshot {
            Some(JobEvent::Progress { progress, .. }) => assert_eq!(progress, 0.75),
            other => panic!("unexpected snapshot {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_terminal_event_closes_channel() {
        let hub = ProgressHub::new();
        let id = Uuid::new_v4();

        let (_, mut rx) = hub.subscribe(id);
        hub.publish(
            id,
            JobEvent::Failed {
                error: ErrorRecord::new(ErrorKind::FetchFailed, "boom"),
            },
        );

        assert!(matches!(rx.recv().await, Ok(JobEvent::Failed { .. })));
        // Channel closed after the terminal event
        assert!(rx.recv().await.is_err());

        // Late subscriber still sees the terminal snapshot
        let (snapshot, _) = hub.subscribe(id);
        assert!(matches!(snapshot, Some(JobEvent::Failed { .. })));
    }
}
