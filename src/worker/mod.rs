//! Worker pool
//!
//! A fixed number of worker tasks share the job queue. Each worker loops
//! lease → execute → settle. Admission control bounds concurrency per
//! tenant and globally; jobs pushed back by admission rejoin the queue
//! without penalty.

mod execute;

pub use execute::JobExecutor;

use crate::queue::MemoryQueue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

const IDLE_WAIT: Duration = Duration::from_millis(250);
const PUSHBACK_WAIT: Duration = Duration::from_millis(100);

/// Concurrency caps shared by all workers
pub struct AdmissionControl {
    per_tenant_cap: usize,
    global_cap: usize,
    counts: Mutex<AdmissionCounts>,
}

#[derive(Default)]
struct AdmissionCounts {
    global: usize,
    per_tenant: HashMap<String, usize>,
}

impl AdmissionControl {
    pub fn new(per_tenant_cap: usize, global_cap: usize) -> Self {
        Self {
            per_tenant_cap,
            global_cap,
            counts: Mutex::new(AdmissionCounts::default()),
        }
    }

    /// Tries to admit work for a tenant; the ticket releases on drop
    pub fn try_admit(self: Arc<Self>, tenant: &str) -> Option<AdmissionTicket> {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());

        if counts.global >= self.global_cap {
            return None;
        }
        let tenant_count = counts.per_tenant.get(tenant).copied().unwrap_or(0);
        if tenant_count >= self.per_tenant_cap {
            return None;
        }

        counts.global += 1;
        *counts.per_tenant.entry(tenant.to_string()).or_insert(0) += 1;
        drop(counts);

        Some(AdmissionTicket {
            control: self,
            tenant: tenant.to_string(),
        })
    }

    fn release(&self, tenant: &str) {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts.global = counts.global.saturating_sub(1);
        if let Some(count) = counts.per_tenant.get_mut(tenant) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.per_tenant.remove(tenant);
            }
        }
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.counts.lock().unwrap_or_else(|e| e.into_inner()).global
    }
}

/// Releases its admission slot on drop
pub struct AdmissionTicket {
    control: Arc<AdmissionControl>,
    tenant: String,
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        self.control.release(&self.tenant);
    }
}

pub struct WorkerPool {
    executor: Arc<JobExecutor>,
    admission: Arc<AdmissionControl>,
    queue: Arc<MemoryQueue>,
    workers: usize,
    shutdown: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        executor: Arc<JobExecutor>,
        admission: Arc<AdmissionControl>,
        queue: Arc<MemoryQueue>,
        workers: usize,
    ) -> Self {
        Self {
            executor,
            admission,
            queue,
            workers: workers.max(1),
            shutdown: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the worker tasks
    pub fn start(&self) {
        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        for index in 0..self.workers {
            let worker_id = format!("worker-{index}");
            let executor = self.executor.clone();
            let admission = self.admission.clone();
            let queue = self.queue.clone();
            let shutdown = self.shutdown.clone();

            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, executor, admission, queue, shutdown).await;
            }));
        }
    }

    /// Stops leasing new work and waits up to `drain` for in-flight jobs
    pub async fn shutdown(&self, drain: Duration) {
        self.shutdown.store(true, Ordering::Relaxed);

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };

        let join_all = async {
            for handle in &handles {
                // Workers observe the flag between jobs
                while !handle.is_finished() {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        };

        if tokio::time::timeout(drain, join_all).await.is_err() {
            tracing::warn!("Drain window elapsed, aborting remaining workers");
            for handle in handles {
                handle.abort();
            }
        }
    }
}

async fn worker_loop(
    worker_id: String,
    executor: Arc<JobExecutor>,
    admission: Arc<AdmissionControl>,
    queue: Arc<MemoryQueue>,
    shutdown: Arc<AtomicBool>,
) {
    tracing::debug!("{} started", worker_id);

    while !shutdown.load(Ordering::Relaxed) {
        let Some(job) = queue.lease(&worker_id) else {
            queue.wait_for_work(IDLE_WAIT).await;
            continue;
        };

        match admission.clone().try_admit(&job.payload.tenant) {
            Some(_ticket) => {
                tracing::debug!("{} executing {:?} job {}", worker_id, job.kind, job.id);
                executor.execute(job).await;
            }
            None => {
                // Caps are full; hand the job back and yield
                let job_id = job.id;
                if let Err(e) = queue.release(job_id) {
                    tracing::warn!("{} releasing job {}: {}", worker_id, job_id, e);
                }
                queue.wait_for_work(PUSHBACK_WAIT).await;
            }
        }
    }

    tracing::debug!("{} stopped", worker_id);
}
