//! Registry of in-flight conversion jobs.
//!
//! The only mutable state shared between connection handlers. One writer at
//! register/remove time, readers for cancel lookups and stats.

use crate::engine::CancellationFlag;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::sync::RwLock;
use uuid::Uuid;

/// One tracked execution of a Convert request.
#[derive(Debug, Clone)]
pub(crate) struct Job {
    id: String,
    sequence: u64,
    cancellation: CancellationFlag,
    started_at: Instant,
}

impl Job {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn cancellation(&self) -> &CancellationFlag {
        &self.cancellation
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[derive(Default)]
struct Registry {
    jobs: HashMap<String, Job>,
    next_sequence: u64,
}

#[derive(Clone, Default)]
pub(crate) struct JobRegistry {
    inner: Arc<RwLock<Registry>>,
}

impl JobRegistry {
    /// Track a new job. An empty `requested_id` gets a generated UUID.
    pub(crate) async fn register(&self, requested_id: &str) -> Job {
        let id = if requested_id.trim().is_empty() {
            Uuid::new_v4().to_string()
        } else {
            requested_id.to_string()
        };

        let mut registry = self.inner.write().await;
        let sequence = registry.next_sequence;
        registry.next_sequence += 1;

        let job = Job {
            id: id.clone(),
            sequence,
            cancellation: CancellationFlag::new(),
            started_at: Instant::now(),
        };

        if registry.jobs.insert(id.clone(), job.clone()).is_some() {
            warn!("Job {id} registered twice, newest request wins");
        }
        debug!("Job {id} registered ({} active)", registry.jobs.len());

        job
    }

    /// Forget a finished job. A newer job that reused the same id is left alone.
    pub(crate) async fn remove(&self, job: &Job) {
        let mut registry = self.inner.write().await;
        if registry
            .jobs
            .get(job.id())
            .is_some_and(|current| current.sequence == job.sequence)
        {
            registry.jobs.remove(job.id());
            debug!("Job {} finished after {:?}", job.id(), job.elapsed());
        }
    }

    /// Cancel `job_id`, or the most recently started job when `None`.
    ///
    /// Returns the id of the job that was flagged. Unknown ids are a no-op.
    pub(crate) async fn cancel(&self, job_id: Option<&str>) -> Option<String> {
        let registry = self.inner.read().await;

        let job = match job_id {
            Some(id) => registry.jobs.get(id),
            None => registry.jobs.values().max_by_key(|job| job.sequence),
        }?;

        job.cancellation.cancel();
        Some(job.id.clone())
    }

    /// Flag every active job. Returns how many were flagged.
    pub(crate) async fn cancel_all(&self) -> usize {
        let registry = self.inner.read().await;
        for job in registry.jobs.values() {
            job.cancellation.cancel();
        }
        registry.jobs.len()
    }

    pub(crate) async fn active_count(&self) -> usize {
        self.inner.read().await.jobs.len()
    }

    #[cfg(test)]
    pub(crate) async fn contains(&self, job_id: &str) -> bool {
        self.inner.read().await.jobs.contains_key(job_id)
    }
}
