use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use uuid::Uuid;

use super::cancel::CancellationRegistry;
use super::error::JobError;
use super::model::{Job, JobCounts, JobFilter};
use super::store::{CancelOutcome, JobStore};
use super::subscription::{self, ProgressStream};
use crate::pipeline::ContentRequest;
use crate::sanitize;
use crate::worker::WorkQueue;

/// Caller-facing job API: create, dispatch, observe and cancel.
#[derive(Clone)]
pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    queue: WorkQueue,
    cancellations: Arc<CancellationRegistry>,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: WorkQueue,
        cancellations: Arc<CancellationRegistry>,
    ) -> Self {
        Self {
            store,
            queue,
            cancellations,
        }
    }

    /// Validates the request and stores a queued job.
    pub fn create(&self, request: ContentRequest) -> Result<String, JobError> {
        let request = request.normalized().map_err(JobError::InvalidRequest)?;
        let id = Uuid::new_v4().to_string();
        let topic = sanitize::summarize(&request.topic, 80);
        self.store.insert(Job::new(&id, request))?;
        info!(job_id = %id, topic = %topic, "Job created");
        Ok(id)
    }

    /// Hands the job to the worker pool. Delivering a job that is already
    /// processing is harmless; its worker ignores the duplicate.
    pub async fn enqueue(&self, job_id: &str) -> Result<(), JobError> {
        let job = self.store.get(job_id)?;
        if job.is_terminal() {
            return Err(JobError::AlreadyTerminal {
                id: job.id,
                status: job.status,
            });
        }
        self.queue
            .push(job_id)
            .await
            .map_err(|e| JobError::Dispatch(e.to_string()))?;
        debug!(job_id, "Job enqueued");
        Ok(())
    }

    pub async fn submit(&self, request: ContentRequest) -> Result<String, JobError> {
        let id = self.create(request)?;
        self.enqueue(&id).await?;
        Ok(id)
    }

    pub fn get_status(&self, job_id: &str) -> Result<Job, JobError> {
        self.store.get(job_id)
    }

    pub fn subscribe(&self, job_id: &str) -> Result<ProgressStream, JobError> {
        subscription::subscribe(Arc::clone(&self.store), job_id)
    }

    /// Cancels a queued job at once; a processing job stops at its next
    /// stage boundary.
    pub fn cancel(&self, job_id: &str) -> Result<CancelOutcome, JobError> {
        let outcome = self.store.request_cancel(job_id)?;
        if outcome == CancelOutcome::Requested && !self.cancellations.cancel(job_id) {
            debug!(job_id, "No running token yet, executor will read the flag");
        }
        info!(job_id, outcome = ?outcome, "Job cancel requested");
        Ok(outcome)
    }

    /// Resolves with the job once it reaches a terminal status.
    pub async fn wait(&self, job_id: &str) -> Result<Job, JobError> {
        let mut wake = self.store.watch();
        loop {
            let job = self.store.get(job_id)?;
            if job.is_terminal() {
                return Ok(job);
            }
            match wake.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => {
                    return Err(JobError::Dispatch("job store closed".to_string()))
                }
            }
        }
    }

    pub fn list(&self, filter: &JobFilter) -> Vec<Job> {
        self.store.list(filter)
    }

    pub fn counts(&self) -> JobCounts {
        self.store.counts()
    }

    pub fn prune_terminal(&self, keep: usize) -> usize {
        self.store.prune_terminal(keep)
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }
}
