//! Job storage.
//!
//! The store owns every job record and its append-only progress log. Each
//! mutation replaces a record whole under the write lock and then sends the
//! job id on a broadcast channel, which subscribers use only as a wake-up.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tokio::sync::broadcast;

use super::error::JobError;
use super::model::{Job, JobCounts, JobFailure, JobFilter, JobStatus};
use crate::pipeline::{GeneratedContent, Stage, StageProgress};

const WAKE_CAPACITY: usize = 256;

/// What a cancel request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was still queued and is now cancelled.
    Cancelled,
    /// The job is processing; it stops at the next stage boundary.
    Requested,
}

/// Storage port for jobs. Every method is atomic with respect to the others.
pub trait JobStore: Send + Sync {
    fn insert(&self, job: Job) -> Result<(), JobError>;

    fn get(&self, id: &str) -> Result<Job, JobError>;

    /// Moves a queued job to processing. Returns `None` when the job is not
    /// queued, so duplicate deliveries are no-ops.
    fn claim(&self, id: &str) -> Result<Option<Job>, JobError>;

    fn mark_stage(&self, id: &str, stage: Stage) -> Result<(), JobError>;

    /// Appends to the progress log. Rejects entries that would move the
    /// stage index or percentage backwards.
    fn append_progress(&self, id: &str, progress: StageProgress) -> Result<(), JobError>;

    fn complete(&self, id: &str, result: GeneratedContent) -> Result<(), JobError>;

    fn fail(&self, id: &str, failure: JobFailure) -> Result<(), JobError>;

    /// Records that a processing job observed its cancellation.
    fn mark_cancelled(&self, id: &str) -> Result<(), JobError>;

    fn request_cancel(&self, id: &str) -> Result<CancelOutcome, JobError>;

    /// Newest first.
    fn list(&self, filter: &JobFilter) -> Vec<Job>;

    fn counts(&self) -> JobCounts;

    /// Drops all but the `keep` most recently finished terminal jobs.
    /// Returns how many were removed.
    fn prune_terminal(&self, keep: usize) -> usize;

    /// Receives the id of every job that changes from now on.
    fn watch(&self) -> broadcast::Receiver<String>;
}

/// Process-local [`JobStore`].
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
    wake: broadcast::Sender<String>,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        let (wake, _) = broadcast::channel(WAKE_CAPACITY);
        Self {
            jobs: RwLock::new(HashMap::new()),
            wake,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Job>> {
        match self.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Job>> {
        match self.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn notify(&self, id: &str) {
        // No subscribers is fine
        let _ = self.wake.send(id.to_string());
    }

    /// Applies `update` to a processing job and wakes subscribers.
    fn update_processing<T>(
        &self,
        id: &str,
        target: JobStatus,
        update: impl FnOnce(&mut Job) -> Result<T, JobError>,
    ) -> Result<T, JobError> {
        let value = {
            let mut jobs = self.write();
            let job = jobs.get_mut(id).ok_or_else(|| JobError::not_found(id))?;
            match job.status {
                JobStatus::Processing => {}
                status if status.is_terminal() => {
                    return Err(JobError::AlreadyTerminal {
                        id: id.to_string(),
                        status,
                    })
                }
                from => {
                    return Err(JobError::InvalidTransition {
                        id: id.to_string(),
                        from,
                        to: target,
                    })
                }
            }
            update(job)?
        };
        self.notify(id);
        Ok(value)
    }

    fn finish(
        &self,
        id: &str,
        status: JobStatus,
        apply: impl FnOnce(&mut Job),
    ) -> Result<(), JobError> {
        self.update_processing(id, status, |job| {
            apply(job);
            job.status = status;
            job.completed_at = Some(Utc::now());
            log::info!("Job {} {}", id, status);
            Ok(())
        })
    }
}

impl JobStore for InMemoryJobStore {
    fn insert(&self, job: Job) -> Result<(), JobError> {
        let id = job.id.clone();
        {
            let mut jobs = self.write();
            if jobs.contains_key(&id) {
                return Err(JobError::InvalidRequest(format!(
                    "job id '{}' already exists",
                    id
                )));
            }
            jobs.insert(id.clone(), job);
        }
        log::debug!("Job {} queued", id);
        self.notify(&id);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Job, JobError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::not_found(id))
    }

    fn claim(&self, id: &str) -> Result<Option<Job>, JobError> {
        let claimed = {
            let mut jobs = self.write();
            let job = jobs.get_mut(id).ok_or_else(|| JobError::not_found(id))?;
            if job.status != JobStatus::Queued {
                log::debug!("Job {} is {}, ignoring duplicate delivery", id, job.status);
                return Ok(None);
            }
            job.status = JobStatus::Processing;
            job.started_at = Some(Utc::now());
            job.clone()
        };
        self.notify(id);
        Ok(Some(claimed))
    }

    fn mark_stage(&self, id: &str, stage: Stage) -> Result<(), JobError> {
        self.update_processing(id, JobStatus::Processing, |job| {
            job.current_stage = Some(stage);
            Ok(())
        })
    }

    fn append_progress(&self, id: &str, progress: StageProgress) -> Result<(), JobError> {
        self.update_processing(id, JobStatus::Processing, |job| {
            if let Some(last) = job.progress_updates.last() {
                if progress.stage_index < last.stage_index
                    || progress.percentage < last.percentage
                {
                    return Err(JobError::ProgressRegression {
                        id: job.id.clone(),
                        last_index: last.stage_index,
                        last_percentage: last.percentage,
                        stage_index: progress.stage_index,
                        percentage: progress.percentage,
                    });
                }
            }
            job.progress_percentage = progress.percentage;
            job.current_stage = Some(progress.stage_name);
            job.progress_updates.push(progress);
            Ok(())
        })
    }

    fn complete(&self, id: &str, result: GeneratedContent) -> Result<(), JobError> {
        self.finish(id, JobStatus::Completed, |job| {
            job.progress_percentage = 100;
            job.result = Some(result);
        })
    }

    fn fail(&self, id: &str, failure: JobFailure) -> Result<(), JobError> {
        self.finish(id, JobStatus::Failed, |job| job.error = Some(failure))
    }

    fn mark_cancelled(&self, id: &str) -> Result<(), JobError> {
        self.finish(id, JobStatus::Cancelled, |job| job.cancel_requested = true)
    }

    fn request_cancel(&self, id: &str) -> Result<CancelOutcome, JobError> {
        let outcome = {
            let mut jobs = self.write();
            let job = jobs.get_mut(id).ok_or_else(|| JobError::not_found(id))?;
            match job.status {
                JobStatus::Queued => {
                    job.status = JobStatus::Cancelled;
                    job.cancel_requested = true;
                    job.completed_at = Some(Utc::now());
                    CancelOutcome::Cancelled
                }
                JobStatus::Processing => {
                    job.cancel_requested = true;
                    CancelOutcome::Requested
                }
                status => {
                    return Err(JobError::AlreadyTerminal {
                        id: id.to_string(),
                        status,
                    })
                }
            }
        };
        log::info!("Cancel for job {}: {:?}", id, outcome);
        self.notify(id);
        Ok(outcome)
    }

    fn list(&self, filter: &JobFilter) -> Vec<Job> {
        let jobs = self.read();
        let mut result: Vec<Job> = jobs
            .values()
            .filter(|job| filter.status.map_or(true, |s| job.status == s))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            result.truncate(limit);
        }
        result
    }

    fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for job in self.read().values() {
            counts.add(job.status);
        }
        counts
    }

    fn prune_terminal(&self, keep: usize) -> usize {
        let mut jobs = self.write();
        let mut terminal: Vec<(chrono::DateTime<Utc>, String)> = jobs
            .values()
            .filter(|job| job.is_terminal())
            .map(|job| (job.completed_at.unwrap_or(job.created_at), job.id.clone()))
            .collect();
        if terminal.len() <= keep {
            return 0;
        }
        terminal.sort();
        let remove = terminal.len() - keep;
        for (_, id) in terminal.into_iter().take(remove) {
            jobs.remove(&id);
        }
        log::debug!("Pruned {} terminal jobs", remove);
        remove
    }

    fn watch(&self) -> broadcast::Receiver<String> {
        self.wake.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ContentRequest;

    fn queued(store: &InMemoryJobStore, id: &str) {
        store
            .insert(Job::new(id, ContentRequest::new("Ocean tides")))
            .unwrap();
    }

    #[test]
    fn test_claim_is_exactly_once() {
        let store = InMemoryJobStore::new();
        queued(&store, "a");

        let claimed = store.claim("a").unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Processing);
        assert!(claimed.started_at.is_some());
        assert!(store.claim("a").unwrap().is_none());
        assert!(matches!(
            store.claim("missing"),
            Err(JobError::NotFound { .. })
        ));
    }

    #[test]
    fn test_progress_regression_rejected() {
        let store = InMemoryJobStore::new();
        queued(&store, "a");
        store.claim("a").unwrap();

        store
            .append_progress("a", StageProgress::new(Stage::KeywordAnalysis, 1.0, "k"))
            .unwrap();
        let err = store
            .append_progress("a", StageProgress::new(Stage::Initialization, 1.0, "i"))
            .unwrap_err();
        assert!(matches!(err, JobError::ProgressRegression { last_index: 1, .. }));

        let job = store.get("a").unwrap();
        assert_eq!(job.progress_updates.len(), 1);
        assert_eq!(job.progress_percentage, 8);
        assert_eq!(job.current_stage, Some(Stage::KeywordAnalysis));
    }

    #[test]
    fn test_progress_requires_processing() {
        let store = InMemoryJobStore::new();
        queued(&store, "a");
        let err = store
            .append_progress("a", StageProgress::new(Stage::Initialization, 1.0, "i"))
            .unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidTransition {
                from: JobStatus::Queued,
                ..
            }
        ));
    }

    #[test]
    fn test_terminal_is_final() {
        let store = InMemoryJobStore::new();
        queued(&store, "a");
        store.claim("a").unwrap();
        store.fail("a", JobFailure::internal("boom")).unwrap();

        assert!(matches!(
            store.mark_cancelled("a"),
            Err(JobError::AlreadyTerminal {
                status: JobStatus::Failed,
                ..
            })
        ));
        assert!(matches!(
            store.request_cancel("a"),
            Err(JobError::AlreadyTerminal { .. })
        ));
        let job = store.get("a").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_cancel_queued_and_processing() {
        let store = InMemoryJobStore::new();
        queued(&store, "q");
        queued(&store, "p");
        store.claim("p").unwrap();

        assert_eq!(store.request_cancel("q").unwrap(), CancelOutcome::Cancelled);
        assert_eq!(store.get("q").unwrap().status, JobStatus::Cancelled);
        assert!(store.claim("q").unwrap().is_none());

        assert_eq!(store.request_cancel("p").unwrap(), CancelOutcome::Requested);
        let job = store.get("p").unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.cancel_requested);
    }

    #[test]
    fn test_list_counts_and_prune() {
        let store = InMemoryJobStore::new();
        for id in ["a", "b", "c", "d"] {
            queued(&store, id);
        }
        for id in ["a", "b", "c"] {
            store.claim(id).unwrap();
            store.fail(id, JobFailure::internal("x")).unwrap();
        }

        let counts = store.counts();
        assert_eq!(counts.failed, 3);
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.total(), 4);
        assert_eq!(store.list(&JobFilter::with_status(JobStatus::Failed)).len(), 3);

        assert_eq!(store.prune_terminal(1), 2);
        assert_eq!(store.counts().total(), 2);
        assert_eq!(store.prune_terminal(1), 0);
        assert!(store.get("d").is_ok());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = InMemoryJobStore::new();
        queued(&store, "a");
        assert!(matches!(
            store.insert(Job::new("a", ContentRequest::new("x"))),
            Err(JobError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_mutations_wake_watchers() {
        let store = InMemoryJobStore::new();
        let mut watch = store.watch();
        queued(&store, "a");
        store.claim("a").unwrap();

        assert_eq!(watch.recv().await.unwrap(), "a");
        assert_eq!(watch.recv().await.unwrap(), "a");
    }
}
