use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::{self, Stream};
use tokio::sync::broadcast::{self, error::RecvError};

use super::error::JobError;
use super::model::{JobFailure, JobStatus};
use super::store::JobStore;
use crate::pipeline::StageProgress;

/// An item delivered to a progress subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Progress(StageProgress),
    /// Always the last event of a stream.
    Finished {
        status: JobStatus,
        error: Option<JobFailure>,
    },
}

pub type ProgressStream = Pin<Box<dyn Stream<Item = JobEvent> + Send>>;

struct Cursor {
    store: Arc<dyn JobStore>,
    id: String,
    wake: broadcast::Receiver<String>,
    delivered: usize,
    pending: VecDeque<JobEvent>,
    done: bool,
}

impl Cursor {
    /// Queues log entries not yet delivered, plus the terminal event once
    /// the job has finished.
    fn refresh(&mut self) {
        let job = match self.store.get(&self.id) {
            Ok(job) => job,
            Err(_) => {
                self.done = true;
                return;
            }
        };
        for progress in job.progress_updates.iter().skip(self.delivered) {
            self.pending.push_back(JobEvent::Progress(progress.clone()));
        }
        self.delivered = job.progress_updates.len();
        if job.status.is_terminal() {
            self.pending.push_back(JobEvent::Finished {
                status: job.status,
                error: job.error,
            });
            self.done = true;
        }
    }

    /// Waits for a change to this job. A lagging receiver just re-reads.
    async fn wait_for_change(&mut self) {
        loop {
            match self.wake.recv().await {
                Ok(id) if id == self.id => return,
                Ok(_) => continue,
                Err(RecvError::Lagged(_)) => return,
                Err(RecvError::Closed) => {
                    self.done = true;
                    return;
                }
            }
        }
    }
}

/// Streams a job's progress log: everything logged so far, then each new
/// entry, then a final [`JobEvent::Finished`].
pub fn subscribe(store: Arc<dyn JobStore>, id: &str) -> Result<ProgressStream, JobError> {
    // Watch before the first read so no change falls between the two.
    let wake = store.watch();
    store.get(id)?;

    let cursor = Cursor {
        store,
        id: id.to_string(),
        wake,
        delivered: 0,
        pending: VecDeque::new(),
        done: false,
    };

    let stream = stream::unfold(cursor, |mut cursor| async move {
        loop {
            if let Some(event) = cursor.pending.pop_front() {
                return Some((event, cursor));
            }
            if cursor.done {
                return None;
            }
            cursor.refresh();
            if cursor.pending.is_empty() && !cursor.done {
                cursor.wait_for_change().await;
            }
        }
    });
    Ok(Box::pin(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::model::Job;
    use crate::job::store::InMemoryJobStore;
    use crate::pipeline::{ContentRequest, Stage};
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_replays_then_follows_until_terminal() {
        let store = Arc::new(InMemoryJobStore::new());
        store
            .insert(Job::new("a", ContentRequest::new("Tides")))
            .unwrap();
        store.claim("a").unwrap();
        store
            .append_progress("a", StageProgress::new(Stage::Initialization, 1.0, "init"))
            .unwrap();

        let mut stream = subscribe(store.clone(), "a").unwrap();
        match stream.next().await {
            Some(JobEvent::Progress(p)) => assert_eq!(p.stage_name, Stage::Initialization),
            other => panic!("unexpected event: {:?}", other),
        }

        let writer = store.clone();
        tokio::spawn(async move {
            writer
                .append_progress("a", StageProgress::new(Stage::KeywordAnalysis, 1.0, "kw"))
                .unwrap();
            writer
                .fail("a", JobFailure::internal("stopped"))
                .unwrap();
        });

        let rest: Vec<JobEvent> = stream.collect().await;
        assert_eq!(rest.len(), 2);
        assert!(matches!(
            &rest[0],
            JobEvent::Progress(p) if p.stage_name == Stage::KeywordAnalysis
        ));
        assert!(matches!(
            &rest[1],
            JobEvent::Finished {
                status: JobStatus::Failed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        assert!(matches!(
            subscribe(store, "missing"),
            Err(JobError::NotFound { .. })
        ));
    }
}
