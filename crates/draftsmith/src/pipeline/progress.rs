use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::stage::{Stage, TOTAL_STAGES};
use crate::job::JobStore;

/// One entry in a job's progress log. Emitted once per stage, at its end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageProgress {
    pub stage_name: Stage,
    pub stage_index: usize,
    pub total_stages: usize,
    pub percentage: u8,
    pub message: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl StageProgress {
    pub fn new(stage: Stage, fraction: f64, message: impl Into<String>) -> Self {
        Self {
            stage_name: stage,
            stage_index: stage.index(),
            total_stages: TOTAL_STAGES,
            percentage: stage.percentage_at(fraction),
            message: message.into(),
            metadata: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

pub trait ProgressReporter: Send + Sync {
    /// A stage is about to run.
    fn stage_started(&self, _stage: Stage) {}

    fn report(&self, progress: StageProgress);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _progress: StageProgress) {}
}

/// Keeps every reported entry in memory.
#[derive(Default)]
pub struct RecordingProgress {
    entries: Mutex<Vec<StageProgress>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<StageProgress> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, progress: StageProgress) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(progress),
            Err(poisoned) => poisoned.into_inner().push(progress),
        }
    }
}

/// Appends pipeline progress to the job's log in the store.
pub struct StoreProgress {
    job_id: String,
    store: Arc<dyn JobStore>,
}

impl StoreProgress {
    pub fn new(job_id: &str, store: Arc<dyn JobStore>) -> Self {
        Self {
            job_id: job_id.to_string(),
            store,
        }
    }
}

impl ProgressReporter for StoreProgress {
    fn stage_started(&self, stage: Stage) {
        if let Err(e) = self.store.mark_stage(&self.job_id, stage) {
            warn!(
                job_id = %self.job_id,
                stage = %stage,
                error = %e,
                "Failed to record current stage"
            );
        }
    }

    fn report(&self, progress: StageProgress) {
        let stage = progress.stage_name;
        if let Err(e) = self.store.append_progress(&self.job_id, progress) {
            warn!(job_id = %self.job_id, stage = %stage, error = %e, "Failed to append progress");
        }
    }
}
