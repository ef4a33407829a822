use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{
    ContentRequest, ContextDiagnostics, GeneratedContent, PipelineError, Stage, StageError,
    StageProgress,
};
use crate::router::RouterError;

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Every provider in the chain failed.
    ProviderExhausted,
    StageFailed,
    Timeout,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ProviderExhausted => "provider_exhausted",
            ErrorCategory::StageFailed => "stage_failed",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Internal => "internal",
        }
    }
}

/// Why a job failed, as shown to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<ContextDiagnostics>,
}

impl JobFailure {
    pub fn from_pipeline(error: &PipelineError, diagnostics: ContextDiagnostics) -> Self {
        let category = match error {
            PipelineError::TimedOut { .. } => ErrorCategory::Timeout,
            PipelineError::StageFailed {
                source:
                    StageError::Router(
                        RouterError::AllProvidersFailed { .. } | RouterError::NoProvidersAvailable,
                    ),
                ..
            } => ErrorCategory::ProviderExhausted,
            PipelineError::StageFailed { .. } => ErrorCategory::StageFailed,
            PipelineError::Cancelled { .. } => ErrorCategory::Internal,
        };
        Self {
            category,
            message: error.to_string(),
            stage: Some(error.stage()),
            diagnostics: Some(diagnostics),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Internal,
            message: message.into(),
            stage: None,
            diagnostics: None,
        }
    }
}

/// A content generation job and everything known about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub request: ContentRequest,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub progress_percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<Stage>,
    #[serde(default)]
    pub progress_updates: Vec<StageProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GeneratedContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    #[serde(default)]
    pub cancel_requested: bool,
}

impl Job {
    pub fn new(id: &str, request: ContentRequest) -> Self {
        Self {
            id: id.to_string(),
            status: JobStatus::Queued,
            request,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress_percentage: 0,
            current_stage: None,
            progress_updates: Vec::new(),
            result: None,
            error: None,
            cancel_requested: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock time spent processing, once finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Filter for job listings.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            limit: None,
        }
    }
}

/// Number of jobs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl JobCounts {
    pub(crate) fn add(&mut self, status: JobStatus) {
        match status {
            JobStatus::Queued => self.queued += 1,
            JobStatus::Processing => self.processing += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.queued + self.processing + self.completed + self.failed + self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use crate::router::ProviderFailure;

    fn diagnostics() -> ContextDiagnostics {
        ContextDiagnostics {
            completed_stages: vec![Stage::Initialization],
            text_word_counts: Default::default(),
            citation_count: 0,
            warnings: vec![],
            total_tokens: 0,
            total_cost_usd: 0.0,
        }
    }

    #[test]
    fn test_failure_categories() {
        let exhausted = PipelineError::StageFailed {
            stage: Stage::DraftGeneration,
            source: StageError::Router(RouterError::AllProvidersFailed {
                chain: vec![ProviderFailure {
                    provider_id: "a".to_string(),
                    model_id: "m".to_string(),
                    attempts: 1,
                    error: ProviderError::terminal("no"),
                }],
            }),
        };
        let failure = JobFailure::from_pipeline(&exhausted, diagnostics());
        assert_eq!(failure.category, ErrorCategory::ProviderExhausted);
        assert_eq!(failure.stage, Some(Stage::DraftGeneration));

        let empty = PipelineError::StageFailed {
            stage: Stage::ResearchOutline,
            source: StageError::EmptyOutput(Stage::ResearchOutline),
        };
        assert_eq!(
            JobFailure::from_pipeline(&empty, diagnostics()).category,
            ErrorCategory::StageFailed
        );

        let timeout = PipelineError::TimedOut {
            stage: Stage::Enhancement,
        };
        assert_eq!(
            JobFailure::from_pipeline(&timeout, diagnostics()).category,
            ErrorCategory::Timeout
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert_eq!(
            serde_json::to_string(&JobStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }
}
