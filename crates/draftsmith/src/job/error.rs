use thiserror::Error;

use super::model::JobStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("Job '{id}' not found")]
    NotFound { id: String },

    #[error("Job '{id}' is already {status}")]
    AlreadyTerminal { id: String, status: JobStatus },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Job '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error(
        "Progress for job '{id}' would regress from stage {last_index} ({last_percentage}%) \
         to stage {stage_index} ({percentage}%)"
    )]
    ProgressRegression {
        id: String,
        last_index: usize,
        last_percentage: u8,
        stage_index: usize,
        percentage: u8,
    },

    #[error("Failed to dispatch job: {0}")]
    Dispatch(String),
}

impl JobError {
    pub(crate) fn not_found(id: &str) -> Self {
        JobError::NotFound { id: id.to_string() }
    }
}
