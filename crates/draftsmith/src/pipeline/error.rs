use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::stage::Stage;
use crate::provider::SourceError;
use crate::router::RouterError;

/// Why a single stage could not produce its output.
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("Content source failed: {0}")]
    Source(#[from] SourceError),

    #[error("Provider returned no text for {0}")]
    EmptyOutput(Stage),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Job deadline passed while waiting on the content source")]
    DeadlineExceeded,
}

impl StageError {
    pub fn is_deadline(&self) -> bool {
        matches!(
            self,
            StageError::DeadlineExceeded | StageError::Router(RouterError::DeadlineExceeded)
        )
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage {stage} failed: {source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: StageError,
    },

    #[error("Cancelled before {stage}")]
    Cancelled { stage: Stage },

    #[error("Job deadline exceeded at {stage}")]
    TimedOut { stage: Stage },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::StageFailed { stage, .. }
            | PipelineError::Cancelled { stage }
            | PipelineError::TimedOut { stage } => *stage,
        }
    }
}

/// Non-fatal problems recorded while the run continued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    StageDegraded { stage: Stage, reason: String },
    CitationSourceUnavailable { reason: String },
    ConsensusDegraded { stage: Stage, note: String },
}

impl PipelineWarning {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineWarning::StageDegraded { stage, .. }
            | PipelineWarning::ConsensusDegraded { stage, .. } => *stage,
            PipelineWarning::CitationSourceUnavailable { .. } => Stage::CitationGeneration,
        }
    }
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineWarning::StageDegraded { stage, reason } => {
                write!(f, "{} degraded: {}", stage, reason)
            }
            PipelineWarning::CitationSourceUnavailable { reason } => {
                write!(f, "citation sources unavailable: {}", reason)
            }
            PipelineWarning::ConsensusDegraded { stage, note } => {
                write!(f, "{} consensus degraded: {}", stage, note)
            }
        }
    }
}
