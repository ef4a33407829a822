//! The staged generation pipeline.
//!
//! Thirteen stages run in a fixed order over one [`PipelineContext`]. Each
//! stage reads what earlier stages produced and writes only its own fields.
//! Optional stages degrade to a warning on failure; a failed mandatory stage
//! ends the run.

pub mod config;
pub mod context;
pub mod error;
pub mod progress;
mod prompts;
pub mod runner;
pub mod stage;

pub use config::{GenerationMode, PipelineSettings};
pub use context::{
    CompetitorSummary, ContentRequest, ContextDiagnostics, GeneratedContent, IntentAnalysis,
    KeywordPlan, PipelineContext, SearchIntent, StageCost,
};
pub use error::{PipelineError, PipelineWarning, StageError};
pub use progress::{NoopProgress, ProgressReporter, RecordingProgress, StageProgress, StoreProgress};
pub use runner::{Pipeline, RunControl};
pub use stage::{Requirement, Stage, StageInfo, STAGES, TOTAL_STAGES};
