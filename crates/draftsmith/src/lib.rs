pub mod citation;
pub mod config;
pub mod engine;
pub mod error;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod quality;
pub mod router;
pub mod sanitize;
pub mod worker;

pub use citation::{Citation, CitationRanker, RankingOptions};
pub use config::{load_config, Config};
pub use engine::{Engine, EngineBuilder};
pub use error::{ConfigError, DraftsmithError, Result, WorkerError};
pub use job::{Job, JobError, JobEvent, JobOrchestrator, JobStatus, JobStore};
pub use logging::init_logging;
pub use pipeline::{
    ContentRequest, GeneratedContent, GenerationMode, Pipeline, Stage, StageProgress,
};
pub use provider::{ContentSource, GenerationProvider, ProviderConfig, ProviderRegistry};
pub use quality::{QualityReport, QualityScorer};
pub use router::{Router, RouterError};
