use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DraftsmithError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job error: {0}")]
    Job(#[from] crate::job::JobError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("No config file found (set DRAFTSMITH_CONFIG or create {0})")]
    NotFound(PathBuf),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Provider '{id}' is configured but no implementation was registered")]
    UnknownProvider { id: String },

    #[error("Provider '{id}' is listed more than once")]
    DuplicateProvider { id: String },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker pool has already been started")]
    AlreadyStarted,

    #[error("Work queue closed unexpectedly")]
    ChannelClosed,

    #[error("Worker task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, DraftsmithError>;
