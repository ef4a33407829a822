pub mod loader;
pub mod schema;

pub use loader::{
    default_config_path, load_config, load_config_from_env, load_config_from_str,
    validate_config, ConfigFormat, CONFIG_ENV_VAR,
};
pub use schema::{
    CitationsConfig, Config, ConsensusConfig, DimensionValues, LoggingConfig, PipelineConfig,
    QualityConfig, ReadabilityBand, RouterConfig,
};
