use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::quality::Dimension;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "DRAFTSMITH_CONFIG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// `.yaml` / `.yml` are YAML, everything else JSON.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Json,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content, ConfigFormat::from_path(path))
}

pub fn load_config_from_str(content: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
    };

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Loads from `DRAFTSMITH_CONFIG`, or from `<config dir>/draftsmith/config.json`.
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return load_config(path);
        }
    }

    let fallback = default_config_path();
    if fallback.is_file() {
        load_config(&fallback)
    } else {
        Err(ConfigError::NotFound(fallback))
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_default()
        .join("draftsmith")
        .join("config.json")
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Checks that go beyond what the schema can express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return invalid(format!("Unsupported config version: {}", config.version));
    }

    if config.worker_count == 0 {
        return invalid("worker_count must be at least 1");
    }
    if config.job_timeout_secs == 0 {
        return invalid("job_timeout_secs must be at least 1");
    }

    // Providers
    let mut ids = HashSet::new();
    for provider in &config.providers {
        if !ids.insert(provider.provider_id.as_str()) {
            return Err(ConfigError::DuplicateProvider {
                id: provider.provider_id.clone(),
            });
        }
    }
    if !config.providers.iter().any(|p| p.enabled) {
        return invalid("At least one provider must be enabled");
    }

    // Router and consensus
    if config.router.backoff_multiplier < 1.0 {
        return invalid("router.backoff_multiplier must be >= 1.0");
    }
    if config.router.initial_backoff_ms > config.router.max_backoff_ms {
        return invalid("router.initial_backoff_ms must not exceed router.max_backoff_ms");
    }
    if config.consensus.top_k < 2 {
        return invalid("consensus.top_k must be at least 2");
    }

    // Pipeline
    let p = &config.pipeline;
    if p.min_target_words == 0
        || p.min_target_words > p.default_target_words
        || p.default_target_words > p.max_target_words
    {
        return invalid(format!(
            "pipeline target words must satisfy 0 < min ({}) <= default ({}) <= max ({})",
            p.min_target_words, p.default_target_words, p.max_target_words
        ));
    }

    // Quality
    let q = &config.quality;
    for dimension in Dimension::ALL {
        let weight = q.weights.get(dimension);
        if !(0.0..=1.0).contains(&weight) {
            return invalid(format!("Weight for {} must be within 0..=1", dimension));
        }
        let floor = q.floors.get(dimension);
        if !(0.0..=100.0).contains(&floor) {
            return invalid(format!("Floor for {} must be within 0..=100", dimension));
        }
    }
    if (q.weights.sum() - 1.0).abs() > 1e-6 {
        return invalid(format!(
            "Quality weights must sum to 1.0 (got {:.4})",
            q.weights.sum()
        ));
    }
    if !(0.0..=100.0).contains(&q.min_composite) {
        return invalid("quality.min_composite must be within 0..=100");
    }
    if q.readability_band.min >= q.readability_band.max {
        return invalid("quality.readability_band.min must be below max");
    }
    if q.citations_per_thousand_target <= 0.0 {
        return invalid("quality.citations_per_thousand_target must be positive");
    }

    // Citations
    if config.citations.min_authority > 1000 {
        return invalid("citations.min_authority must be within 0..=1000");
    }
    if config.citations.max_citations == 0 {
        return invalid("citations.max_citations must be at least 1");
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> Result<(), ConfigError> {
    Err(ConfigError::Validation {
        message: message.into(),
    })
}
