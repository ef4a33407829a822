use serde::{Deserialize, Serialize};

use crate::pipeline::GenerationMode;
use crate::provider::ProviderConfig;
use crate::quality::Dimension;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Wall-clock limit for one job, measured from when a worker claims it.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub citations: CitationsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_job_timeout_secs() -> u64 {
    900
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            worker_count: default_worker_count(),
            job_timeout_secs: default_job_timeout_secs(),
            providers: Vec::new(),
            router: RouterConfig::default(),
            consensus: ConsensusConfig::default(),
            pipeline: PipelineConfig::default(),
            quality: QualityConfig::default(),
            citations: CitationsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_call_timeout_secs() -> u64 {
    120
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Drafting uses consensus generation when set.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_consensus_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_top_k() -> usize {
    3
}

fn default_consensus_timeout_secs() -> u64 {
    180
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            top_k: default_top_k(),
            timeout_secs: default_consensus_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub default_mode: GenerationMode,
    #[serde(default = "default_target_words")]
    pub default_target_words: u32,
    #[serde(default = "default_min_target_words")]
    pub min_target_words: u32,
    #[serde(default = "default_max_target_words")]
    pub max_target_words: u32,
}

fn default_target_words() -> u32 {
    1500
}

fn default_min_target_words() -> u32 {
    600
}

fn default_max_target_words() -> u32 {
    5000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_mode: GenerationMode::default(),
            default_target_words: default_target_words(),
            min_target_words: default_min_target_words(),
            max_target_words: default_max_target_words(),
        }
    }
}

/// One value per quality dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionValues {
    pub readability: f64,
    pub seo: f64,
    pub structure: f64,
    pub factual: f64,
    pub uniqueness: f64,
    pub engagement: f64,
    pub eeat: f64,
}

impl DimensionValues {
    pub fn default_weights() -> Self {
        Self {
            readability: 0.15,
            seo: 0.15,
            structure: 0.15,
            factual: 0.15,
            uniqueness: 0.10,
            engagement: 0.10,
            eeat: 0.20,
        }
    }

    pub fn default_floors() -> Self {
        Self {
            readability: 40.0,
            seo: 30.0,
            structure: 30.0,
            factual: 20.0,
            uniqueness: 40.0,
            engagement: 20.0,
            eeat: 30.0,
        }
    }

    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Readability => self.readability,
            Dimension::Seo => self.seo,
            Dimension::Structure => self.structure,
            Dimension::Factual => self.factual,
            Dimension::Uniqueness => self.uniqueness,
            Dimension::Engagement => self.engagement,
            Dimension::Eeat => self.eeat,
        }
    }

    pub fn sum(&self) -> f64 {
        Dimension::ALL.iter().map(|d| self.get(*d)).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadabilityBand {
    pub min: f64,
    pub max: f64,
}

impl Default for ReadabilityBand {
    fn default() -> Self {
        Self {
            min: 60.0,
            max: 70.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_min_composite")]
    pub min_composite: f64,
    #[serde(default = "DimensionValues::default_weights")]
    pub weights: DimensionValues,
    /// Hard minimum per dimension; any violation fails the threshold.
    #[serde(default = "DimensionValues::default_floors")]
    pub floors: DimensionValues,
    /// Target Flesch reading ease.
    #[serde(default)]
    pub readability_band: ReadabilityBand,
    #[serde(default = "default_citations_target")]
    pub citations_per_thousand_target: f64,
}

fn default_min_composite() -> f64 {
    70.0
}

fn default_citations_target() -> f64 {
    3.0
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            min_composite: default_min_composite(),
            weights: DimensionValues::default_weights(),
            floors: DimensionValues::default_floors(),
            readability_band: ReadabilityBand::default(),
            citations_per_thousand_target: default_citations_target(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationsConfig {
    #[serde(default = "default_min_authority")]
    pub min_authority: u16,
    #[serde(default = "default_true")]
    pub prefer_high_authority: bool,
    #[serde(default = "default_max_citations")]
    pub max_citations: usize,
    #[serde(default = "default_authority_cache_ttl_secs")]
    pub authority_cache_ttl_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_min_authority() -> u16 {
    20
}

fn default_max_citations() -> usize {
    10
}

fn default_authority_cache_ttl_secs() -> u64 {
    3600
}

impl Default for CitationsConfig {
    fn default() -> Self {
        Self {
            min_authority: default_min_authority(),
            prefer_high_authority: true,
            max_citations: default_max_citations(),
            authority_cache_ttl_secs: default_authority_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
