use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::citation::RankingOptions;
use crate::config::Config;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Every stage runs.
    #[default]
    MultiPhase,
    /// Optional stages are skipped; one drafting pass.
    Quick,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationMode::MultiPhase => "multi_phase",
            GenerationMode::Quick => "quick",
        }
    }
}

pub struct PipelineSettings {
    pub default_mode: GenerationMode,
    pub default_target_words: u32,
    pub min_target_words: u32,
    pub max_target_words: u32,
    /// Draft with consensus generation instead of plain fallback.
    pub consensus_drafting: bool,
    pub ranking: RankingOptions,
    /// Upper bound for one content source call.
    pub source_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_mode: config.pipeline.default_mode,
            default_target_words: config.pipeline.default_target_words,
            min_target_words: config.pipeline.min_target_words,
            max_target_words: config.pipeline.max_target_words,
            consensus_drafting: config.consensus.enabled,
            ranking: RankingOptions::from(&config.citations),
            source_timeout: Duration::from_secs(config.router.call_timeout_secs),
        }
    }

    pub fn clamp_target(&self, words: u32) -> u32 {
        words.max(self.min_target_words).min(self.max_target_words)
    }
}
