//! Ports the core depends on: text generation providers and research sources.
//!
//! Concrete vendor clients live outside this crate. They implement
//! [`GenerationProvider`] or [`ContentSource`] and are handed to the
//! [`crate::engine::Engine`] at startup.

pub mod error;
pub mod registry;
pub mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::{ProviderError, SourceError, TransientKind};
pub use registry::{ProviderConfig, ProviderEntry, ProviderRegistry, ProviderSnapshot};
pub use scripted::{CallGate, ScriptedProvider, StaticContentSource};

/// A single prompt sent to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// What the call is for (usually the stage name). Used for logging and
    /// cost attribution, never sent to the model.
    pub purpose: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(purpose: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            purpose: purpose.into(),
            system: None,
            prompt: prompt.into(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Text returned by a provider along with what it cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub text: String,
    pub usage: TokenUsage,
    pub cost_usd: f64,
}

/// A backend that turns a prompt into text.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Stable identifier matched against [`ProviderConfig::provider_id`].
    fn provider_id(&self) -> &str;

    async fn generate(
        &self,
        request: &GenerationRequest,
        model_id: &str,
    ) -> Result<GenerationOutput, ProviderError>;
}

/// Search metrics for one keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordMetric {
    pub term: String,
    #[serde(default)]
    pub search_volume: u32,
    /// 0 (easy) to 100 (very competitive).
    #[serde(default)]
    pub difficulty: u8,
}

/// A page currently ranking for the topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorPage {
    pub url: String,
    pub title: String,
    pub word_count: u32,
    #[serde(default)]
    pub headings: Vec<String>,
}

/// A source that could back a claim in the generated content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationCandidate {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    /// 0.0 to 1.0.
    #[serde(default)]
    pub relevance_score: f64,
    /// Authority already known to the source (0..=1000). When absent the
    /// ranker looks the domain up.
    #[serde(default)]
    pub authority: Option<u16>,
}

/// Everything a content source knows about a topic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchBundle {
    #[serde(default)]
    pub keywords: Vec<KeywordMetric>,
    #[serde(default)]
    pub related_terms: Vec<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub competitors: Vec<CompetitorPage>,
    #[serde(default)]
    pub citation_candidates: Vec<CitationCandidate>,
}

impl ResearchBundle {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
            && self.related_terms.is_empty()
            && self.questions.is_empty()
            && self.competitors.is_empty()
            && self.citation_candidates.is_empty()
    }
}

/// A backend that supplies keyword, competitor and citation data.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_research(
        &self,
        topic: &str,
        keywords: &[String],
    ) -> Result<ResearchBundle, SourceError>;
}
