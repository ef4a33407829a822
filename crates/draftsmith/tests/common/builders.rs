//! Builders for configs, research bundles and scripted providers.

#![allow(dead_code)]

use draftsmith::config::Config;
use draftsmith::pipeline::GenerationMode;
use draftsmith::provider::{
    CitationCandidate, CompetitorPage, GenerationRequest, KeywordMetric, ProviderConfig,
    ProviderError, ResearchBundle,
};

pub const ARTICLE: &str = "# Ocean Tides Explained\n\n\
Ocean tides rise and fall twice a day because the moon pulls on the sea. Have you ever watched \
the water creep up a beach?\n\n\
## Why ocean tides happen\n\n\
Lunar gravity drives ocean tides around the planet. For example, a full moon brings higher \
water, and a new moon does the same.\n\n\
## How to watch the tide\n\n\
- Check a tide table before you go.\n\
- Visit the shore at low water.\n\
- Note the time the water turns.\n\n\
## Next steps\n\n\
Pick a calm morning this week and get started with your first tide walk.\n";

/// Builder for creating `Config` instances.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// One worker, no providers, defaults everywhere else.
    pub fn new() -> Self {
        Self {
            config: Config {
                worker_count: 1,
                ..Config::default()
            },
        }
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    pub fn job_timeout_secs(mut self, secs: u64) -> Self {
        self.config.job_timeout_secs = secs;
        self
    }

    pub fn provider(mut self, id: &str, priority: u32) -> Self {
        self.config
            .providers
            .push(ProviderConfig::new(id, priority, &format!("{}-model", id)));
        self
    }

    pub fn consensus(mut self, top_k: usize) -> Self {
        self.config.consensus.enabled = true;
        self.config.consensus.top_k = top_k;
        self
    }

    pub fn default_mode(mut self, mode: GenerationMode) -> Self {
        self.config.pipeline.default_mode = mode;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Answers each stage with plausible text.
pub fn article_responder(request: &GenerationRequest) -> Result<String, ProviderError> {
    Ok(match request.purpose.as_str() {
        "intent_analysis" => "Informational. Readers want to understand tides.".to_string(),
        "research_outline" => {
            "# Ocean Tides Explained\n\n## Why ocean tides happen\n\n## How to watch the tide"
                .to_string()
        }
        _ => ARTICLE.to_string(),
    })
}

pub fn research_bundle() -> ResearchBundle {
    ResearchBundle {
        keywords: vec![
            KeywordMetric {
                term: "tide times".to_string(),
                search_volume: 1200,
                difficulty: 25,
            },
            KeywordMetric {
                term: "high tide".to_string(),
                search_volume: 800,
                difficulty: 15,
            },
        ],
        related_terms: vec!["spring tide".to_string(), "tidal range".to_string()],
        questions: vec!["Why are there two tides a day?".to_string()],
        competitors: vec![
            CompetitorPage {
                url: "https://example.com/tides".to_string(),
                title: "Tides 101".to_string(),
                word_count: 1400,
                headings: vec!["What causes tides".to_string()],
            },
            CompetitorPage {
                url: "https://example.org/tides".to_string(),
                title: "All about tides".to_string(),
                word_count: 1800,
                headings: vec!["What causes tides".to_string(), "Tide tables".to_string()],
            },
        ],
        citation_candidates: vec![
            CitationCandidate {
                url: "https://oceanservice.noaa.gov/facts/tides.html".to_string(),
                title: "What are tides?".to_string(),
                snippet: "Lunar gravity drives ocean tides on our planet".to_string(),
                relevance_score: 0.92,
                authority: None,
            },
            CitationCandidate {
                url: "https://someblog.example/tides".to_string(),
                title: "My tide notes".to_string(),
                snippet: "Tides are fun".to_string(),
                relevance_score: 0.99,
                authority: Some(5),
            },
        ],
    }
}
