use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::config::GenerationMode;
use super::error::PipelineWarning;
use super::stage::Stage;
use crate::citation::Citation;
use crate::provider::ResearchBundle;
use crate::quality::{QualityReport, ScoringContext};
use crate::router::RoutedGeneration;

const MAX_TOPIC_CHARS: usize = 500;

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRequest {
    pub topic: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Falls back to the configured default mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<GenerationMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_word_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
}

impl ContentRequest {
    pub fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            keywords: Vec::new(),
            mode: None,
            target_word_count: None,
            audience: None,
            tone: None,
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_target_word_count(mut self, words: u32) -> Self {
        self.target_word_count = Some(words);
        self
    }

    /// Trimmed, deduplicated copy, or a description of what is wrong.
    pub fn normalized(&self) -> Result<Self, String> {
        let topic = normalize_topic(&self.topic);
        if topic.is_empty() {
            return Err("topic must not be empty".to_string());
        }
        if topic.chars().count() > MAX_TOPIC_CHARS {
            return Err(format!("topic is longer than {} characters", MAX_TOPIC_CHARS));
        }
        if self.target_word_count == Some(0) {
            return Err("target_word_count must be positive".to_string());
        }
        Ok(Self {
            topic,
            keywords: normalize_keywords(&self.keywords),
            mode: self.mode,
            target_word_count: self.target_word_count,
            audience: clean_optional(&self.audience),
            tone: clean_optional(&self.tone),
        })
    }
}

pub fn normalize_topic(topic: &str) -> String {
    topic.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapses whitespace, drops blanks and case-insensitive duplicates.
pub fn normalize_keywords(keywords: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    keywords
        .iter()
        .map(|k| normalize_topic(k))
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_lowercase()))
        .collect()
}

fn clean_optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordPlan {
    pub primary: String,
    pub secondary: Vec<String>,
    pub related_terms: Vec<String>,
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorSummary {
    pub pages: usize,
    pub average_word_count: u32,
    /// Headings used by more than one competitor, most common first.
    pub common_headings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchIntent {
    Informational,
    Commercial,
    Transactional,
    Navigational,
}

impl SearchIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchIntent::Informational => "informational",
            SearchIntent::Commercial => "commercial",
            SearchIntent::Transactional => "transactional",
            SearchIntent::Navigational => "navigational",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAnalysis {
    pub intent: SearchIntent,
    pub rationale: String,
}

/// Generation spend attributed to one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCost {
    pub stage: Stage,
    pub calls: u32,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost_usd: f64,
    pub providers: Vec<String>,
}

impl StageCost {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            calls: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            cost_usd: 0.0,
            providers: Vec::new(),
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Accumulator owned by one pipeline run.
///
/// Every stage writes only its own fields, and [`PipelineContext::reset_stage`]
/// clears them, so re-running a stage replaces its output.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    // Input
    pub job_id: String,
    pub topic: String,
    pub keywords: Vec<String>,
    pub mode: GenerationMode,
    pub requested_word_count: Option<u32>,
    pub audience: Option<String>,
    pub tone: Option<String>,

    // keyword_analysis
    pub research: Option<ResearchBundle>,
    pub keyword_plan: Option<KeywordPlan>,

    // competitor_analysis
    pub competitor_summary: Option<CompetitorSummary>,

    // intent_analysis
    pub intent: Option<IntentAnalysis>,

    // length_targeting
    pub target_word_count: Option<u32>,

    // research_outline
    pub research_notes: Option<String>,
    pub outline: Option<String>,

    // draft_generation, enhancement
    pub draft_text: Option<String>,
    pub enhanced_text: Option<String>,

    // seo_polish
    pub polished_text: Option<String>,
    pub title: Option<String>,
    pub meta_description: Option<String>,

    // semantic_integration
    pub integrated_text: Option<String>,

    // citation_generation
    pub citations: Vec<Citation>,
    pub cited_text: Option<String>,

    // quality_scoring
    pub quality: Option<QualityReport>,

    // finalization
    pub final_text: Option<String>,

    // Bookkeeping, keyed or tagged by stage
    pub stage_costs: BTreeMap<Stage, StageCost>,
    pub metadata: BTreeMap<Stage, Map<String, Value>>,
    pub warnings: Vec<PipelineWarning>,
    pub completed_stages: Vec<Stage>,
}

impl PipelineContext {
    pub fn new(job_id: &str, request: &ContentRequest, default_mode: GenerationMode) -> Self {
        Self {
            job_id: job_id.to_string(),
            topic: request.topic.clone(),
            keywords: request.keywords.clone(),
            mode: request.mode.unwrap_or(default_mode),
            requested_word_count: request.target_word_count,
            audience: request.audience.clone(),
            tone: request.tone.clone(),
            research: None,
            keyword_plan: None,
            competitor_summary: None,
            intent: None,
            target_word_count: None,
            research_notes: None,
            outline: None,
            draft_text: None,
            enhanced_text: None,
            polished_text: None,
            title: None,
            meta_description: None,
            integrated_text: None,
            citations: Vec::new(),
            cited_text: None,
            quality: None,
            final_text: None,
            stage_costs: BTreeMap::new(),
            metadata: BTreeMap::new(),
            warnings: Vec::new(),
            completed_stages: Vec::new(),
        }
    }

    /// Clears everything `stage` writes.
    pub fn reset_stage(&mut self, stage: Stage) {
        match stage {
            Stage::Initialization => {}
            Stage::KeywordAnalysis => {
                self.research = None;
                self.keyword_plan = None;
            }
            Stage::CompetitorAnalysis => self.competitor_summary = None,
            Stage::IntentAnalysis => self.intent = None,
            Stage::LengthTargeting => self.target_word_count = None,
            Stage::ResearchOutline => {
                self.research_notes = None;
                self.outline = None;
            }
            Stage::DraftGeneration => self.draft_text = None,
            Stage::Enhancement => self.enhanced_text = None,
            Stage::SeoPolish => {
                self.polished_text = None;
                self.title = None;
                self.meta_description = None;
            }
            Stage::SemanticIntegration => self.integrated_text = None,
            Stage::CitationGeneration => {
                self.citations.clear();
                self.cited_text = None;
            }
            Stage::QualityScoring => self.quality = None,
            Stage::Finalization => self.final_text = None,
        }
        self.stage_costs.remove(&stage);
        self.metadata.remove(&stage);
        self.warnings.retain(|w| w.stage() != stage);
        self.completed_stages.retain(|s| *s != stage);
    }

    /// The most refined body text produced so far.
    pub fn latest_text(&self) -> Option<&str> {
        self.cited_text
            .as_deref()
            .or(self.integrated_text.as_deref())
            .or(self.polished_text.as_deref())
            .or(self.enhanced_text.as_deref())
            .or(self.draft_text.as_deref())
    }

    pub fn primary_keyword(&self) -> &str {
        match &self.keyword_plan {
            Some(plan) => &plan.primary,
            None => self.keywords.first().map(String::as_str).unwrap_or(&self.topic),
        }
    }

    pub fn secondary_keywords(&self) -> Vec<String> {
        match &self.keyword_plan {
            Some(plan) => plan.secondary.clone(),
            None => self.keywords.iter().skip(1).cloned().collect(),
        }
    }

    pub fn related_terms(&self) -> &[String] {
        self.keyword_plan
            .as_ref()
            .map(|plan| plan.related_terms.as_slice())
            .unwrap_or(&[])
    }

    pub fn record_usage(&mut self, stage: Stage, routed: &RoutedGeneration) {
        let cost = self
            .stage_costs
            .entry(stage)
            .or_insert_with(|| StageCost::new(stage));
        for usage in &routed.usage {
            cost.calls += 1;
            cost.prompt_tokens += u64::from(usage.prompt_tokens);
            cost.completion_tokens += u64::from(usage.completion_tokens);
            cost.cost_usd += usage.cost_usd;
            if !cost.providers.contains(&usage.provider_id) {
                cost.providers.push(usage.provider_id.clone());
            }
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.stage_costs.values().map(StageCost::total_tokens).sum()
    }

    pub fn total_cost(&self) -> f64 {
        self.stage_costs.values().map(|c| c.cost_usd).sum()
    }

    pub fn scoring_context(&self) -> ScoringContext<'_> {
        ScoringContext {
            topic: &self.topic,
            keywords: &self.keywords,
            title: self.title.as_deref(),
            meta_description: self.meta_description.as_deref(),
            citations: &self.citations,
        }
    }

    /// Summary safe to hand to callers when a run fails.
    pub fn diagnostics(&self) -> ContextDiagnostics {
        let texts = [
            ("outline", &self.outline),
            ("draft_text", &self.draft_text),
            ("enhanced_text", &self.enhanced_text),
            ("polished_text", &self.polished_text),
            ("integrated_text", &self.integrated_text),
            ("cited_text", &self.cited_text),
            ("final_text", &self.final_text),
        ];
        ContextDiagnostics {
            completed_stages: self.completed_stages.clone(),
            text_word_counts: texts
                .iter()
                .filter_map(|(name, text)| {
                    text.as_ref()
                        .map(|t| (name.to_string(), t.split_whitespace().count()))
                })
                .collect(),
            citation_count: self.citations.len(),
            warnings: self.warnings.clone(),
            total_tokens: self.total_tokens(),
            total_cost_usd: self.total_cost(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDiagnostics {
    pub completed_stages: Vec<Stage>,
    pub text_word_counts: BTreeMap<String, usize>,
    pub citation_count: usize,
    pub warnings: Vec<PipelineWarning>,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
}

/// The result of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub title: String,
    pub meta_description: String,
    pub final_text: String,
    pub word_count: usize,
    pub mode: GenerationMode,
    pub target_word_count: u32,
    pub citations: Vec<Citation>,
    pub quality: QualityReport,
    pub stage_costs: Vec<StageCost>,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub warnings: Vec<PipelineWarning>,
}
