use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed, ordered pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initialization,
    KeywordAnalysis,
    CompetitorAnalysis,
    IntentAnalysis,
    LengthTargeting,
    ResearchOutline,
    DraftGeneration,
    Enhancement,
    SeoPolish,
    SemanticIntegration,
    CitationGeneration,
    QualityScoring,
    Finalization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    /// Failure aborts the run.
    Mandatory,
    /// Failure is recorded as a warning; quick mode skips the stage.
    Optional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageInfo {
    pub stage: Stage,
    pub requirement: Requirement,
    /// Progress band `[start, end]` in percent.
    pub band: (u8, u8),
}

impl StageInfo {
    const fn new(stage: Stage, requirement: Requirement, band: (u8, u8)) -> Self {
        Self {
            stage,
            requirement,
            band,
        }
    }
}

/// Declared stage table. Bands partition 0..=100 without gaps.
pub const STAGES: [StageInfo; 13] = [
    StageInfo::new(Stage::Initialization, Requirement::Mandatory, (0, 2)),
    StageInfo::new(Stage::KeywordAnalysis, Requirement::Optional, (2, 8)),
    StageInfo::new(Stage::CompetitorAnalysis, Requirement::Optional, (8, 14)),
    StageInfo::new(Stage::IntentAnalysis, Requirement::Optional, (14, 18)),
    StageInfo::new(Stage::LengthTargeting, Requirement::Mandatory, (18, 20)),
    StageInfo::new(Stage::ResearchOutline, Requirement::Mandatory, (20, 32)),
    StageInfo::new(Stage::DraftGeneration, Requirement::Mandatory, (32, 55)),
    StageInfo::new(Stage::Enhancement, Requirement::Optional, (55, 68)),
    StageInfo::new(Stage::SeoPolish, Requirement::Optional, (68, 76)),
    StageInfo::new(Stage::SemanticIntegration, Requirement::Optional, (76, 82)),
    StageInfo::new(Stage::CitationGeneration, Requirement::Optional, (82, 88)),
    StageInfo::new(Stage::QualityScoring, Requirement::Mandatory, (88, 95)),
    StageInfo::new(Stage::Finalization, Requirement::Mandatory, (95, 100)),
];

pub const TOTAL_STAGES: usize = STAGES.len();

impl Stage {
    pub const ALL: [Stage; TOTAL_STAGES] = [
        Stage::Initialization,
        Stage::KeywordAnalysis,
        Stage::CompetitorAnalysis,
        Stage::IntentAnalysis,
        Stage::LengthTargeting,
        Stage::ResearchOutline,
        Stage::DraftGeneration,
        Stage::Enhancement,
        Stage::SeoPolish,
        Stage::SemanticIntegration,
        Stage::CitationGeneration,
        Stage::QualityScoring,
        Stage::Finalization,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn info(self) -> &'static StageInfo {
        &STAGES[self.index()]
    }

    pub fn requirement(self) -> Requirement {
        self.info().requirement
    }

    pub fn is_mandatory(self) -> bool {
        self.requirement() == Requirement::Mandatory
    }

    pub fn band(self) -> (u8, u8) {
        self.info().band
    }

    /// Percentage for `fraction` (0.0..=1.0) of this stage's work.
    pub fn percentage_at(self, fraction: f64) -> u8 {
        let (start, end) = self.band();
        let span = f64::from(end - start) * fraction.clamp(0.0, 1.0);
        start + span.round() as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Initialization => "initialization",
            Stage::KeywordAnalysis => "keyword_analysis",
            Stage::CompetitorAnalysis => "competitor_analysis",
            Stage::IntentAnalysis => "intent_analysis",
            Stage::LengthTargeting => "length_targeting",
            Stage::ResearchOutline => "research_outline",
            Stage::DraftGeneration => "draft_generation",
            Stage::Enhancement => "enhancement",
            Stage::SeoPolish => "seo_polish",
            Stage::SemanticIntegration => "semantic_integration",
            Stage::CitationGeneration => "citation_generation",
            Stage::QualityScoring => "quality_scoring",
            Stage::Finalization => "finalization",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
