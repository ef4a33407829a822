use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Readability,
    Seo,
    Structure,
    Factual,
    Uniqueness,
    Engagement,
    Eeat,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::Readability,
        Dimension::Seo,
        Dimension::Structure,
        Dimension::Factual,
        Dimension::Uniqueness,
        Dimension::Engagement,
        Dimension::Eeat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Readability => "readability",
            Dimension::Seo => "seo",
            Dimension::Structure => "structure",
            Dimension::Factual => "factual",
            Dimension::Uniqueness => "uniqueness",
            Dimension::Engagement => "engagement",
            Dimension::Eeat => "eeat",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Advisory,
}

/// A dimension that scored under its hard floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub dimension: Dimension,
    pub score: f64,
    pub floor: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub dimension: Dimension,
    pub severity: Severity,
    pub text: String,
}

/// Raw measurements behind the dimension scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub word_count: usize,
    pub sentence_count: usize,
    pub paragraph_count: usize,
    pub heading_count: usize,
    pub list_item_count: usize,
    pub flesch_reading_ease: f64,
    /// Primary keyword share of all words, in percent.
    pub keyword_density: f64,
    pub citation_count: usize,
    pub citations_per_thousand: f64,
    pub claim_count: usize,
    pub generic_phrase_count: usize,
    pub repeated_trigram_ratio: f64,
    pub question_count: usize,
    pub experience_phrase_count: usize,
    pub absolute_claim_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_citation_authority: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub dimension_scores: BTreeMap<Dimension, f64>,
    pub composite_score: f64,
    pub passed_threshold: bool,
    pub critical_issues: Vec<QualityIssue>,
    pub recommendations: Vec<Recommendation>,
    pub metrics: QualityMetrics,
}

impl QualityReport {
    pub fn score(&self, dimension: Dimension) -> f64 {
        self.dimension_scores.get(&dimension).copied().unwrap_or(0.0)
    }
}
