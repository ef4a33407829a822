use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use super::readability::{band_score, flesch_reading_ease};
use super::report::{
    Dimension, QualityIssue, QualityMetrics, QualityReport, Recommendation, Severity,
};
use super::text::{parse_heading, TextStats};
use crate::citation::Citation;
use crate::config::QualityConfig;

/// Numbers with a percent sign, and multi-digit figures.
static CLAIM_FIGURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d+(?:[.,]\d+)*\s?(?:%|percent\b)|\b\d{2,}(?:[.,]\d+)*\b").unwrap()
});

const CLAIM_PHRASES: &[&str] = &[
    "according to",
    "studies show",
    "study found",
    "research shows",
    "research suggests",
    "data shows",
    "survey",
    "statistics",
    "experts say",
    "on average",
];

const GENERIC_PHRASES: &[&str] = &[
    "in today's world",
    "in today's fast-paced world",
    "it is important to note",
    "it's important to note",
    "in conclusion",
    "at the end of the day",
    "when it comes to",
    "needless to say",
    "plays a crucial role",
    "a wide range of",
    "in this article",
    "game changer",
    "delve into",
    "unlock the power",
    "first and foremost",
    "last but not least",
    "it goes without saying",
];

const CTA_PHRASES: &[&str] = &[
    "sign up",
    "subscribe",
    "get started",
    "try it",
    "contact us",
    "learn more",
    "download",
    "start today",
    "give it a try",
    "let us know",
    "book a",
];

const EXAMPLE_PHRASES: &[&str] = &[
    "for example",
    "for instance",
    "such as",
    "case study",
    "imagine",
    "consider",
];

const EXPERIENCE_PHRASES: &[&str] = &[
    "in my experience",
    "in our experience",
    "i've",
    "we've",
    "i found",
    "we found",
    "i tested",
    "we tested",
    "i learned",
    "we learned",
    "hands-on",
    "when i",
    "when we",
];

const ABSOLUTE_PHRASES: &[&str] = &[
    "guaranteed",
    "always works",
    "never fails",
    "everyone knows",
    "proven to",
    "scientifically proven",
    "undeniably",
    "without a doubt",
    "100 percent",
    "completely safe",
];

/// Score under which a dimension that passed its floor still gets advice.
const ADVISORY_BELOW: f64 = 70.0;

/// What the scorer needs to know beyond the text itself.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub topic: &'a str,
    pub keywords: &'a [String],
    pub title: Option<&'a str>,
    pub meta_description: Option<&'a str>,
    pub citations: &'a [Citation],
}

impl<'a> ScoringContext<'a> {
    /// The primary keyword, falling back to the topic.
    fn primary_keyword(&self) -> &'a str {
        self.keywords
            .iter()
            .map(|k| k.trim())
            .find(|k| !k.is_empty())
            .unwrap_or(self.topic)
    }
}

pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Scores `content`. Same inputs, same report.
    pub fn score(&self, content: &str, context: &ScoringContext<'_>) -> QualityReport {
        let stats = TextStats::analyze(content);
        let mut metrics = QualityMetrics {
            word_count: stats.word_count(),
            sentence_count: stats.sentence_count,
            paragraph_count: stats.paragraph_count(),
            heading_count: stats.headings.len(),
            list_item_count: stats.list_items,
            question_count: stats.question_count,
            citation_count: context.citations.len(),
            ..QualityMetrics::default()
        };

        let title = context.title.map(str::to_string).or_else(|| first_h1(content));

        let mut scores = BTreeMap::new();
        scores.insert(
            Dimension::Readability,
            self.readability(&stats, &mut metrics),
        );
        scores.insert(
            Dimension::Seo,
            seo(&stats, context, title.as_deref(), &mut metrics),
        );
        scores.insert(Dimension::Structure, structure(&stats));
        scores.insert(
            Dimension::Factual,
            self.factual(&stats, context, &mut metrics),
        );
        scores.insert(Dimension::Uniqueness, uniqueness(&stats, &mut metrics));
        scores.insert(Dimension::Engagement, engagement(&stats));
        scores.insert(Dimension::Eeat, eeat(&stats, context, &mut metrics));

        for score in scores.values_mut() {
            *score = round2(*score);
        }

        let composite = round2(
            scores
                .iter()
                .map(|(dimension, score)| self.config.weights.get(*dimension) * score)
                .sum::<f64>()
                .clamp(0.0, 100.0),
        );

        let mut critical_issues = Vec::new();
        let mut recommendations = Vec::new();
        for (dimension, score) in &scores {
            let floor = self.config.floors.get(*dimension);
            if *score < floor {
                critical_issues.push(QualityIssue {
                    dimension: *dimension,
                    score: *score,
                    floor,
                    message: format!(
                        "{} score {:.1} is below the floor of {:.1}",
                        dimension, score, floor
                    ),
                });
                recommendations.push(Recommendation {
                    dimension: *dimension,
                    severity: Severity::Critical,
                    text: self.advice(*dimension, &metrics),
                });
            } else if *score < ADVISORY_BELOW {
                recommendations.push(Recommendation {
                    dimension: *dimension,
                    severity: Severity::Advisory,
                    text: self.advice(*dimension, &metrics),
                });
            }
        }

        QualityReport {
            passed_threshold: composite >= self.config.min_composite && critical_issues.is_empty(),
            dimension_scores: scores,
            composite_score: composite,
            critical_issues,
            recommendations,
            metrics,
        }
    }

    fn readability(&self, stats: &TextStats, metrics: &mut QualityMetrics) -> f64 {
        let ease = flesch_reading_ease(stats);
        metrics.flesch_reading_ease = round2(ease);
        if stats.word_count() == 0 {
            return 0.0;
        }
        band_score(ease, &self.config.readability_band)
    }

    fn factual(
        &self,
        stats: &TextStats,
        context: &ScoringContext<'_>,
        metrics: &mut QualityMetrics,
    ) -> f64 {
        let words = stats.word_count();
        let claims =
            CLAIM_FIGURE.find_iter(&stats.prose_lower).count() + stats.count_phrases(CLAIM_PHRASES);
        metrics.claim_count = claims;

        let per_thousand = |n: usize| {
            if words == 0 {
                0.0
            } else {
                n as f64 / words as f64 * 1000.0
            }
        };
        let citations = context.citations.len();
        let citation_rate = per_thousand(citations);
        metrics.citations_per_thousand = round2(citation_rate);

        if citations == 0 {
            let claims_heavy = claims >= 3 && per_thousand(claims) >= 5.0;
            return if claims_heavy { 0.0 } else { 50.0 };
        }
        (40.0 + 60.0 * citation_rate / self.config.citations_per_thousand_target).min(100.0)
    }

    fn advice(&self, dimension: Dimension, metrics: &QualityMetrics) -> String {
        let band = &self.config.readability_band;
        match dimension {
            Dimension::Readability => format!(
                "Shorten sentences and prefer plainer words to bring reading ease into \
                 {:.0}-{:.0} (currently {:.1}).",
                band.min, band.max, metrics.flesch_reading_ease
            ),
            Dimension::Seo => "Use the primary keyword in the title, the opening paragraph and a \
                               heading; add a 120-160 character meta description and at least \
                               two H2 sections."
                .to_string(),
            Dimension::Structure => "Break long paragraphs up, add H2/H3 headings without \
                                     skipping levels and use lists for steps or options."
                .to_string(),
            Dimension::Factual => format!(
                "Back statistics and claims with authoritative sources (aim for {:.0} \
                 citations per 1000 words, currently {:.1}).",
                self.config.citations_per_thousand_target, metrics.citations_per_thousand
            ),
            Dimension::Uniqueness => format!(
                "Replace generic filler phrases ({} found) and rephrase repeated passages.",
                metrics.generic_phrase_count
            ),
            Dimension::Engagement => "Ask the reader questions, add concrete examples and \
                                      close with a clear call to action."
                .to_string(),
            Dimension::Eeat => "Add first-hand experience, cite high-authority sources and \
                                drop unverifiable absolute claims."
                .to_string(),
        }
    }
}

fn seo(
    stats: &TextStats,
    context: &ScoringContext<'_>,
    title: Option<&str>,
    metrics: &mut QualityMetrics,
) -> f64 {
    let primary = context.primary_keyword();
    let primary_lower = primary.to_lowercase();
    let mut score = 0.0;

    if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
        score += 10.0;
        if (30..=65).contains(&title.chars().count()) {
            score += 10.0;
        }
        if !primary_lower.is_empty() && title.to_lowercase().contains(&primary_lower) {
            score += 15.0;
        }
    }

    if let Some(meta) = context
        .meta_description
        .map(str::trim)
        .filter(|m| !m.is_empty())
    {
        score += 10.0;
        if (120..=160).contains(&meta.chars().count()) {
            score += 10.0;
        }
    }

    let h2 = stats.headings.iter().filter(|h| h.level == 2).count();
    score += match h2 {
        0 => 0.0,
        1 => 7.0,
        _ => 15.0,
    };

    if !primary_lower.is_empty() {
        if stats.first_paragraph.to_lowercase().contains(&primary_lower) {
            score += 10.0;
        }
        if stats
            .headings
            .iter()
            .any(|h| h.text.to_lowercase().contains(&primary_lower))
        {
            score += 10.0;
        }

        let phrase_words = primary.split_whitespace().count().max(1);
        let density = if stats.word_count() == 0 {
            0.0
        } else {
            (stats.count_phrase(primary) * phrase_words) as f64 / stats.word_count() as f64 * 100.0
        };
        metrics.keyword_density = round2(density);
        if (0.5..=2.5).contains(&density) {
            score += 10.0;
        } else if density > 0.0 {
            score += 5.0;
        }
    }

    score
}

fn structure(stats: &TextStats) -> f64 {
    let mut score = 0.0;

    let paragraphs = stats.paragraph_count();
    if paragraphs > 0 {
        let total: usize = stats.paragraph_words.iter().sum();
        let average = total as f64 / paragraphs as f64;
        score += if average <= 80.0 {
            30.0
        } else if average <= 120.0 {
            20.0
        } else {
            10.0
        };

        let long = stats.paragraph_words.iter().filter(|w| **w > 150).count();
        let long_share = long as f64 / paragraphs as f64;
        score += if long == 0 {
            20.0
        } else if long_share <= 0.2 {
            10.0
        } else {
            0.0
        };
    }

    score += match stats.list_items {
        0 => 0.0,
        1 | 2 => 10.0,
        _ => 20.0,
    };

    if !stats.headings.is_empty() {
        if stats.headings.iter().any(|h| h.level == 2) {
            score += 15.0;
        }
        if stats.headings.iter().any(|h| h.level == 3) {
            score += 10.0;
        }
        let skips = stats
            .headings
            .windows(2)
            .any(|pair| pair[1].level > pair[0].level + 1);
        if !skips {
            score += 5.0;
        }
    }

    score
}

fn uniqueness(stats: &TextStats, metrics: &mut QualityMetrics) -> f64 {
    let words = stats.word_count();
    if words == 0 {
        return 0.0;
    }

    let generic = stats.count_phrases(GENERIC_PHRASES);
    metrics.generic_phrase_count = generic;
    let generic_per_thousand = generic as f64 / words as f64 * 1000.0;
    let generic_penalty = (generic_per_thousand * 10.0).min(60.0);

    let mut trigrams: HashMap<&[String], usize> = HashMap::new();
    for window in stats.words.windows(3) {
        *trigrams.entry(window).or_default() += 1;
    }
    let total = words.saturating_sub(2);
    let repeated: usize = trigrams.values().filter(|c| **c > 1).map(|c| c - 1).sum();
    let ratio = if total == 0 {
        0.0
    } else {
        repeated as f64 / total as f64
    };
    metrics.repeated_trigram_ratio = round2(ratio);
    let repetition_penalty = (ratio * 200.0).min(40.0);

    (100.0 - generic_penalty - repetition_penalty).max(0.0)
}

fn engagement(stats: &TextStats) -> f64 {
    let mut score = match stats.question_count {
        0 => 0.0,
        1 | 2 => 20.0,
        _ => 35.0,
    };
    if stats.count_phrases(CTA_PHRASES) > 0 {
        score += 30.0;
    }
    score += match stats.count_phrases(EXAMPLE_PHRASES) {
        0 => 0.0,
        1 => 20.0,
        _ => 35.0,
    };
    score
}

fn eeat(stats: &TextStats, context: &ScoringContext<'_>, metrics: &mut QualityMetrics) -> f64 {
    let experience = stats.count_phrases(EXPERIENCE_PHRASES);
    metrics.experience_phrase_count = experience;
    let mut score = match experience {
        0 => 0.0,
        1 => 20.0,
        _ => 35.0,
    };

    let known: Vec<f64> = context
        .citations
        .iter()
        .filter_map(|c| c.domain_authority_rank)
        .map(f64::from)
        .collect();
    if !known.is_empty() {
        let mean = known.iter().sum::<f64>() / known.len() as f64;
        metrics.mean_citation_authority = Some(round2(mean));
        // Ranks above 100 count as fully authoritative.
        score += mean.min(100.0) / 100.0 * 40.0;
    }

    let absolute = stats.count_phrases(ABSOLUTE_PHRASES);
    metrics.absolute_claim_count = absolute;
    score += match absolute {
        0 => 25.0,
        1 | 2 => 12.0,
        _ => 0.0,
    };

    if stats.word_count() == 0 {
        return 0.0;
    }
    score
}

fn first_h1(content: &str) -> Option<String> {
    content
        .lines()
        .filter_map(|line| parse_heading(line.trim()))
        .find(|h| h.level == 1)
        .map(|h| h.text)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLE: &str = "# Ocean Tides Explained for Curious Beginners\n\n\
Ocean tides are the slow rise and fall of the sea. \
In my experience, they are easy to watch from any pier. \
Have you ever noticed them?\n\n\
## What causes ocean tides\n\n\
The moon pulls on the water. The sun pulls too, but less. \
For example, a full moon makes higher tides.\n\n\
### Spring and neap tides\n\n\
Spring tides are strong. Neap tides are weak. \
We found the difference easy to see on a calm day.\n\n\
## How to watch them\n\n\
- Pick a quiet beach.\n\
- Check a tide table.\n\
- Mark the water line every hour.\n\n\
Why not try it this weekend? What will you see? Get started with a local tide table today.\n";

    fn keywords() -> Vec<String> {
        vec!["ocean tides".to_string()]
    }

    fn citation(rank: Option<u16>) -> Citation {
        Citation {
            marker: 1,
            source_url: "https://noaa.gov/tides".to_string(),
            source_title: "Tides".to_string(),
            snippet: String::new(),
            domain: "noaa.gov".to_string(),
            domain_authority_rank: rank,
            relevance_score: 0.9,
        }
    }

    fn scorer() -> QualityScorer {
        QualityScorer::new(QualityConfig::default())
    }

    #[test]
    fn test_scores_every_dimension_within_range() {
        let kw = keywords();
        let citations = vec![citation(Some(90))];
        let context = ScoringContext {
            topic: "Ocean tides",
            keywords: &kw,
            title: Some("Ocean Tides Explained for Curious Beginners"),
            meta_description: None,
            citations: &citations,
        };

        let report = scorer().score(ARTICLE, &context);

        assert_eq!(report.dimension_scores.len(), 7);
        for score in report.dimension_scores.values() {
            assert!((0.0..=100.0).contains(score));
        }
        assert!((0.0..=100.0).contains(&report.composite_score));
        assert_eq!(report.score(Dimension::Structure), 100.0);
        assert!(report.score(Dimension::Engagement) >= 85.0);
        assert_eq!(report.metrics.citation_count, 1);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let kw = keywords();
        let citations = vec![citation(Some(70)), citation(None)];
        let context = ScoringContext {
            topic: "Ocean tides",
            keywords: &kw,
            title: None,
            meta_description: Some("A short description."),
            citations: &citations,
        };

        let first = serde_json::to_string(&scorer().score(ARTICLE, &context)).unwrap();
        let second = serde_json::to_string(&scorer().score(ARTICLE, &context)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_claims_without_citations_is_critical() {
        let text = "Studies show 45% of readers skim. According to a 2023 survey, 70% of \
                    visitors leave within 15 seconds. Research shows 3 in 10 return.";
        let context = ScoringContext {
            topic: "reading habits",
            keywords: &[],
            title: None,
            meta_description: None,
            citations: &[],
        };

        let report = scorer().score(text, &context);

        assert_eq!(report.score(Dimension::Factual), 0.0);
        assert!(!report.passed_threshold);
        let factual_issues: Vec<_> = report
            .critical_issues
            .iter()
            .filter(|i| i.dimension == Dimension::Factual)
            .collect();
        assert_eq!(factual_issues.len(), 1);
        let factual_critical = report
            .recommendations
            .iter()
            .filter(|r| r.dimension == Dimension::Factual && r.severity == Severity::Critical)
            .count();
        assert_eq!(factual_critical, 1);
    }

    #[test]
    fn test_light_text_without_citations_is_neutral() {
        let context = ScoringContext {
            topic: "walks",
            keywords: &[],
            title: None,
            meta_description: None,
            citations: &[],
        };
        let report = scorer().score("A walk in the park is pleasant. Bring a friend.", &context);
        assert_eq!(report.score(Dimension::Factual), 50.0);
    }

    #[test]
    fn test_one_issue_and_one_recommendation_per_violation() {
        let context = ScoringContext {
            topic: "nothing",
            keywords: &[],
            title: None,
            meta_description: None,
            citations: &[],
        };
        let report = scorer().score("", &context);

        assert!(!report.passed_threshold);
        for issue in &report.critical_issues {
            let critical = report
                .recommendations
                .iter()
                .filter(|r| r.dimension == issue.dimension && r.severity == Severity::Critical)
                .count();
            assert_eq!(critical, 1);
        }
        let critical_total = report
            .recommendations
            .iter()
            .filter(|r| r.severity == Severity::Critical)
            .count();
        assert_eq!(critical_total, report.critical_issues.len());
    }

    #[test]
    fn test_composite_is_weighted_sum() {
        let kw = keywords();
        let context = ScoringContext {
            topic: "Ocean tides",
            keywords: &kw,
            title: None,
            meta_description: None,
            citations: &[],
        };
        let report = scorer().score(ARTICLE, &context);
        let weights = QualityConfig::default().weights;
        let expected: f64 = report
            .dimension_scores
            .iter()
            .map(|(d, s)| weights.get(*d) * s)
            .sum();
        assert!((report.composite_score - expected).abs() < 0.01);
    }

    #[test]
    fn test_generic_phrases_lower_uniqueness() {
        let context = ScoringContext {
            topic: "x",
            keywords: &[],
            title: None,
            meta_description: None,
            citations: &[],
        };
        let plain = scorer().score("Tides move water along the coast every day.", &context);
        let generic = scorer().score(
            "In today's world it is important to note that when it comes to tides, \
             at the end of the day, water moves.",
            &context,
        );
        assert!(generic.score(Dimension::Uniqueness) < plain.score(Dimension::Uniqueness));
        assert!(generic.metrics.generic_phrase_count >= 4);
    }
}
