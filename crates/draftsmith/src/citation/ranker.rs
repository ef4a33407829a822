use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::authority::AuthorityLookup;
use super::domain::{normalize_url, resolve_domain};
use crate::config::CitationsConfig;
use crate::provider::CitationCandidate;
use crate::sanitize;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]["')\]]*(\s|$)"#).unwrap());

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z0-9]+").unwrap());

const STOPWORDS: &[&str] = &[
    "about", "after", "also", "been", "being", "from", "have", "into", "more", "most", "other",
    "over", "same", "some", "than", "that", "their", "them", "then", "there", "these", "they",
    "this", "those", "very", "were", "what", "when", "which", "while", "will", "with", "your",
];

const MIN_OVERLAP: usize = 2;

/// A ranked source with its marker number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub marker: u32,
    pub source_url: String,
    pub source_title: String,
    pub snippet: String,
    pub domain: String,
    /// 0..=1000, `None` when the domain is unknown.
    pub domain_authority_rank: Option<u16>,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankingOptions {
    pub min_authority: u16,
    pub prefer_high_authority: bool,
    pub max_citations: usize,
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self {
            min_authority: 20,
            prefer_high_authority: true,
            max_citations: 10,
        }
    }
}

impl From<&CitationsConfig> for RankingOptions {
    fn from(config: &CitationsConfig) -> Self {
        Self {
            min_authority: config.min_authority,
            prefer_high_authority: config.prefer_high_authority,
            max_citations: config.max_citations,
        }
    }
}

pub struct CitationRanker {
    lookup: Arc<dyn AuthorityLookup>,
}

struct Ranked<'a> {
    candidate: &'a CitationCandidate,
    domain: String,
    rank: Option<u16>,
}

impl CitationRanker {
    pub fn new(lookup: Arc<dyn AuthorityLookup>) -> Self {
        Self { lookup }
    }

    /// Orders, filters and numbers citation candidates.
    ///
    /// Returns an empty list only for empty input: when every candidate is
    /// below `min_authority`, the single best-ranked one is kept.
    pub fn rank_and_filter(
        &self,
        candidates: &[CitationCandidate],
        options: &RankingOptions,
    ) -> Vec<Citation> {
        let mut ranked: Vec<Ranked<'_>> = candidates
            .iter()
            .map(|candidate| {
                let domain = resolve_domain(&candidate.url).unwrap_or_default();
                let rank = candidate
                    .authority
                    .or_else(|| {
                        if domain.is_empty() {
                            None
                        } else {
                            self.lookup.authority(&domain)
                        }
                    })
                    .map(|r| r.min(1000));
                Ranked {
                    candidate,
                    domain,
                    rank,
                }
            })
            .collect();

        ranked.sort_by(|a, b| compare(a, b, options.prefer_high_authority));

        // Sorted first, so the surviving duplicate is the better one.
        let mut seen = HashSet::new();
        ranked.retain(|r| seen.insert(normalize_url(&r.candidate.url)));

        let Some(best) = ranked
            .iter()
            .min_by(|a, b| compare(a, b, true))
            .map(|r| normalize_url(&r.candidate.url))
        else {
            return Vec::new();
        };

        let before = ranked.len();
        let mut kept: Vec<Ranked<'_>> = Vec::with_capacity(ranked.len());
        let mut fallback = None;
        for r in ranked {
            if r.rank.is_some_and(|rank| rank >= options.min_authority) {
                kept.push(r);
            } else if fallback.is_none() && normalize_url(&r.candidate.url) == best {
                fallback = Some(r);
            } else {
                debug!(
                    url = %sanitize::redact_url(&r.candidate.url),
                    rank = ?r.rank,
                    "Citation below authority minimum"
                );
            }
        }
        if kept.is_empty() {
            debug!(candidates = before, "No citation met the authority minimum, keeping best");
            kept.extend(fallback);
        }

        kept.truncate(options.max_citations.max(1));

        kept.into_iter()
            .enumerate()
            .map(|(i, r)| Citation {
                marker: (i + 1) as u32,
                source_url: r.candidate.url.clone(),
                source_title: r.candidate.title.clone(),
                snippet: r.candidate.snippet.clone(),
                domain: r.domain,
                domain_authority_rank: r.rank,
                relevance_score: r.candidate.relevance_score,
            })
            .collect()
    }
}

fn compare(a: &Ranked<'_>, b: &Ranked<'_>, prefer_authority: bool) -> Ordering {
    // Descending; unknown authority sorts last.
    let by_rank = b.rank.cmp(&a.rank);
    let by_relevance = b
        .candidate
        .relevance_score
        .total_cmp(&a.candidate.relevance_score);
    if prefer_authority {
        by_rank.then(by_relevance)
    } else {
        by_relevance.then(by_rank)
    }
}

/// Places each citation's `[n]` marker after the sentence that best matches
/// its snippet and appends a `## Sources` section.
///
/// A citation whose snippet shares fewer than two significant words with
/// every sentence gets no inline marker but is still listed.
pub fn integrate(text: &str, citations: &[Citation]) -> String {
    if citations.is_empty() {
        return text.to_string();
    }

    let sentences = sentence_spans(text);
    let sentence_words: Vec<HashSet<String>> = sentences
        .iter()
        .map(|(start, end)| significant_words(&text[*start..*end]))
        .collect();

    // Insertion offset -> markers placed there.
    let mut insertions: BTreeMap<usize, Vec<u32>> = BTreeMap::new();
    for citation in citations {
        let snippet_words = significant_words(&citation.snippet);
        if snippet_words.is_empty() {
            continue;
        }
        let best = sentence_words
            .iter()
            .enumerate()
            .map(|(i, words)| (i, words.intersection(&snippet_words).count()))
            .filter(|(_, overlap)| *overlap >= MIN_OVERLAP)
            .max_by(|(ia, a), (ib, b)| a.cmp(b).then(ib.cmp(ia)));
        if let Some((index, _)) = best {
            insertions
                .entry(sentences[index].1)
                .or_default()
                .push(citation.marker);
        }
    }

    let mut output = String::with_capacity(text.len() + citations.len() * 96);
    let mut cursor = 0;
    for (offset, mut markers) in insertions {
        markers.sort_unstable();
        output.push_str(&text[cursor..offset]);
        for marker in markers {
            let _ = write!(output, "[{}]", marker);
        }
        cursor = offset;
    }
    output.push_str(&text[cursor..]);

    let trimmed_len = output.trim_end().len();
    output.truncate(trimmed_len);
    output.push_str("\n\n## Sources\n\n");
    for citation in citations {
        let _ = writeln!(
            output,
            "[{}] {}. {}",
            citation.marker,
            citation.source_title.trim(),
            citation.source_url
        );
    }
    output
}

/// Byte spans of prose sentences, ending just after the terminal
/// punctuation. Heading lines are skipped.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut line_start = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            let mut start = line_start;
            for m in SENTENCE_END.find_iter(line) {
                let punct_end = line_start + m.start() + m.as_str().trim_end().len();
                spans.push((start, punct_end));
                start = line_start + m.end();
            }
        }
        line_start += line.len();
    }
    spans
}

fn significant_words(text: &str) -> HashSet<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.len() >= 4 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}
