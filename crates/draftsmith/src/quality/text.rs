//! Markdown-aware text statistics shared by the dimension scorers.

use std::sync::LazyLock;

use regex::Regex;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9]+(?:['’][A-Za-z]+)?").unwrap());
static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]+(\s|$)").unwrap());
static CITATION_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\d+\]").unwrap());
static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static ORDERED_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[.)]\s").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// Counts and extracted parts of a markdown document.
///
/// Everything after a `## Sources` heading is ignored.
#[derive(Debug, Clone, Default)]
pub struct TextStats {
    /// Lowercased word tokens of prose (paragraphs and list items).
    pub words: Vec<String>,
    pub sentence_count: usize,
    pub syllable_count: usize,
    /// Word count of each prose paragraph.
    pub paragraph_words: Vec<usize>,
    pub headings: Vec<Heading>,
    pub list_items: usize,
    pub question_count: usize,
    pub first_paragraph: String,
    /// Prose lowercased and flattened to one line, for phrase search.
    pub prose_lower: String,
}

impl TextStats {
    pub fn analyze(content: &str) -> Self {
        let mut stats = TextStats::default();
        let mut prose_parts: Vec<String> = Vec::new();
        let mut paragraph: Vec<String> = Vec::new();

        for raw in content.lines() {
            let line = raw.trim();

            if let Some(heading) = parse_heading(line) {
                flush_paragraph(&mut paragraph, &mut stats, &mut prose_parts);
                if heading.level == 2 && heading.text.eq_ignore_ascii_case("sources") {
                    break;
                }
                stats.headings.push(heading);
                continue;
            }

            if line.is_empty() {
                flush_paragraph(&mut paragraph, &mut stats, &mut prose_parts);
                continue;
            }

            if let Some(item) = list_item(line) {
                flush_paragraph(&mut paragraph, &mut stats, &mut prose_parts);
                stats.list_items += 1;
                prose_parts.push(clean_inline(item));
                continue;
            }

            paragraph.push(line.to_string());
        }
        flush_paragraph(&mut paragraph, &mut stats, &mut prose_parts);

        for part in &prose_parts {
            let sentences = SENTENCE_END.find_iter(part).count();
            // A trailing fragment without punctuation still counts as one.
            let tail = SENTENCE_END
                .find_iter(part)
                .last()
                .map(|m| &part[m.end()..])
                .unwrap_or(part.as_str());
            let has_tail = WORD.is_match(tail);
            stats.sentence_count += sentences + usize::from(has_tail);
            stats.question_count += part.matches('?').count();

            for m in WORD.find_iter(part) {
                let word = m.as_str().to_lowercase();
                stats.syllable_count += syllables(&word);
                stats.words.push(word);
            }
        }

        stats.prose_lower = prose_parts.join(" ").to_lowercase();
        stats
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn paragraph_count(&self) -> usize {
        self.paragraph_words.len()
    }

    /// Occurrences of `phrase` (case-insensitive, whole words) in the prose.
    pub fn count_phrase(&self, phrase: &str) -> usize {
        let needle: Vec<String> = WORD
            .find_iter(phrase)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        if needle.is_empty() || needle.len() > self.words.len() {
            return 0;
        }
        self.words
            .windows(needle.len())
            .filter(|window| window.iter().zip(&needle).all(|(a, b)| a == b))
            .count()
    }

    /// Total occurrences of every phrase in `phrases`.
    pub fn count_phrases(&self, phrases: &[&str]) -> usize {
        phrases.iter().map(|p| self.count_phrase(p)).sum()
    }
}

fn flush_paragraph(paragraph: &mut Vec<String>, stats: &mut TextStats, prose: &mut Vec<String>) {
    if paragraph.is_empty() {
        return;
    }
    let cleaned = clean_inline(&paragraph.join(" "));
    paragraph.clear();
    stats.paragraph_words.push(WORD.find_iter(&cleaned).count());
    if stats.first_paragraph.is_empty() {
        stats.first_paragraph = cleaned.clone();
    }
    prose.push(cleaned);
}

/// Parses `## Heading` lines (levels 1 to 6).
pub fn parse_heading(line: &str) -> Option<Heading> {
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some(Heading {
        level: hashes as u8,
        text: rest.trim().trim_end_matches('#').trim().to_string(),
    })
}

fn list_item(line: &str) -> Option<&str> {
    for bullet in ["- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return Some(rest);
        }
    }
    ORDERED_ITEM.find(line).map(|m| &line[m.end()..])
}

/// Strips citation markers, link targets and emphasis characters.
fn clean_inline(text: &str) -> String {
    let text = CITATION_MARKER.replace_all(text, "");
    let text = MARKDOWN_LINK.replace_all(&text, "$1");
    text.chars()
        .filter(|c| !matches!(c, '*' | '_' | '`'))
        .collect()
}

/// Vowel-group syllable estimate.
pub fn syllables(word: &str) -> usize {
    let letters: Vec<char> = word
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if letters.is_empty() {
        return 1;
    }
    if letters.len() <= 3 {
        return 1;
    }

    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
    let mut count = 0;
    let mut previous_vowel = false;
    for c in &letters {
        let vowel = is_vowel(*c);
        if vowel && !previous_vowel {
            count += 1;
        }
        previous_vowel = vowel;
    }

    let n = letters.len();
    if letters[n - 1] == 'e' && !(letters[n - 2] == 'l' && !is_vowel(letters[n - 3])) && count > 1 {
        count -= 1;
    }
    count.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Guide to Tides\n\n\
Tides rise twice a day. Why does that happen?\n\n\
## The moon\n\n\
The moon pulls the ocean [1]. See [NOAA](https://noaa.gov) for **details**.\n\n\
- first item\n\
- second item\n\
1. ordered item\n\n\
## Sources\n\n\
[1] Ignored source line.\n";

    #[test]
    fn test_structure_is_extracted() {
        let stats = TextStats::analyze(SAMPLE);

        assert_eq!(stats.headings.len(), 2);
        assert_eq!(stats.headings[0].level, 1);
        assert_eq!(stats.headings[1].text, "The moon");
        assert_eq!(stats.paragraph_count(), 2);
        assert_eq!(stats.list_items, 3);
        assert_eq!(stats.question_count, 1);
        assert_eq!(stats.first_paragraph, "Tides rise twice a day. Why does that happen?");
        assert!(!stats.prose_lower.contains("ignored"));
        assert!(!stats.prose_lower.contains("noaa.gov"));
        assert!(stats.prose_lower.contains("see noaa for details"));
    }

    #[test]
    fn test_sentence_count_includes_unterminated_fragments() {
        let stats = TextStats::analyze("One. Two!\n\n- a list item without stop\n");
        assert_eq!(stats.sentence_count, 3);
    }

    #[test]
    fn test_count_phrase_matches_whole_words() {
        let stats = TextStats::analyze("Ocean tides and ocean tidal waves. Ocean tides again.");
        assert_eq!(stats.count_phrase("ocean tides"), 2);
        assert_eq!(stats.count_phrase("Ocean"), 3);
        assert_eq!(stats.count_phrase("tide"), 0);
    }

    #[test]
    fn test_syllables() {
        assert_eq!(syllables("the"), 1);
        assert_eq!(syllables("water"), 2);
        assert_eq!(syllables("make"), 1);
        assert_eq!(syllables("table"), 2);
        assert_eq!(syllables("beautiful"), 3);
        assert_eq!(syllables("2024"), 1);
    }

    #[test]
    fn test_heading_requires_space() {
        assert!(parse_heading("#hashtag").is_none());
        assert!(parse_heading("####### too deep").is_none());
        assert_eq!(parse_heading("### Three ###").unwrap().text, "Three");
    }
}
