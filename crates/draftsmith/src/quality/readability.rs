use super::text::TextStats;
use crate::config::ReadabilityBand;

/// Flesch reading ease. Empty text scores 0.
pub fn flesch_reading_ease(stats: &TextStats) -> f64 {
    let words = stats.word_count();
    if words == 0 || stats.sentence_count == 0 {
        return 0.0;
    }
    let words_per_sentence = words as f64 / stats.sentence_count as f64;
    let syllables_per_word = stats.syllable_count as f64 / words as f64;
    206.835 - 1.015 * words_per_sentence - 84.6 * syllables_per_word
}

/// 100 inside the band, minus 2.5 per point outside it.
pub fn band_score(ease: f64, band: &ReadabilityBand) -> f64 {
    let distance = if ease < band.min {
        band.min - ease
    } else if ease > band.max {
        ease - band.max
    } else {
        0.0
    };
    (100.0 - 2.5 * distance).clamp(0.0, 100.0)
}
