//! Keeps prompts, generated text and URLs short in log fields.

/// First `max_chars` characters of `text` on one line, with an ellipsis
/// when cut.
pub fn summarize(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut cut: String = flat.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

/// Drops credentials, query string and fragment from a URL.
pub fn redact_url(url: &str) -> String {
    let trimmed = url.trim();
    let (scheme, rest) = match trimmed.find("://") {
        Some(i) => (&trimmed[..i + 3], &trimmed[i + 3..]),
        None => ("", trimmed),
    };
    let rest = rest.split(['?', '#']).next().unwrap_or(rest);
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    let host = authority.rsplit('@').next().unwrap_or(authority);
    format!("{}{}{}", scheme, host, path)
}
