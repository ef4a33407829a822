//! URL helpers for citation sources.

/// Returns the registrable host of `url`, lowercased and without `www.`.
///
/// - `https://www.Example.com/a?b` → `example.com`
/// - `http://user@host.org:8080/` → `host.org`
/// - `not a url` → `None`
pub fn resolve_domain(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let without_scheme = match trimmed.find("://") {
        Some(i) => &trimmed[i + 3..],
        None => trimmed,
    };
    let authority = without_scheme.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;
    let host = host.split(':').next()?;
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    if host.is_empty() || !host.contains('.') || host.contains(char::is_whitespace) {
        return None;
    }
    Some(host.to_string())
}

/// Canonical form used to detect the same source listed twice.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);
    let without_scheme = match without_fragment.find("://") {
        Some(i) => &without_fragment[i + 3..],
        None => without_fragment,
    };
    let (host, path) = match without_scheme.find('/') {
        Some(i) => (&without_scheme[..i], &without_scheme[i..]),
        None => (without_scheme, ""),
    };
    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    format!("{}{}", host, path.trim_end_matches('/'))
}
