//! Domain authority lookups.

use std::collections::HashMap;
use std::time::Duration;

use moka::sync::Cache;

/// Maps a domain to an authority rank (0..=1000, higher is more trusted).
pub trait AuthorityLookup: Send + Sync {
    fn authority(&self, domain: &str) -> Option<u16>;
}

/// Built-in table of well-known domains plus suffix defaults for
/// government and academic hosts.
pub struct StaticAuthorityTable {
    entries: HashMap<String, u16>,
    suffixes: Vec<(String, u16)>,
}

const KNOWN_DOMAINS: &[(&str, u16)] = &[
    ("wikipedia.org", 95),
    ("nih.gov", 94),
    ("nytimes.com", 94),
    ("who.int", 93),
    ("cdc.gov", 93),
    ("harvard.edu", 93),
    ("reuters.com", 93),
    ("gov.uk", 93),
    ("bbc.co.uk", 92),
    ("nature.com", 92),
    ("theguardian.com", 92),
    ("mit.edu", 92),
    ("stanford.edu", 92),
    ("sciencedirect.com", 90),
    ("mayoclinic.org", 90),
    ("forbes.com", 88),
    ("britannica.com", 88),
    ("github.com", 86),
    ("statista.com", 85),
    ("investopedia.com", 84),
    ("healthline.com", 82),
    ("medium.com", 60),
    ("quora.com", 55),
    ("reddit.com", 50),
];

const SUFFIX_DEFAULTS: &[(&str, u16)] = &[
    (".gov", 85),
    (".mil", 80),
    (".edu", 80),
    (".ac.uk", 80),
    (".int", 75),
];

impl Default for StaticAuthorityTable {
    fn default() -> Self {
        Self {
            entries: KNOWN_DOMAINS
                .iter()
                .map(|(d, r)| (d.to_string(), *r))
                .collect(),
            suffixes: SUFFIX_DEFAULTS
                .iter()
                .map(|(s, r)| (s.to_string(), *r))
                .collect(),
        }
    }
}

impl StaticAuthorityTable {
    /// A table with no entries at all.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            suffixes: Vec::new(),
        }
    }

    pub fn with_entry(mut self, domain: &str, rank: u16) -> Self {
        self.entries.insert(domain.to_ascii_lowercase(), rank.min(1000));
        self
    }
}

impl AuthorityLookup for StaticAuthorityTable {
    fn authority(&self, domain: &str) -> Option<u16> {
        // Exact match first, then parent domains (news.bbc.co.uk -> bbc.co.uk).
        let mut candidate = domain;
        loop {
            if let Some(rank) = self.entries.get(candidate) {
                return Some(*rank);
            }
            match candidate.find('.') {
                Some(i) if candidate[i + 1..].contains('.') => candidate = &candidate[i + 1..],
                _ => break,
            }
        }

        self.suffixes
            .iter()
            .find(|(suffix, _)| domain.ends_with(suffix.as_str()))
            .map(|(_, rank)| *rank)
    }
}

/// Caches another lookup's answers (including misses) for a TTL.
pub struct CachedAuthority<L> {
    inner: L,
    cache: Cache<String, Option<u16>>,
}

impl<L: AuthorityLookup> CachedAuthority<L> {
    pub fn new(inner: L, ttl: Duration, capacity: u64) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }
}

impl<L: AuthorityLookup> AuthorityLookup for CachedAuthority<L> {
    fn authority(&self, domain: &str) -> Option<u16> {
        if let Some(rank) = self.cache.get(domain) {
            return rank;
        }
        let rank = self.inner.authority(domain);
        self.cache.insert(domain.to_string(), rank);
        rank
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_exact_and_parent_domain_lookup() {
        let table = StaticAuthorityTable::default();
        assert_eq!(table.authority("wikipedia.org"), Some(95));
        assert_eq!(table.authority("en.wikipedia.org"), Some(95));
        assert_eq!(table.authority("news.bbc.co.uk"), Some(92));
    }

    #[test]
    fn test_suffix_defaults() {
        let table = StaticAuthorityTable::default();
        assert_eq!(table.authority("energy.gov"), Some(85));
        assert_eq!(table.authority("cs.ox.ac.uk"), Some(80));
        assert_eq!(table.authority("someblog.net"), None);
    }

    #[test]
    fn test_with_entry_clamps_rank() {
        let table = StaticAuthorityTable::empty().with_entry("Example.com", 5000);
        assert_eq!(table.authority("example.com"), Some(1000));
    }

    struct CountingLookup(AtomicUsize);

    impl AuthorityLookup for CountingLookup {
        fn authority(&self, _domain: &str) -> Option<u16> {
            self.0.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    #[test]
    fn test_cache_remembers_misses() {
        let cached = CachedAuthority::new(
            CountingLookup(AtomicUsize::new(0)),
            Duration::from_secs(60),
            100,
        );
        assert_eq!(cached.authority("unknown.net"), None);
        assert_eq!(cached.authority("unknown.net"), None);
        assert_eq!(cached.inner.0.load(Ordering::SeqCst), 1);
    }
}
