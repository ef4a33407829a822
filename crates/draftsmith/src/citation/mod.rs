//! Source ranking and inline citation markers.

pub mod authority;
pub mod domain;
pub mod ranker;

pub use authority::{AuthorityLookup, CachedAuthority, StaticAuthorityTable};
pub use domain::{normalize_url, resolve_domain};
pub use ranker::{integrate, Citation, CitationRanker, RankingOptions};
