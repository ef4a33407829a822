//! Multi-dimensional quality verdict for generated content.
//!
//! Seven dimensions are scored 0-100 from the text and its citations, then
//! combined into a weighted composite. Each dimension also has a hard floor:
//! one violation fails the threshold regardless of the composite.

pub mod readability;
pub mod report;
pub mod scorer;
pub mod text;

pub use report::{Dimension, QualityIssue, QualityMetrics, QualityReport, Recommendation, Severity};
pub use scorer::{QualityScorer, ScoringContext};
pub use text::TextStats;
