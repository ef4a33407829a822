use std::fmt;

use thiserror::Error;

use crate::provider::ProviderError;

/// The last error one provider produced before the router gave up on it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider_id: String,
    pub model_id: String,
    pub attempts: u32,
    pub error: ProviderError,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) after {} attempt(s): {}",
            self.provider_id, self.model_id, self.attempts, self.error
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouterError {
    #[error("all providers failed: {}", format_chain(.chain))]
    AllProvidersFailed { chain: Vec<ProviderFailure> },

    #[error("no enabled providers are configured")]
    NoProvidersAvailable,

    #[error("job deadline exceeded; no further provider calls issued")]
    DeadlineExceeded,
}

fn format_chain(chain: &[ProviderFailure]) -> String {
    chain
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
