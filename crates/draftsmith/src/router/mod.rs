//! Provider fallback router.
//!
//! Tries enabled providers in ascending priority. Transient errors are
//! retried with exponential backoff on the same provider; terminal errors move
//! straight to the next one. Callers only ever see [`RouterError`].

pub mod consensus;
pub mod error;
pub mod retry;
pub mod usage;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::provider::{
    GenerationOutput, GenerationRequest, ProviderEntry, ProviderError, ProviderSnapshot,
};

pub use consensus::{ConsensusSettings, ConsensusSummary};
pub use error::{ProviderFailure, RouterError};
pub use retry::RetryPolicy;
pub use usage::UsageRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct RouterSettings {
    pub retry: RetryPolicy,
    /// Upper bound for a single provider call.
    pub call_timeout: Duration,
    pub consensus: ConsensusSettings,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            call_timeout: Duration::from_secs(120),
            consensus: ConsensusSettings::default(),
        }
    }
}

impl RouterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: RetryPolicy {
                max_retries: config.router.max_retries,
                initial_backoff: Duration::from_millis(config.router.initial_backoff_ms),
                max_backoff: Duration::from_millis(config.router.max_backoff_ms),
                multiplier: config.router.backoff_multiplier,
            },
            call_timeout: Duration::from_secs(config.router.call_timeout_secs),
            consensus: ConsensusSettings {
                top_k: config.consensus.top_k,
                timeout: Duration::from_secs(config.consensus.timeout_secs),
            },
        }
    }
}

/// Text produced by a routed call, with everything it took to get it.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedGeneration {
    pub text: String,
    pub provider_id: String,
    pub model_id: String,
    /// Attempts across every provider tried.
    pub attempts: u32,
    pub usage: Vec<UsageRecord>,
    /// Providers given up on before the one that answered.
    pub failures: Vec<ProviderFailure>,
    pub consensus: Option<ConsensusSummary>,
}

impl RoutedGeneration {
    pub fn total_tokens(&self) -> u64 {
        self.usage.iter().map(|u| u64::from(u.total_tokens())).sum()
    }

    pub fn total_cost(&self) -> f64 {
        self.usage.iter().map(|u| u.cost_usd).sum()
    }
}

pub(crate) struct ProviderSuccess {
    pub output: GenerationOutput,
    pub attempts: u32,
    pub usage: UsageRecord,
}

pub(crate) enum ProviderOutcome {
    Success(ProviderSuccess),
    Failed(ProviderFailure),
}

/// Routes generation calls for one job over a fixed provider snapshot.
pub struct Router {
    snapshot: Arc<ProviderSnapshot>,
    settings: RouterSettings,
    deadline: Option<Instant>,
}

impl Router {
    pub fn new(snapshot: Arc<ProviderSnapshot>, settings: RouterSettings) -> Self {
        Self {
            snapshot,
            settings,
            deadline: None,
        }
    }

    /// No calls are issued once `deadline` has passed.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn snapshot(&self) -> &ProviderSnapshot {
        &self.snapshot
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// Generates text with the first provider that succeeds.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<RoutedGeneration, RouterError> {
        let mut failures: Vec<ProviderFailure> = Vec::new();
        let mut attempts = 0;
        let mut tried_any = false;

        for entry in self.snapshot.enabled() {
            tried_any = true;
            match self.call_with_retry(entry, request).await? {
                ProviderOutcome::Success(success) => {
                    attempts += success.attempts;
                    if !failures.is_empty() {
                        info!(
                            purpose = %request.purpose,
                            provider = %entry.config.provider_id,
                            skipped = failures.len(),
                            "Request served by fallback provider"
                        );
                    }
                    return Ok(RoutedGeneration {
                        text: success.output.text,
                        provider_id: entry.config.provider_id.clone(),
                        model_id: entry.config.model_id.clone(),
                        attempts,
                        usage: vec![success.usage],
                        failures,
                        consensus: None,
                    });
                }
                ProviderOutcome::Failed(failure) => {
                    attempts += failure.attempts;
                    warn!(
                        purpose = %request.purpose,
                        provider = %failure.provider_id,
                        error = %failure.error,
                        "Provider failed, falling over"
                    );
                    failures.push(failure);
                }
            }
        }

        if !tried_any {
            return Err(RouterError::NoProvidersAvailable);
        }
        // A chain cut short by the job deadline is a timeout, not exhaustion.
        self.remaining()?;
        Err(RouterError::AllProvidersFailed { chain: failures })
    }

    /// Time left before the deadline. `Ok(None)` means no deadline.
    pub(crate) fn remaining(&self) -> Result<Option<Duration>, RouterError> {
        match self.deadline {
            None => Ok(None),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    Err(RouterError::DeadlineExceeded)
                } else {
                    Ok(Some(deadline - now))
                }
            }
        }
    }

    /// Calls one provider, retrying transient failures. Only a passed
    /// deadline is returned as `Err`.
    pub(crate) async fn call_with_retry(
        &self,
        entry: &ProviderEntry,
        request: &GenerationRequest,
    ) -> Result<ProviderOutcome, RouterError> {
        let policy = self.settings.retry;
        let mut retry = 0;

        loop {
            let timeout = match self.remaining()? {
                Some(left) => left.min(self.settings.call_timeout),
                None => self.settings.call_timeout,
            };

            let started = Instant::now();
            let result = match tokio::time::timeout(
                timeout,
                entry.provider.generate(request, &entry.config.model_id),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::timeout(format!(
                    "no response within {}ms",
                    timeout.as_millis()
                ))),
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    debug!(
                        purpose = %request.purpose,
                        provider = %entry.config.provider_id,
                        attempt = retry + 1,
                        latency_ms,
                        "Provider call succeeded"
                    );
                    let usage = UsageRecord {
                        provider_id: entry.config.provider_id.clone(),
                        model_id: entry.config.model_id.clone(),
                        purpose: request.purpose.clone(),
                        prompt_tokens: output.usage.prompt_tokens,
                        completion_tokens: output.usage.completion_tokens,
                        cost_usd: output.cost_usd,
                        latency_ms,
                    };
                    return Ok(ProviderOutcome::Success(ProviderSuccess {
                        output,
                        attempts: retry + 1,
                        usage,
                    }));
                }
                Err(error) if error.is_transient() && retry < policy.max_retries => {
                    let delay = policy.backoff_for(retry);
                    warn!(
                        purpose = %request.purpose,
                        provider = %entry.config.provider_id,
                        attempt = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient provider error, retrying"
                    );
                    let delay = match self.remaining()? {
                        Some(left) => delay.min(left),
                        None => delay,
                    };
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(error) => {
                    return Ok(ProviderOutcome::Failed(ProviderFailure {
                        provider_id: entry.config.provider_id.clone(),
                        model_id: entry.config.model_id.clone(),
                        attempts: retry + 1,
                        error,
                    }));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{GenerationProvider, ProviderConfig, ScriptedProvider};

    fn snapshot(providers: Vec<(Arc<ScriptedProvider>, u32)>) -> Arc<ProviderSnapshot> {
        let entries = providers
            .into_iter()
            .map(|(p, priority)| {
                let id = p.provider_id().to_string();
                ProviderEntry {
                    config: ProviderConfig::new(&id, priority, &format!("{}-model", id)),
                    provider: p as Arc<dyn GenerationProvider>,
                }
            })
            .collect();
        Arc::new(ProviderSnapshot::from_entries(1, entries))
    }

    fn settings(max_retries: u32) -> RouterSettings {
        RouterSettings {
            retry: RetryPolicy::immediate(max_retries),
            call_timeout: Duration::from_secs(5),
            consensus: ConsensusSettings::default(),
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("draft_generation", "write something")
    }

    #[tokio::test]
    async fn test_transient_failures_retried_on_same_provider() {
        let a = Arc::new(ScriptedProvider::new("a").fail_transient(2).push_ok("from a"));
        let b = Arc::new(ScriptedProvider::new("b").push_ok("from b"));
        let router = Router::new(snapshot(vec![(a.clone(), 1), (b.clone(), 2)]), settings(3));

        let routed = router.generate(&request()).await.unwrap();

        assert_eq!(routed.text, "from a");
        assert_eq!(routed.provider_id, "a");
        assert_eq!(routed.attempts, 3);
        assert_eq!(a.calls(), 3);
        assert_eq!(b.calls(), 0);
        assert!(routed.failures.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_error_falls_over_without_retry() {
        let a = Arc::new(
            ScriptedProvider::new("a").push_err(ProviderError::terminal("invalid request")),
        );
        let b = Arc::new(ScriptedProvider::new("b").push_ok("from b"));
        let router = Router::new(snapshot(vec![(a.clone(), 1), (b.clone(), 2)]), settings(3));

        let routed = router.generate(&request()).await.unwrap();

        assert_eq!(routed.text, "from b");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
        assert_eq!(routed.failures.len(), 1);
        assert_eq!(routed.failures[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_move_to_next_provider() {
        let a = Arc::new(ScriptedProvider::new("a").fail_transient(5));
        let b = Arc::new(ScriptedProvider::new("b").push_ok("from b"));
        let router = Router::new(snapshot(vec![(a.clone(), 1), (b.clone(), 2)]), settings(2));

        let routed = router.generate(&request()).await.unwrap();

        assert_eq!(routed.provider_id, "b");
        assert_eq!(a.calls(), 3);
        assert_eq!(routed.attempts, 4);
    }

    #[tokio::test]
    async fn test_all_providers_failed_carries_chain() {
        let a = Arc::new(ScriptedProvider::new("a").push_err(ProviderError::terminal("bad")));
        let b = Arc::new(ScriptedProvider::new("b").fail_transient(2));
        let router = Router::new(snapshot(vec![(a, 1), (b, 2)]), settings(1));

        let err = router.generate(&request()).await.unwrap_err();

        match err {
            RouterError::AllProvidersFailed { chain } => {
                assert_eq!(chain.len(), 2);
                assert_eq!(chain[0].provider_id, "a");
                assert!(!chain[0].error.is_transient());
                assert_eq!(chain[1].provider_id, "b");
                assert_eq!(chain[1].attempts, 2);
                assert!(chain[1].error.is_transient());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_enabled_providers() {
        let a = Arc::new(ScriptedProvider::new("a"));
        let entries = vec![ProviderEntry {
            config: ProviderConfig::new("a", 1, "m").disabled(),
            provider: a.clone() as Arc<dyn GenerationProvider>,
        }];
        let router = Router::new(Arc::new(ProviderSnapshot::from_entries(1, entries)), settings(1));

        let err = router.generate(&request()).await.unwrap_err();
        assert_eq!(err, RouterError::NoProvidersAvailable);
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn test_call_timeout_is_transient() {
        let slow = Arc::new(
            ScriptedProvider::new("slow").with_latency(Duration::from_millis(200)),
        );
        let fast = Arc::new(ScriptedProvider::new("fast").push_ok("quick"));
        let mut s = settings(0);
        s.call_timeout = Duration::from_millis(20);
        let router = Router::new(snapshot(vec![(slow.clone(), 1), (fast, 2)]), s);

        let routed = router.generate(&request()).await.unwrap();
        assert_eq!(routed.text, "quick");
        assert!(routed.failures[0].error.is_transient());
    }

    #[tokio::test]
    async fn test_passed_deadline_issues_no_calls() {
        let a = Arc::new(ScriptedProvider::new("a").push_ok("never"));
        let router = Router::new(snapshot(vec![(a.clone(), 1)]), settings(1))
            .with_deadline(Instant::now() - Duration::from_millis(1));

        let err = router.generate(&request()).await.unwrap_err();
        assert_eq!(err, RouterError::DeadlineExceeded);
        assert_eq!(a.calls(), 0);
    }

    #[tokio::test]
    async fn test_usage_recorded_for_successful_call() {
        let a = Arc::new(ScriptedProvider::new("a").push_ok("three word answer"));
        let router = Router::new(snapshot(vec![(a, 1)]), settings(0));

        let routed = router.generate(&request()).await.unwrap();
        assert_eq!(routed.usage.len(), 1);
        assert_eq!(routed.usage[0].completion_tokens, 3);
        assert_eq!(routed.usage[0].purpose, "draft_generation");
        assert_eq!(routed.total_tokens(), 5);
    }
}
