//! Consensus generation: the same request to several providers at once,
//! merged by a synthesis call.

use std::fmt::Write;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{
    ProviderFailure, ProviderOutcome, ProviderSuccess, RoutedGeneration, Router, RouterError,
};
use crate::provider::{GenerationRequest, ProviderEntry, ProviderError};

#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusSettings {
    /// How many of the highest-priority enabled providers take part.
    pub top_k: usize,
    /// Wall-clock limit for the parallel phase.
    pub timeout: Duration,
}

impl Default for ConsensusSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            timeout: Duration::from_secs(180),
        }
    }
}

/// How a consensus result came about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusSummary {
    pub participants: Vec<String>,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    /// True when the output is a synthesis of several answers.
    pub synthesized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

const SYNTHESIS_SYSTEM: &str = "You merge several independent drafts of the same piece into one. \
Keep every point the drafts agree on. Where they contradict each other and the conflict cannot \
be settled from the drafts themselves, keep the most conservative statement and mark it with \
[UNRESOLVED: short description]. Do not add new facts.";

impl Router {
    /// Runs `request` on the top-K providers in parallel and synthesizes the
    /// successful answers. One success is returned as-is.
    pub async fn generate_consensus(
        &self,
        request: &GenerationRequest,
    ) -> Result<RoutedGeneration, RouterError> {
        let participants: Vec<&ProviderEntry> = self
            .snapshot
            .enabled()
            .take(self.settings.consensus.top_k.max(1))
            .collect();
        if participants.is_empty() {
            return Err(RouterError::NoProvidersAvailable);
        }

        let timeout = match self.remaining()? {
            Some(left) => left.min(self.settings.consensus.timeout),
            None => self.settings.consensus.timeout,
        };

        let calls = participants.iter().map(|entry| async move {
            let outcome = tokio::time::timeout(timeout, self.call_with_retry(entry, request)).await;
            (*entry, outcome)
        });
        let results = join_all(calls).await;

        let mut successes: Vec<(&ProviderEntry, ProviderSuccess)> = Vec::new();
        let mut failures: Vec<ProviderFailure> = Vec::new();
        let mut attempts = 0;

        for (entry, outcome) in results {
            match outcome {
                Ok(Ok(ProviderOutcome::Success(success))) => {
                    attempts += success.attempts;
                    successes.push((entry, success));
                }
                Ok(Ok(ProviderOutcome::Failed(failure))) => {
                    attempts += failure.attempts;
                    failures.push(failure);
                }
                Ok(Err(RouterError::DeadlineExceeded)) | Err(_) => {
                    attempts += 1;
                    failures.push(ProviderFailure {
                        provider_id: entry.config.provider_id.clone(),
                        model_id: entry.config.model_id.clone(),
                        attempts: 1,
                        error: ProviderError::timeout(format!(
                            "no consensus answer within {}ms",
                            timeout.as_millis()
                        )),
                    });
                }
                Ok(Err(other)) => return Err(other),
            }
        }

        let mut summary = ConsensusSummary {
            participants: participants
                .iter()
                .map(|e| e.config.provider_id.clone())
                .collect(),
            succeeded: successes
                .iter()
                .map(|(e, _)| e.config.provider_id.clone())
                .collect(),
            failed: failures.iter().map(|f| f.provider_id.clone()).collect(),
            synthesized: false,
            note: None,
        };

        if successes.is_empty() {
            return Err(RouterError::AllProvidersFailed { chain: failures });
        }

        let mut usage: Vec<_> = successes.iter().map(|(_, s)| s.usage.clone()).collect();

        if successes.len() == 1 {
            let (entry, success) = successes.remove(0);
            summary.note = Some("only one provider answered; synthesis skipped".to_string());
            info!(
                purpose = %request.purpose,
                provider = %entry.config.provider_id,
                "Consensus fell back to single output"
            );
            return Ok(RoutedGeneration {
                text: success.output.text,
                provider_id: entry.config.provider_id.clone(),
                model_id: entry.config.model_id.clone(),
                attempts,
                usage,
                failures,
                consensus: Some(summary),
            });
        }

        let synthesis = GenerationRequest::new(
            format!("{}:synthesis", request.purpose),
            synthesis_prompt(request, &successes),
        )
        .with_system(SYNTHESIS_SYSTEM)
        .with_max_tokens(request.max_tokens)
        .with_temperature(0.2);

        match self.generate(&synthesis).await {
            Ok(merged) => {
                usage.extend(merged.usage);
                summary.synthesized = true;
                info!(
                    purpose = %request.purpose,
                    sources = successes.len(),
                    "Consensus synthesized"
                );
                Ok(RoutedGeneration {
                    text: merged.text,
                    provider_id: merged.provider_id,
                    model_id: merged.model_id,
                    attempts: attempts + merged.attempts,
                    usage,
                    failures,
                    consensus: Some(summary),
                })
            }
            Err(error) => {
                warn!(
                    purpose = %request.purpose,
                    error = %error,
                    "Consensus synthesis failed, using highest-priority answer"
                );
                let (entry, success) = successes.remove(0);
                summary.note = Some(format!("synthesis failed: {}", error));
                Ok(RoutedGeneration {
                    text: success.output.text,
                    provider_id: entry.config.provider_id.clone(),
                    model_id: entry.config.model_id.clone(),
                    attempts,
                    usage,
                    failures,
                    consensus: Some(summary),
                })
            }
        }
    }
}

fn synthesis_prompt(
    request: &GenerationRequest,
    successes: &[(&ProviderEntry, ProviderSuccess)],
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Original task:\n{}\n", request.prompt);
    for (i, (_, success)) in successes.iter().enumerate() {
        let _ = writeln!(prompt, "=== Draft {} ===\n{}\n", i + 1, success.output.text.trim());
    }
    prompt.push_str("Write the merged version now.");
    prompt
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::provider::{GenerationProvider, ProviderConfig, ProviderSnapshot, ScriptedProvider};
    use crate::router::{RetryPolicy, RouterSettings};

    fn router(providers: Vec<Arc<ScriptedProvider>>, timeout: Duration) -> Router {
        let entries = providers
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                let id = p.provider_id().to_string();
                ProviderEntry {
                    config: ProviderConfig::new(&id, i as u32, "model"),
                    provider: p as Arc<dyn GenerationProvider>,
                }
            })
            .collect();
        Router::new(
            Arc::new(ProviderSnapshot::from_entries(1, entries)),
            RouterSettings {
                retry: RetryPolicy::immediate(0),
                call_timeout: Duration::from_secs(10),
                consensus: ConsensusSettings { top_k: 3, timeout },
            },
        )
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("draft_generation", "Write about tides")
    }

    #[tokio::test]
    async fn test_two_of_three_succeed_then_synthesize() {
        let a = Arc::new(ScriptedProvider::new("a").with_responder(|req| {
            if req.purpose.ends_with(":synthesis") {
                Ok("merged draft".to_string())
            } else {
                Ok("draft from a".to_string())
            }
        }));
        let b = Arc::new(ScriptedProvider::new("b").push_ok("draft from b"));
        let c = Arc::new(ScriptedProvider::new("c").with_latency(Duration::from_secs(10)));

        let router = router(vec![a.clone(), b.clone(), c.clone()], Duration::from_millis(200));
        let routed = router.generate_consensus(&request()).await.unwrap();

        assert_eq!(routed.text, "merged draft");
        let summary = routed.consensus.unwrap();
        assert!(summary.synthesized);
        assert_eq!(summary.succeeded, vec!["a", "b"]);
        assert_eq!(summary.failed, vec!["c"]);
        assert_eq!(a.calls_for("draft_generation:synthesis"), 1);
        assert_eq!(routed.usage.len(), 3);
    }

    #[tokio::test]
    async fn test_single_success_returned_without_synthesis() {
        let a = Arc::new(ScriptedProvider::new("a").push_err(ProviderError::terminal("refused")));
        let b = Arc::new(ScriptedProvider::new("b").push_ok("only b"));

        let router = router(vec![a.clone(), b.clone()], Duration::from_secs(1));
        let routed = router.generate_consensus(&request()).await.unwrap();

        assert_eq!(routed.text, "only b");
        assert!(!routed.consensus.unwrap().synthesized);
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[tokio::test]
    async fn test_no_success_is_all_providers_failed() {
        let a = Arc::new(ScriptedProvider::new("a").push_err(ProviderError::terminal("x")));
        let b = Arc::new(ScriptedProvider::new("b").push_err(ProviderError::terminal("y")));

        let router = router(vec![a, b], Duration::from_secs(1));
        let err = router.generate_consensus(&request()).await.unwrap_err();
        assert!(matches!(err, RouterError::AllProvidersFailed { chain } if chain.len() == 2));
    }

    #[tokio::test]
    async fn test_synthesis_failure_degrades_to_first_answer() {
        let a = Arc::new(
            ScriptedProvider::new("a")
                .push_ok("draft from a")
                .push_err(ProviderError::terminal("synthesis refused")),
        );
        let b = Arc::new(
            ScriptedProvider::new("b")
                .push_ok("draft from b")
                .push_err(ProviderError::terminal("synthesis refused")),
        );

        let router = router(vec![a, b], Duration::from_secs(1));
        let routed = router.generate_consensus(&request()).await.unwrap();

        assert_eq!(routed.text, "draft from a");
        let summary = routed.consensus.unwrap();
        assert!(!summary.synthesized);
        assert!(summary.note.unwrap().starts_with("synthesis failed"));
    }
}
