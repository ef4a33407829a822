//! In-process port implementations for tests and local experiments.
//!
//! `ScriptedProvider` replays a queue of outcomes and then falls back to a
//! responder closure; `StaticContentSource` returns a fixed research bundle.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{
    ContentSource, GenerationOutput, GenerationProvider, GenerationRequest, ProviderError,
    ResearchBundle, SourceError, TokenUsage,
};

type Responder = dyn Fn(&GenerationRequest) -> Result<String, ProviderError> + Send + Sync;

/// Holds a call open until the test releases it.
#[derive(Clone, Default)]
pub struct CallGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl CallGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves once a gated call has started.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Lets the gated call finish.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

pub struct ScriptedProvider {
    id: String,
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    responder: Option<Box<Responder>>,
    latency: Duration,
    gates: HashMap<String, CallGate>,
    cost_per_1k_tokens: f64,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            script: Mutex::new(VecDeque::new()),
            responder: None,
            latency: Duration::ZERO,
            gates: HashMap::new(),
            cost_per_1k_tokens: 0.002,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queues a successful response.
    pub fn push_ok(self, text: &str) -> Self {
        lock(&self.script).push_back(Ok(text.to_string()));
        self
    }

    /// Queues a failure.
    pub fn push_err(self, error: ProviderError) -> Self {
        lock(&self.script).push_back(Err(error));
        self
    }

    /// Queues `count` transient server errors.
    pub fn fail_transient(self, count: usize) -> Self {
        {
            let mut script = lock(&self.script);
            for i in 0..count {
                script.push_back(Err(ProviderError::server(format!("scripted failure {}", i + 1))));
            }
        }
        self
    }

    /// Answers every call not covered by the script.
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&GenerationRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_cost_per_1k_tokens(mut self, cost: f64) -> Self {
        self.cost_per_1k_tokens = cost;
        self
    }

    /// Holds calls whose purpose equals `purpose` until the gate is released.
    pub fn gate_purpose(mut self, purpose: &str, gate: CallGate) -> Self {
        self.gates.insert(purpose.to_string(), gate);
        self
    }

    pub fn calls(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn calls_for(&self, purpose: &str) -> usize {
        lock(&self.calls).iter().filter(|p| *p == purpose).count()
    }

    /// Purposes of all calls received, in order.
    pub fn purposes(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn next_outcome(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        if let Some(outcome) = lock(&self.script).pop_front() {
            return outcome;
        }
        match &self.responder {
            Some(responder) => responder(request),
            None => Ok(format!("{} output from {}", request.purpose, self.id)),
        }
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        _model_id: &str,
    ) -> Result<GenerationOutput, ProviderError> {
        lock(&self.calls).push(request.purpose.clone());

        if let Some(gate) = self.gates.get(&request.purpose) {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let text = self.next_outcome(request)?;
        let usage = TokenUsage::new(word_count(&request.prompt), word_count(&text));
        let cost_usd = f64::from(usage.total()) / 1000.0 * self.cost_per_1k_tokens;

        Ok(GenerationOutput {
            text,
            usage,
            cost_usd,
        })
    }
}

/// Content source returning a fixed bundle (or a fixed failure).
pub struct StaticContentSource {
    outcome: Result<ResearchBundle, SourceError>,
    latency: Duration,
    calls: AtomicUsize,
}

impl StaticContentSource {
    pub fn new(bundle: ResearchBundle) -> Self {
        Self {
            outcome: Ok(bundle),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable(reason: &str) -> Self {
        Self {
            outcome: Err(SourceError::Unavailable(reason.to_string())),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Delays every answer; a long latency stands in for a hung source.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for StaticContentSource {
    async fn fetch_research(
        &self,
        _topic: &str,
        _keywords: &[String],
    ) -> Result<ResearchBundle, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.outcome.clone()
    }
}

fn word_count(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_responder() {
        let provider = ScriptedProvider::new("p")
            .push_err(ProviderError::terminal("nope"))
            .push_ok("scripted")
            .with_responder(|req| Ok(format!("echo {}", req.prompt)));

        let req = GenerationRequest::new("draft_generation", "hello world");
        assert!(provider.generate(&req, "m").await.is_err());
        assert_eq!(provider.generate(&req, "m").await.unwrap().text, "scripted");
        assert_eq!(
            provider.generate(&req, "m").await.unwrap().text,
            "echo hello world"
        );
        assert_eq!(provider.calls(), 3);
        assert_eq!(provider.calls_for("draft_generation"), 3);
    }

    #[tokio::test]
    async fn test_usage_and_cost_are_reported() {
        let provider = ScriptedProvider::new("p")
            .push_ok("one two three")
            .with_cost_per_1k_tokens(1.0);
        let req = GenerationRequest::new("x", "a b");
        let out = provider.generate(&req, "m").await.unwrap();
        assert_eq!(out.usage, TokenUsage::new(2, 3));
        assert!((out.cost_usd - 0.005).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_static_source_counts_calls() {
        let source = StaticContentSource::unavailable("offline");
        assert!(source.fetch_research("t", &[]).await.is_err());
        assert_eq!(source.calls(), 1);
    }
}
