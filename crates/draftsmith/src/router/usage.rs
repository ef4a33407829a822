use serde::{Deserialize, Serialize};

/// Tokens and cost of one successful provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub provider_id: String,
    pub model_id: String,
    pub purpose: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

impl UsageRecord {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}
