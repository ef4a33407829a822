use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

/// Cancellation tokens for jobs that are processing, by job id.
///
/// Only the executor creates entries. A cancel that lands before the token
/// exists is carried by the job's `cancel_requested` flag, which the
/// executor reads after taking the token.
#[derive(Default)]
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        match self.tokens.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Cancellation registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn token_for(&self, job_id: &str) -> CancellationToken {
        self.lock().entry(job_id.to_string()).or_default().clone()
    }

    /// Cancels the job's token if one exists. Returns whether it did.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.lock().get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, job_id: &str) {
        self.lock().remove(job_id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
