//! Provider configuration snapshots.
//!
//! A job captures the snapshot current at its start and keeps it for its
//! whole run. `reload` builds a new snapshot; jobs already running never see it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::GenerationProvider;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider_id: String,
    /// Lower values are tried first.
    #[serde(default)]
    pub priority: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub model_id: String,
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    pub fn new(provider_id: &str, priority: u32, model_id: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            priority,
            enabled: true,
            model_id: model_id.to_string(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A configured provider paired with its implementation.
#[derive(Clone)]
pub struct ProviderEntry {
    pub config: ProviderConfig,
    pub provider: Arc<dyn GenerationProvider>,
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Immutable, priority-ordered provider list.
#[derive(Debug)]
pub struct ProviderSnapshot {
    version: u64,
    entries: Vec<ProviderEntry>,
}

impl ProviderSnapshot {
    /// Builds a snapshot, ordering entries by (priority, provider_id).
    pub fn from_entries(version: u64, mut entries: Vec<ProviderEntry>) -> Self {
        entries.sort_by(|a, b| {
            a.config
                .priority
                .cmp(&b.config.priority)
                .then_with(|| a.config.provider_id.cmp(&b.config.provider_id))
        });
        Self { version, entries }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entries(&self) -> &[ProviderEntry] {
        &self.entries
    }

    /// Enabled entries in ascending priority.
    pub fn enabled(&self) -> impl Iterator<Item = &ProviderEntry> {
        self.entries.iter().filter(|e| e.config.enabled)
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled().count()
    }
}

/// Holds the registered implementations and the current snapshot.
pub struct ProviderRegistry {
    implementations: HashMap<String, Arc<dyn GenerationProvider>>,
    current: RwLock<Arc<ProviderSnapshot>>,
}

impl ProviderRegistry {
    pub fn new(
        implementations: Vec<Arc<dyn GenerationProvider>>,
        configs: Vec<ProviderConfig>,
    ) -> Result<Self, ConfigError> {
        let implementations: HashMap<String, Arc<dyn GenerationProvider>> = implementations
            .into_iter()
            .map(|p| (p.provider_id().to_string(), p))
            .collect();

        let snapshot = build_snapshot(&implementations, 1, configs)?;

        Ok(Self {
            implementations,
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Returns the snapshot new jobs should use.
    pub fn snapshot(&self) -> Arc<ProviderSnapshot> {
        let guard = match self.current.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Provider registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        Arc::clone(&guard)
    }

    /// Replaces the provider configuration for jobs started from now on.
    /// Returns the new snapshot version.
    pub fn reload(&self, configs: Vec<ProviderConfig>) -> Result<u64, ConfigError> {
        let mut guard = match self.current.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Provider registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        let version = guard.version() + 1;
        let snapshot = build_snapshot(&self.implementations, version, configs)?;
        *guard = Arc::new(snapshot);
        tracing::info!(version, "Provider configuration reloaded");
        Ok(version)
    }
}

fn build_snapshot(
    implementations: &HashMap<String, Arc<dyn GenerationProvider>>,
    version: u64,
    configs: Vec<ProviderConfig>,
) -> Result<ProviderSnapshot, ConfigError> {
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(configs.len());

    for config in configs {
        if !seen.insert(config.provider_id.clone()) {
            return Err(ConfigError::DuplicateProvider {
                id: config.provider_id,
            });
        }
        let provider = implementations
            .get(&config.provider_id)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownProvider {
                id: config.provider_id.clone(),
            })?;
        entries.push(ProviderEntry { config, provider });
    }

    Ok(ProviderSnapshot::from_entries(version, entries))
}
