//! Wires configuration, providers, the job store and the worker pool
//! together.

use std::sync::Arc;

use tracing::info;

use crate::config::{validate_config, Config};
use crate::error::{ConfigError, Result, WorkerError};
use crate::job::{CancellationRegistry, InMemoryJobStore, JobOrchestrator, JobStore};
use crate::pipeline::Pipeline;
use crate::provider::{ContentSource, GenerationProvider, ProviderConfig, ProviderRegistry};
use crate::router::RouterSettings;
use crate::worker::{work_queue, JobExecutor, WorkReceiver, WorkerPool};

const QUEUE_CAPACITY_PER_WORKER: usize = 64;

pub struct EngineBuilder {
    config: Config,
    providers: Vec<Arc<dyn GenerationProvider>>,
    content_source: Option<Arc<dyn ContentSource>>,
    store: Option<Arc<dyn JobStore>>,
    router_settings: Option<RouterSettings>,
}

impl EngineBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            providers: Vec::new(),
            content_source: None,
            store: None,
            router_settings: None,
        }
    }

    /// Registers an implementation; `config.providers` decides whether and
    /// in which order it is used.
    pub fn provider(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn content_source(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.content_source = Some(source);
        self
    }

    /// Defaults to an [`InMemoryJobStore`].
    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Overrides the retry and timeout settings derived from the config.
    pub fn router_settings(mut self, settings: RouterSettings) -> Self {
        self.router_settings = Some(settings);
        self
    }

    pub fn build(self) -> Result<Engine> {
        validate_config(&self.config)?;
        let content_source = self.content_source.ok_or_else(|| ConfigError::Validation {
            message: "a content source is required".to_string(),
        })?;

        let registry = Arc::new(ProviderRegistry::new(
            self.providers,
            self.config.providers.clone(),
        )?);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryJobStore::new()));
        let cancellations = Arc::new(CancellationRegistry::new());
        let pipeline = Arc::new(Pipeline::from_config(&self.config, content_source));

        let mut executor = JobExecutor::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            pipeline,
            Arc::clone(&cancellations),
            &self.config,
        );
        if let Some(settings) = self.router_settings {
            executor = executor.with_router_settings(settings);
        }

        let (queue, receiver) =
            work_queue(self.config.worker_count.max(1) * QUEUE_CAPACITY_PER_WORKER);
        let orchestrator = JobOrchestrator::new(store, queue, cancellations);

        Ok(Engine {
            config: self.config,
            registry,
            orchestrator,
            executor: Arc::new(executor),
            receiver,
            pool: None,
        })
    }
}

pub struct Engine {
    config: Config,
    registry: Arc<ProviderRegistry>,
    orchestrator: JobOrchestrator,
    executor: Arc<JobExecutor>,
    receiver: WorkReceiver,
    pool: Option<WorkerPool>,
}

impl Engine {
    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Starts the worker pool. Must be called from within a Tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.pool.is_some() {
            return Err(WorkerError::AlreadyStarted.into());
        }
        self.pool = Some(WorkerPool::start(
            self.config.worker_count,
            self.receiver.clone(),
            Arc::clone(&self.executor),
        ));
        info!(workers = self.config.worker_count, "Engine started");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.pool.is_some()
    }

    /// Stops the pool after running jobs finish. Queued jobs stay queued.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(pool) = self.pool.take() {
            pool.shutdown().await?;
        }
        info!("Engine stopped");
        Ok(())
    }

    /// Swaps in a new provider configuration for jobs started from now on.
    /// Returns the new snapshot version.
    pub fn reload_providers(&self, providers: Vec<ProviderConfig>) -> Result<u64> {
        let candidate = Config {
            providers: providers.clone(),
            ..self.config.clone()
        };
        validate_config(&candidate)?;
        Ok(self.registry.reload(providers)?)
    }

    pub fn orchestrator(&self) -> &JobOrchestrator {
        &self.orchestrator
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DraftsmithError;
    use crate::provider::{ResearchBundle, ScriptedProvider, StaticContentSource};

    fn config() -> Config {
        Config {
            worker_count: 1,
            providers: vec![ProviderConfig::new("primary", 1, "model")],
            ..Config::default()
        }
    }

    fn builder(config: Config) -> EngineBuilder {
        Engine::builder(config)
            .provider(Arc::new(ScriptedProvider::new("primary")))
            .content_source(Arc::new(StaticContentSource::new(ResearchBundle::default())))
    }

    #[test]
    fn test_build_requires_enabled_provider() {
        let result = builder(Config {
            providers: vec![],
            ..config()
        })
        .build();
        assert!(matches!(
            result,
            Err(DraftsmithError::Config(ConfigError::Validation { .. }))
        ));
    }

    #[test]
    fn test_build_rejects_unregistered_provider() {
        let result = builder(Config {
            providers: vec![ProviderConfig::new("other", 1, "model")],
            ..config()
        })
        .build();
        assert!(matches!(
            result,
            Err(DraftsmithError::Config(ConfigError::UnknownProvider { .. }))
        ));
    }

    #[test]
    fn test_reload_bumps_version() {
        let engine = builder(config()).build().unwrap();
        assert_eq!(engine.registry().snapshot().version(), 1);
        assert_eq!(
            engine
                .reload_providers(vec![ProviderConfig::new("primary", 5, "model-2")])
                .unwrap(),
            2
        );
        assert!(engine
            .reload_providers(vec![ProviderConfig::new("primary", 1, "m").disabled()])
            .is_err());
        assert_eq!(engine.registry().snapshot().version(), 2);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut engine = builder(config()).build().unwrap();
        engine.start().unwrap();
        assert!(matches!(
            engine.start(),
            Err(DraftsmithError::Worker(WorkerError::AlreadyStarted))
        ));
        engine.shutdown().await.unwrap();
    }
}
