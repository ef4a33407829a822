//! Test harness running a full engine over scripted providers.
//!
//! The `TestHarness` struct owns:
//! - a started `Engine` with an in-memory job store
//! - the scripted providers, by id, for call assertions
//! - the static content source

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use draftsmith::config::Config;
use draftsmith::job::{Job, JobOrchestrator};
use draftsmith::pipeline::ContentRequest;
use draftsmith::provider::{GenerationProvider, ScriptedProvider, StaticContentSource};
use draftsmith::router::{RetryPolicy, RouterSettings};
use draftsmith::Engine;

use super::builders::research_bundle;

const WAIT_LIMIT: Duration = Duration::from_secs(20);

pub struct TestHarness {
    engine: Option<Engine>,
    providers: HashMap<String, Arc<ScriptedProvider>>,
    pub source: Arc<StaticContentSource>,
}

impl TestHarness {
    /// Starts an engine over `providers` and the default research bundle.
    pub fn start(config: Config, providers: Vec<ScriptedProvider>) -> Self {
        Self::with_source(config, providers, StaticContentSource::new(research_bundle()))
    }

    pub fn with_source(
        config: Config,
        providers: Vec<ScriptedProvider>,
        source: StaticContentSource,
    ) -> Self {
        let providers: HashMap<String, Arc<ScriptedProvider>> = providers
            .into_iter()
            .map(|p| (p.provider_id().to_string(), Arc::new(p)))
            .collect();
        let source = Arc::new(source);

        let settings = RouterSettings {
            retry: RetryPolicy::immediate(config.router.max_retries),
            ..RouterSettings::from_config(&config)
        };
        let mut builder = Engine::builder(config)
            .content_source(source.clone())
            .router_settings(settings);
        for provider in providers.values() {
            builder = builder.provider(provider.clone());
        }

        let mut engine = builder.build().expect("engine should build");
        engine.start().expect("engine should start");

        Self {
            engine: Some(engine),
            providers,
            source,
        }
    }

    pub fn engine(&self) -> &Engine {
        self.engine.as_ref().expect("engine is running")
    }

    pub fn orchestrator(&self) -> &JobOrchestrator {
        self.engine().orchestrator()
    }

    pub fn provider(&self, id: &str) -> &Arc<ScriptedProvider> {
        &self.providers[id]
    }

    pub async fn submit(&self, request: ContentRequest) -> String {
        self.orchestrator()
            .submit(request)
            .await
            .expect("job should be accepted")
    }

    /// Waits for a terminal status, failing the test if it takes too long.
    pub async fn wait(&self, job_id: &str) -> Job {
        tokio::time::timeout(WAIT_LIMIT, self.orchestrator().wait(job_id))
            .await
            .expect("job did not finish in time")
            .expect("job should exist")
    }

    pub async fn shutdown(mut self) {
        if let Some(engine) = self.engine.take() {
            engine.shutdown().await.expect("clean shutdown");
        }
    }
}
