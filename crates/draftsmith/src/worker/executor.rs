use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::job::{CancellationRegistry, JobFailure, JobStore};
use crate::pipeline::{Pipeline, PipelineError, RunControl, StoreProgress};
use crate::provider::ProviderRegistry;
use crate::router::{Router, RouterSettings};

/// Runs one claimed job from start to terminal status.
pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    registry: Arc<ProviderRegistry>,
    pipeline: Arc<Pipeline>,
    router_settings: RouterSettings,
    cancellations: Arc<CancellationRegistry>,
    job_timeout: Duration,
}

impl JobExecutor {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<ProviderRegistry>,
        pipeline: Arc<Pipeline>,
        cancellations: Arc<CancellationRegistry>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            registry,
            pipeline,
            router_settings: RouterSettings::from_config(config),
            cancellations,
            job_timeout: Duration::from_secs(config.job_timeout_secs),
        }
    }

    pub fn with_router_settings(mut self, settings: RouterSettings) -> Self {
        self.router_settings = settings;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Claims `job_id` and runs it. Deliveries of jobs that are not queued
    /// are ignored.
    pub async fn execute(&self, job_id: &str) {
        let job = match self.store.claim(job_id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                debug!(job_id, "Job not queued, skipping delivery");
                return;
            }
            Err(e) => {
                warn!(job_id, error = %e, "Failed to claim job");
                return;
            }
        };

        let token = self.cancellations.token_for(job_id);
        // A cancel that arrived before the token existed only set the flag.
        if self.store.get(job_id).is_ok_and(|j| j.cancel_requested) {
            token.cancel();
        }
        let deadline = Instant::now().checked_add(self.job_timeout);
        // Later reloads do not affect this job.
        let snapshot = self.registry.snapshot();
        info!(job_id, provider_snapshot = snapshot.version(), "Job started");

        let mut router = Router::new(snapshot, self.router_settings.clone());
        let mut control = RunControl::new(token);
        if let Some(deadline) = deadline {
            router = router.with_deadline(deadline);
            control = control.with_deadline(deadline);
        }
        let ctx = self.pipeline.new_context(job_id, &job.request);
        let progress = StoreProgress::new(job_id, Arc::clone(&self.store));

        let run = AssertUnwindSafe(self.pipeline.run(ctx, &router, &progress, &control))
            .catch_unwind()
            .await;

        let recorded = match run {
            Ok((Ok(content), _ctx)) => {
                info!(
                    job_id,
                    composite = content.quality.composite_score,
                    passed = content.quality.passed_threshold,
                    words = content.word_count,
                    "Job completed"
                );
                self.store.complete(job_id, content)
            }
            Ok((Err(PipelineError::Cancelled { stage }), _ctx)) => {
                info!(job_id, stage = %stage, "Job cancelled");
                self.store.mark_cancelled(job_id)
            }
            Ok((Err(e), ctx)) => {
                warn!(job_id, error = %e, "Job failed");
                self.store
                    .fail(job_id, JobFailure::from_pipeline(&e, ctx.diagnostics()))
            }
            Err(_) => {
                error!(job_id, "Pipeline panicked");
                self.store
                    .fail(job_id, JobFailure::internal("pipeline panicked"))
            }
        };

        if let Err(e) = recorded {
            error!(job_id, error = %e, "Failed to record job outcome");
        }
        self.cancellations.remove(job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{ErrorCategory, InMemoryJobStore, Job, JobStatus};
    use crate::pipeline::{ContentRequest, Stage};
    use crate::provider::{
        GenerationProvider, ProviderConfig, ProviderError, ResearchBundle, ScriptedProvider,
        StaticContentSource,
    };
    use crate::router::RetryPolicy;

    fn executor(provider: ScriptedProvider) -> (JobExecutor, Arc<InMemoryJobStore>) {
        let store = Arc::new(InMemoryJobStore::new());
        let registry = ProviderRegistry::new(
            vec![Arc::new(provider) as Arc<dyn GenerationProvider>],
            vec![ProviderConfig::new("primary", 1, "model")],
        )
        .unwrap();
        let config = Config::default();
        let pipeline = Pipeline::from_config(
            &config,
            Arc::new(StaticContentSource::new(ResearchBundle::default())),
        );
        let executor = JobExecutor::new(
            store.clone(),
            Arc::new(registry),
            Arc::new(pipeline),
            Arc::new(CancellationRegistry::new()),
            &config,
        )
        .with_router_settings(RouterSettings {
            retry: RetryPolicy::immediate(0),
            ..RouterSettings::default()
        });
        (executor, store)
    }

    #[tokio::test]
    async fn test_provider_exhaustion_fails_job() {
        let (executor, store) = executor(
            ScriptedProvider::new("primary")
                .with_responder(|_| Err(ProviderError::terminal("unavailable"))),
        );
        store
            .insert(Job::new("j", ContentRequest::new("Tides").with_mode(
                crate::pipeline::GenerationMode::Quick,
            )))
            .unwrap();

        executor.execute("j").await;

        let job = store.get("j").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        let failure = job.error.unwrap();
        assert_eq!(failure.category, ErrorCategory::ProviderExhausted);
        assert_eq!(failure.stage, Some(Stage::ResearchOutline));
        let diagnostics = failure.diagnostics.unwrap();
        assert_eq!(
            diagnostics.completed_stages,
            vec![Stage::Initialization, Stage::LengthTargeting]
        );
        assert!(job.progress_percentage < 100);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_noop() {
        let provider = Arc::new(ScriptedProvider::new("primary"));
        let store = Arc::new(InMemoryJobStore::new());
        let registry = ProviderRegistry::new(
            vec![provider.clone() as Arc<dyn GenerationProvider>],
            vec![ProviderConfig::new("primary", 1, "model")],
        )
        .unwrap();
        let config = Config::default();
        let executor = JobExecutor::new(
            store.clone(),
            Arc::new(registry),
            Arc::new(Pipeline::from_config(
                &config,
                Arc::new(StaticContentSource::new(ResearchBundle::default())),
            )),
            Arc::new(CancellationRegistry::new()),
            &config,
        );
        store
            .insert(Job::new("j", ContentRequest::new("Tides")))
            .unwrap();

        executor.execute("j").await;
        let calls = provider.calls();
        executor.execute("j").await;

        assert_eq!(provider.calls(), calls);
        assert_eq!(store.get("j").unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_elapsed_timeout_fails_with_timeout() {
        let (executor, store) = executor(ScriptedProvider::new("primary"));
        let executor = executor.with_job_timeout(Duration::ZERO);
        store
            .insert(Job::new("j", ContentRequest::new("Tides")))
            .unwrap();

        executor.execute("j").await;

        let job = store.get("j").unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.unwrap().category, ErrorCategory::Timeout);
    }
}
