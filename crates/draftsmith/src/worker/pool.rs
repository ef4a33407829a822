use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use super::executor::JobExecutor;
use super::queue::WorkReceiver;
use crate::error::WorkerError;

/// A fixed number of tasks pulling job ids from one shared queue.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawns `worker_count` workers (at least one) on the current runtime.
    pub fn start(worker_count: usize, receiver: WorkReceiver, executor: Arc<JobExecutor>) -> Self {
        let worker_count = worker_count.max(1);
        let shutdown = CancellationToken::new();

        let workers = (0..worker_count)
            .map(|worker_id| {
                let receiver = receiver.clone();
                let executor = Arc::clone(&executor);
                let shutdown = shutdown.clone();
                tokio::spawn(
                    run_worker(worker_id, receiver, executor, shutdown)
                        .instrument(info_span!("worker", worker_id)),
                )
            })
            .collect();

        info!("Started {} workers", worker_count);

        Self { workers, shutdown }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stops taking new jobs, lets running jobs finish, and waits for every
    /// worker to exit.
    pub async fn shutdown(self) -> Result<(), WorkerError> {
        info!("Shutting down worker pool...");
        self.shutdown.cancel();

        let mut failure = None;
        for (i, worker) in self.workers.into_iter().enumerate() {
            match worker.await {
                Ok(()) => debug!("Worker {} finished", i),
                Err(e) => {
                    error!("Worker {} panicked: {}", i, e);
                    failure.get_or_insert_with(|| WorkerError::Join(e.to_string()));
                }
            }
        }

        info!("All workers have stopped");
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: WorkReceiver,
    executor: Arc<JobExecutor>,
    shutdown: CancellationToken,
) {
    debug!("Worker {} started", worker_id);

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Worker {} received shutdown signal", worker_id);
                break;
            }
            next = receiver.recv() => next,
        };

        match next {
            Some(job_id) => executor.execute(&job_id).await,
            None => {
                debug!("Worker {} job channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}
