use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::error::WorkerError;

/// Creates a bounded queue of job ids.
pub fn work_queue(capacity: usize) -> (WorkQueue, WorkReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        WorkQueue { sender },
        WorkReceiver {
            inner: Arc::new(Mutex::new(receiver)),
        },
    )
}

/// Sending half, held by the orchestrator.
#[derive(Clone)]
pub struct WorkQueue {
    sender: mpsc::Sender<String>,
}

impl WorkQueue {
    /// Waits for room when the queue is full.
    pub async fn push(&self, job_id: &str) -> Result<(), WorkerError> {
        self.sender
            .send(job_id.to_string())
            .await
            .map_err(|_| WorkerError::ChannelClosed)
    }
}

/// Receiving half, shared by every worker.
#[derive(Clone)]
pub struct WorkReceiver {
    inner: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl WorkReceiver {
    /// Next job id, or `None` once every sender is gone.
    pub async fn recv(&self) -> Option<String> {
        self.inner.lock().await.recv().await
    }
}
