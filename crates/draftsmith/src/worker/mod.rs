//! Work dispatch: a shared queue of job ids, a pool of worker tasks, and the
//! executor that takes one job through the pipeline.

pub mod executor;
pub mod pool;
pub mod queue;

pub use executor::JobExecutor;
pub use pool::WorkerPool;
pub use queue::{work_queue, WorkQueue, WorkReceiver};
