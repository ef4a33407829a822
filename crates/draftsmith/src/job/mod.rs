//! Job lifecycle: queued → processing → completed | failed | cancelled.
//!
//! A queued job may also be cancelled directly. Nothing leaves a terminal
//! status.

pub mod cancel;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod store;
pub mod subscription;

pub use cancel::CancellationRegistry;
pub use error::JobError;
pub use model::{ErrorCategory, Job, JobCounts, JobFailure, JobFilter, JobStatus};
pub use orchestrator::JobOrchestrator;
pub use store::{CancelOutcome, InMemoryJobStore, JobStore};
pub use subscription::{subscribe, JobEvent, ProgressStream};
