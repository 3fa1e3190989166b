//! # dog-jobs: In-Process Background Job Queue
//!
//! Moves slow, failure-prone work (document OCR, liveness scoring, profile
//! matching, recommendation generation) off the request path.
//!
//! - **Priority admission**: higher priority first, FIFO within a priority
//! - **Bounded workers**: a fixed number of slots per queue instance
//! - **Atomic claims**: a job is dispatched to exactly one worker per attempt
//! - **Exponential backoff**: `base * 2^(attempts-1)`, capped
//! - **Deadlines and cancellation**: per-job-type timeouts, cooperative shutdown
//! - **Retention**: terminal jobs are reaped after a configurable window
//! - **Observability**: lifecycle events, live metrics, best-effort callbacks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dog_jobs::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct DocumentOcr {
//!     document_id: String,
//! }
//!
//! #[async_trait]
//! impl Job for DocumentOcr {
//!     type Context = ();
//!     type Output = String;
//!
//!     const JOB_TYPE: &'static str = "document_ocr";
//!     const PRIORITY: JobPriority = JobPriority::HIGH;
//!
//!     async fn execute(&self, _ctx: (), _job: &JobContext) -> Result<String, JobError> {
//!         Ok(format!("text of {}", self.document_id))
//!     }
//! }
//!
//! # async fn run() -> QueueResult<()> {
//! let queue = QueueManager::new(QueueConfig::verification())?;
//! queue.register::<DocumentOcr>(())?;
//! queue.start()?;
//!
//! let job_id = queue.enqueue_job(&DocumentOcr { document_id: "doc-1".into() })?;
//! let record = queue.get_status(&job_id)?;
//! println!("{} is {}", job_id, record.state);
//!
//! queue.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod types;
pub mod error;
pub mod config;
pub mod job;
pub mod retry;
pub mod store;
pub mod observability;
pub mod manager;
mod worker;

pub use types::{JobId, JobPriority, JobState, JobRecord, JobEvent, EnqueueOptions};
pub use error::{QueueError, QueueResult, JobError};
pub use config::QueueConfig;
pub use job::{Job, JobContext, JobRegistry, JobHandler, FnHandler};
pub use retry::{RetryPolicy, RetryDecision};
pub use store::{JobStore, MemoryJobStore, RetentionReaper, StateCounts};
pub use manager::QueueManager;

pub use observability::{
    ObservabilityLayer, LiveMetrics, MetricsSnapshot, JobTypeMetrics,
    JobNotifier, CacheInvalidator, CallbackError,
};

/// Common imports for defining and running jobs
pub mod prelude {
    pub use crate::{
        QueueManager, QueueConfig, Job, JobContext, JobError,
        JobId, JobPriority, JobState, JobRecord, EnqueueOptions,
        QueueError, QueueResult, MetricsSnapshot,
    };

    pub use async_trait::async_trait;
}
