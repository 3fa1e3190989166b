pub mod registry;

pub use registry::{JobRegistry, JobHandler, FnHandler};

use std::time::Duration;
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio_util::sync::CancellationToken;

use crate::{EnqueueOptions, JobError, JobId, JobPriority};

/// Trait for defining typed jobs that can be processed by the queue
///
/// Each job kind is its own payload type; the registry dispatches on
/// `JOB_TYPE` and deserializes the stored payload back into `Self`.
#[async_trait]
pub trait Job: Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Shared dependencies handed to every execution (clients, stores)
    type Context: Send + Sync + Clone + 'static;

    /// Result kept on the job record after success
    type Output: Send + Serialize + 'static;

    /// Job type identifier for dispatch
    const JOB_TYPE: &'static str;

    /// Default priority
    const PRIORITY: JobPriority = JobPriority::NORMAL;

    /// Default ceiling on attempts
    const MAX_ATTEMPTS: u32 = 3;

    /// Execution deadline for this job type; `None` uses the queue default
    const TIMEOUT: Option<Duration> = None;

    /// Execute the job
    async fn execute(&self, ctx: Self::Context, job: &JobContext) -> Result<Self::Output, JobError>;

    /// Submission options derived from the type-level defaults
    fn options(&self) -> EnqueueOptions {
        EnqueueOptions::default()
            .with_priority(Self::PRIORITY)
            .with_max_attempts(Self::MAX_ATTEMPTS)
    }
}

/// Per-execution context passed to handlers.
///
/// The cancellation token is cancelled when the owning queue shuts down.
/// Long-running handlers should check it and return `JobError::Cancelled`.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub job_type: String,
    /// Queue instance name
    pub queue: String,
    /// 1-based number of the attempt being executed
    pub attempt: u32,
    pub max_attempts: u32,
    pub cancellation: CancellationToken,
}

impl JobContext {
    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// True when a failure of this attempt will not be retried
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}
