use std::time::Duration;
use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors for queue operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Duplicate job id: {0}")]
    DuplicateId(String),

    /// The job is no longer pending or not yet eligible; another worker won the claim
    #[error("Job is not eligible for claim: {0}")]
    NotEligible(String),

    #[error("Invalid state transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("Job type not registered: {0}")]
    JobTypeNotRegistered(String),

    #[error("Job type already registered: {0}")]
    JobTypeAlreadyRegistered(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Queue is full: {pending} pending jobs (max: {max})")]
    QueueFull { pending: usize, max: usize },

    #[error("Queue is shutting down")]
    ShuttingDown,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Job execution outcome - determines retry behavior
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Retryable error - will schedule retry if attempts remain
    #[error("Retryable error: {0}")]
    Retryable(String),

    /// Permanent error - fail immediately, no retry
    #[error("Permanent error: {0}")]
    Permanent(String),

    /// Handler exceeded its execution deadline
    #[error("Job timed out after {0:?}")]
    Timeout(Duration),

    /// Handler observed the cancellation token and stopped early
    #[error("Job was cancelled")]
    Cancelled,
}

impl JobError {
    /// Create a retryable error
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    /// Create a permanent error
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_) | Self::Timeout(_))
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        Self::Permanent(format!("Invalid payload: {}", err))
    }
}
