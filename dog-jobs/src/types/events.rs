use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobId;

/// Lifecycle events emitted by a queue instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobEvent {
    /// Job was inserted as pending
    Added {
        job_id: JobId,
        job_type: String,
        at: DateTime<Utc>,
    },

    /// Job was claimed by a worker slot
    Claimed {
        job_id: JobId,
        job_type: String,
        at: DateTime<Utc>,
    },

    /// Job completed successfully
    Completed {
        job_id: JobId,
        job_type: String,
        duration_ms: u64,
        at: DateTime<Utc>,
    },

    /// Handler failed and the job went back to pending with a backoff delay
    Retried {
        job_id: JobId,
        job_type: String,
        attempts: u32,
        retry_at: DateTime<Utc>,
        error: String,
        duration_ms: u64,
        at: DateTime<Utc>,
    },

    /// Job failed permanently
    Failed {
        job_id: JobId,
        job_type: String,
        attempts: u32,
        error: String,
        /// Handler run time; `None` when no handler ran
        duration_ms: Option<u64>,
        /// False when the job was rejected before any worker claimed it
        was_processing: bool,
        at: DateTime<Utc>,
    },

    /// In-flight job handed back to pending on shutdown
    Released {
        job_id: JobId,
        job_type: String,
        at: DateTime<Utc>,
    },

    /// Terminal job deleted after its retention window
    Reaped {
        job_id: JobId,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Claimed { .. } => "claimed",
            Self::Completed { .. } => "completed",
            Self::Retried { .. } => "retried",
            Self::Failed { .. } => "failed",
            Self::Released { .. } => "released",
            Self::Reaped { .. } => "reaped",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Added { job_id, .. }
            | Self::Claimed { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Retried { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Released { job_id, .. }
            | Self::Reaped { job_id, .. } => job_id,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Added { at, .. }
            | Self::Claimed { at, .. }
            | Self::Completed { at, .. }
            | Self::Retried { at, .. }
            | Self::Failed { at, .. }
            | Self::Released { at, .. }
            | Self::Reaped { at, .. } => at,
        }
    }

    /// Completed or Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// Get the job type, if the event carries one
    pub fn job_type(&self) -> Option<&str> {
        match self {
            Self::Added { job_type, .. }
            | Self::Claimed { job_type, .. }
            | Self::Completed { job_type, .. }
            | Self::Retried { job_type, .. }
            | Self::Failed { job_type, .. }
            | Self::Released { job_type, .. } => Some(job_type),
            Self::Reaped { .. } => None,
        }
    }
}
