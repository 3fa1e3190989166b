use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EnqueueOptions, JobId, JobPriority};
use crate::{QueueError, QueueResult};

/// Job state lifecycle
///
/// `Pending -> Processing -> {Completed | Pending (retry) | Failed}`.
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting for `next_eligible_at` and a free worker
    Pending,

    /// Job is currently being processed by a worker
    Processing,

    /// Job completed successfully
    Completed,

    /// Job failed permanently
    Failed,
}

impl JobState {
    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Get the state name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Job record - runtime state owned by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier
    pub id: JobId,

    /// Job type identifier for dispatch
    pub job_type: String,

    /// Type-specific payload, opaque to the queue
    pub payload: serde_json::Value,

    /// Job priority for ordering
    pub priority: JobPriority,

    /// Execution attempts so far
    pub attempts: u32,

    /// Ceiling on execution attempts
    pub max_attempts: u32,

    /// Current job state
    pub state: JobState,

    /// The job may not be claimed before this instant
    pub next_eligible_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,

    /// Last error message (if any)
    pub last_error: Option<String>,

    /// Handler output of the successful attempt
    pub result: Option<serde_json::Value>,
}

impl JobRecord {
    /// Create a new pending job record
    pub fn new(
        id: JobId,
        job_type: impl Into<String>,
        payload: serde_json::Value,
        options: &EnqueueOptions,
        now: DateTime<Utc>,
    ) -> Self {
        // Validated options always fit; anything else saturates instead of panicking
        let next_eligible_at = chrono::Duration::from_std(options.initial_delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            id,
            job_type: job_type.into(),
            payload,
            priority: options.priority,
            attempts: 0,
            max_attempts: options.max_attempts,
            state: JobState::Pending,
            next_eligible_at,
            created_at: now,
            started_at: None,
            completed_at: None,
            failed_at: None,
            last_error: None,
            result: None,
        }
    }

    /// Pending and past its eligibility instant
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Pending && self.next_eligible_at <= now
    }

    /// When the record became terminal
    pub fn terminal_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            JobState::Completed => self.completed_at,
            JobState::Failed => self.failed_at,
            _ => None,
        }
    }

    /// Check if another attempt is allowed
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts && !self.state.is_terminal()
    }

    fn expect_state(&self, expected: JobState, to: JobState) -> QueueResult<()> {
        if self.state != expected {
            return Err(QueueError::InvalidTransition {
                job_id: self.id.to_string(),
                from: self.state.name(),
                to: to.name(),
            });
        }
        Ok(())
    }

    /// Pending -> Processing
    pub fn start_processing(&mut self, now: DateTime<Utc>) -> QueueResult<()> {
        if !self.is_eligible(now) {
            return Err(QueueError::NotEligible(self.id.to_string()));
        }
        self.state = JobState::Processing;
        self.started_at = Some(now);
        Ok(())
    }

    /// Processing -> Completed
    pub fn complete(&mut self, result: Option<serde_json::Value>, now: DateTime<Utc>) -> QueueResult<()> {
        self.expect_state(JobState::Processing, JobState::Completed)?;
        self.attempts = (self.attempts + 1).min(self.max_attempts);
        self.state = JobState::Completed;
        self.completed_at = Some(now);
        self.result = result;
        Ok(())
    }

    /// Processing -> Pending with a delay, or Processing -> Failed once attempts run out
    pub fn retry_or_fail(&mut self, error: String, delay: chrono::Duration, now: DateTime<Utc>) -> QueueResult<JobState> {
        self.expect_state(JobState::Processing, JobState::Pending)?;
        let retry_at = now
            .checked_add_signed(delay)
            .ok_or_else(|| QueueError::Internal(format!("Retry time out of range for job {}", self.id)))?;
        self.attempts = (self.attempts + 1).min(self.max_attempts);
        self.last_error = Some(error);

        if self.attempts < self.max_attempts {
            self.state = JobState::Pending;
            self.next_eligible_at = retry_at;
        } else {
            self.state = JobState::Failed;
            self.failed_at = Some(now);
        }
        Ok(self.state)
    }

    /// Pending or Processing -> Failed
    ///
    /// `count_attempt` is false for configuration errors, which never ran a handler.
    pub fn fail(&mut self, error: String, count_attempt: bool, now: DateTime<Utc>) -> QueueResult<()> {
        if self.state.is_terminal() {
            return Err(QueueError::InvalidTransition {
                job_id: self.id.to_string(),
                from: self.state.name(),
                to: JobState::Failed.name(),
            });
        }
        if count_attempt && self.state == JobState::Processing {
            self.attempts = (self.attempts + 1).min(self.max_attempts);
        }
        self.state = JobState::Failed;
        self.failed_at = Some(now);
        self.last_error = Some(error);
        Ok(())
    }

    /// Processing -> Pending, immediately eligible, attempt not consumed
    pub fn release(&mut self, now: DateTime<Utc>) -> QueueResult<()> {
        self.expect_state(JobState::Processing, JobState::Pending)?;
        self.state = JobState::Pending;
        self.started_at = None;
        self.next_eligible_at = now;
        Ok(())
    }
}
