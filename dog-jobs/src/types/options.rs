use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::JobPriority;
use crate::{QueueError, QueueResult};

/// Submission options for a single job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnqueueOptions {
    /// Job priority for ordering
    pub priority: JobPriority,

    /// Ceiling on execution attempts
    pub max_attempts: u32,

    /// Delay before the job first becomes eligible
    pub initial_delay: Duration,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: JobPriority::default(),
            max_attempts: 3,
            initial_delay: Duration::ZERO,
        }
    }
}

impl EnqueueOptions {
    /// Set the job priority
    pub fn with_priority(mut self, priority: impl Into<JobPriority>) -> Self {
        self.priority = priority.into();
        self
    }

    /// Set the maximum execution attempts
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay first eligibility
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub(crate) fn validate(&self) -> QueueResult<()> {
        if self.max_attempts == 0 {
            return Err(QueueError::InvalidOptions(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        let eligible_at = chrono::Duration::from_std(self.initial_delay)
            .ok()
            .and_then(|delay| chrono::Utc::now().checked_add_signed(delay));
        if eligible_at.is_none() {
            return Err(QueueError::InvalidOptions(format!(
                "initial_delay out of range: {:?}",
                self.initial_delay
            )));
        }
        Ok(())
    }
}
