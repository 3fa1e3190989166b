use std::time::Duration;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{QueueError, QueueResult, RetryPolicy};

/// Configuration for one queue instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue name, used in logs and handed to handlers
    pub name: String,
    /// Number of concurrent worker slots
    pub workers: usize,
    /// Backoff after the first failed attempt
    pub base_retry_backoff: Duration,
    /// Maximum retry backoff duration
    pub max_retry_backoff: Duration,
    /// Upper bound on how long an idle worker sleeps without a wake signal
    pub fallback_tick: Duration,
    /// Execution deadline for job types that do not set their own
    pub default_timeout: Duration,
    /// How long completed/failed jobs are kept
    pub retention: Duration,
    /// How often the reaper sweeps
    pub reaper_interval: Duration,
    /// Reject enqueues once this many jobs are pending; `None` is unbounded
    pub max_pending: Option<usize>,
    /// Lifecycle event channel capacity
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            workers: 4,
            base_retry_backoff: Duration::from_secs(1),
            max_retry_backoff: Duration::from_secs(3600), // 1 hour
            fallback_tick: Duration::from_secs(5),
            default_timeout: Duration::from_secs(300), // 5 minutes
            retention: Duration::from_secs(24 * 3600),
            reaper_interval: Duration::from_secs(3600),
            max_pending: None,
            event_capacity: 1024,
        }
    }
}

impl QueueConfig {
    /// Document OCR and liveness scoring: few slots, slow external calls
    pub fn verification() -> Self {
        Self {
            name: "verification".to_string(),
            workers: 3,
            base_retry_backoff: Duration::from_secs(2),
            default_timeout: Duration::from_secs(120),
            retention: Duration::from_secs(24 * 3600),
            ..Self::default()
        }
    }

    /// Profile matching and recommendation generation: more slots, cheap retries
    pub fn recommendation() -> Self {
        Self {
            name: "recommendation".to_string(),
            workers: 5,
            base_retry_backoff: Duration::from_secs(1),
            default_timeout: Duration::from_secs(60),
            retention: Duration::from_secs(6 * 3600),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_retry_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_retry_backoff = base;
        self.max_retry_backoff = max;
        self
    }

    pub fn with_fallback_tick(mut self, tick: Duration) -> Self {
        self.fallback_tick = tick;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_retention(mut self, retention: Duration, reaper_interval: Duration) -> Self {
        self.retention = retention;
        self.reaper_interval = reaper_interval;
        self
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = Some(max_pending);
        self
    }

    /// Retry policy derived from the backoff settings
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.base_retry_backoff, self.max_retry_backoff)
    }

    pub fn validate(&self) -> QueueResult<()> {
        let invalid = |msg: &str| -> QueueResult<()> {
            Err(QueueError::InvalidOptions(format!("{}: {}", self.name, msg)))
        };

        if self.workers == 0 {
            return invalid("workers must be at least 1");
        }
        if self.fallback_tick.is_zero() || self.reaper_interval.is_zero() {
            return invalid("fallback_tick and reaper_interval must be non-zero");
        }
        if self.default_timeout.is_zero() {
            return invalid("default_timeout must be non-zero");
        }
        if self.max_retry_backoff < self.base_retry_backoff {
            return invalid("max_retry_backoff is below base_retry_backoff");
        }
        // Every backoff and retention window must stay a valid timestamp offset from now
        let now = Utc::now();
        let latest_retry = chrono::Duration::from_std(self.max_retry_backoff)
            .ok()
            .and_then(|backoff| now.checked_add_signed(backoff));
        if latest_retry.is_none() {
            return invalid("max_retry_backoff out of range");
        }
        let oldest_kept = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention));
        if oldest_kept.is_none() {
            return invalid("retention out of range");
        }
        if self.max_pending == Some(0) {
            return invalid("max_pending must be at least 1");
        }
        Ok(())
    }
}
