pub mod memory;
pub mod reaper;

pub use memory::MemoryJobStore;
pub use reaper::RetentionReaper;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{JobId, JobRecord, QueueResult};

/// Number of records in each state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StateCounts {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}

/// Storage primitives for job records
///
/// Every mutating operation is a single check-and-mark under the store's
/// lock. Implementations must never hold that lock across an `.await`.
pub trait JobStore: Send + Sync {
    /// Add a new job record
    fn insert(&self, job: JobRecord) -> QueueResult<()>;

    /// Add a new job unless `max_pending` jobs are already pending
    ///
    /// The bound check and the insert happen under the same lock, so
    /// concurrent producers cannot overshoot it.
    fn insert_bounded(&self, job: JobRecord, max_pending: usize) -> QueueResult<()>;

    /// Pending jobs with `next_eligible_at <= now`, priority descending then FIFO
    fn list_ready(&self, now: DateTime<Utc>) -> Vec<JobRecord>;

    /// Atomically move a pending, eligible job to processing
    ///
    /// Fails with `NotEligible` when another worker got there first.
    fn claim(&self, id: &JobId, now: DateTime<Utc>) -> QueueResult<JobRecord>;

    /// Processing -> Completed
    fn complete(&self, id: &JobId, result: Option<serde_json::Value>, now: DateTime<Utc>) -> QueueResult<JobRecord>;

    /// Processing -> Pending after `delay`, or -> Failed when attempts are exhausted
    fn retry_or_fail(&self, id: &JobId, error: String, delay: Duration, now: DateTime<Utc>) -> QueueResult<JobRecord>;

    /// Move a non-terminal job straight to Failed
    fn fail(&self, id: &JobId, error: String, count_attempt: bool, now: DateTime<Utc>) -> QueueResult<JobRecord>;

    /// Processing -> Pending without consuming an attempt
    fn release(&self, id: &JobId, now: DateTime<Utc>) -> QueueResult<JobRecord>;

    /// Read-only snapshot
    fn get(&self, id: &JobId) -> QueueResult<JobRecord>;

    /// Remove completed/failed jobs whose terminal timestamp is older than `cutoff`
    fn sweep_terminal_older_than(&self, cutoff: DateTime<Utc>) -> Vec<JobId>;

    /// Per-state record counts
    fn counts(&self) -> StateCounts;

    /// Earliest `next_eligible_at` of a pending job that is still in the future
    fn next_wake_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>>;
}
