use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{
    QueueResult, QueueError, JobId, JobRecord, JobState,
    store::{JobStore, StateCounts},
};

#[derive(Default)]
struct Jobs {
    records: HashMap<JobId, JobRecord>,
    // Kept in step with `records` under the same lock
    pending: usize,
}

impl Jobs {
    fn insert(&mut self, job: JobRecord) -> QueueResult<()> {
        if self.records.contains_key(&job.id) {
            return Err(QueueError::DuplicateId(job.id.to_string()));
        }
        if job.state == JobState::Pending {
            self.pending += 1;
        }
        self.records.insert(job.id.clone(), job);
        Ok(())
    }
}

/// In-memory job store shared by every worker slot of one queue instance
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<RwLock<Jobs>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending jobs, without scanning the records
    pub fn pending_count(&self) -> usize {
        self.jobs.read().pending
    }

    fn mutate<F>(&self, id: &JobId, f: F) -> QueueResult<JobRecord>
    where
        F: FnOnce(&mut JobRecord) -> QueueResult<()>,
    {
        let mut jobs = self.jobs.write();
        let record = jobs.records.get_mut(id).ok_or_else(|| QueueError::JobNotFound(id.to_string()))?;
        let was_pending = record.state == JobState::Pending;
        f(record)?;
        let is_pending = record.state == JobState::Pending;
        let snapshot = record.clone();

        match (was_pending, is_pending) {
            (true, false) => jobs.pending -= 1,
            (false, true) => jobs.pending += 1,
            _ => {}
        }
        Ok(snapshot)
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: JobRecord) -> QueueResult<()> {
        self.jobs.write().insert(job)
    }

    fn insert_bounded(&self, job: JobRecord, max_pending: usize) -> QueueResult<()> {
        let mut jobs = self.jobs.write();
        if jobs.pending >= max_pending {
            return Err(QueueError::QueueFull { pending: jobs.pending, max: max_pending });
        }
        jobs.insert(job)
    }

    fn list_ready(&self, now: DateTime<Utc>) -> Vec<JobRecord> {
        let mut ready: Vec<JobRecord> = {
            let jobs = self.jobs.read();
            jobs.records
                .values()
                .filter(|record| record.is_eligible(now))
                .cloned()
                .collect()
        };

        ready.sort_by_key(|record| (Reverse(record.priority), record.created_at));
        ready
    }

    fn claim(&self, id: &JobId, now: DateTime<Utc>) -> QueueResult<JobRecord> {
        self.mutate(id, |record| record.start_processing(now))
    }

    fn complete(&self, id: &JobId, result: Option<serde_json::Value>, now: DateTime<Utc>) -> QueueResult<JobRecord> {
        self.mutate(id, |record| record.complete(result, now))
    }

    fn retry_or_fail(&self, id: &JobId, error: String, delay: Duration, now: DateTime<Utc>) -> QueueResult<JobRecord> {
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| QueueError::Internal(format!("Retry delay out of range: {}", e)))?;
        self.mutate(id, |record| record.retry_or_fail(error, delay, now).map(|_| ()))
    }

    fn fail(&self, id: &JobId, error: String, count_attempt: bool, now: DateTime<Utc>) -> QueueResult<JobRecord> {
        self.mutate(id, |record| record.fail(error, count_attempt, now))
    }

    fn release(&self, id: &JobId, now: DateTime<Utc>) -> QueueResult<JobRecord> {
        self.mutate(id, |record| record.release(now))
    }

    fn get(&self, id: &JobId) -> QueueResult<JobRecord> {
        let jobs = self.jobs.read();
        jobs.records
            .get(id)
            .cloned()
            .ok_or_else(|| QueueError::JobNotFound(id.to_string()))
    }

    fn sweep_terminal_older_than(&self, cutoff: DateTime<Utc>) -> Vec<JobId> {
        let mut jobs = self.jobs.write();
        let expired: Vec<JobId> = jobs
            .records
            .values()
            .filter(|record| matches!(record.terminal_at(), Some(at) if at < cutoff))
            .map(|record| record.id.clone())
            .collect();

        // Only terminal records go, so the pending count is unchanged
        for id in &expired {
            jobs.records.remove(id);
        }
        expired
    }

    fn counts(&self) -> StateCounts {
        let jobs = self.jobs.read();
        jobs.records.values().fold(StateCounts::default(), |mut counts, record| {
            match record.state {
                JobState::Pending => counts.pending += 1,
                JobState::Processing => counts.processing += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
            }
            counts
        })
    }

    fn next_wake_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let jobs = self.jobs.read();
        jobs.records
            .values()
            .filter(|record| record.state == JobState::Pending && record.next_eligible_at > now)
            .map(|record| record.next_eligible_at)
            .min()
    }
}
