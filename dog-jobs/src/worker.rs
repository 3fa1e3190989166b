use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::Utc;
use futures::FutureExt;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, error, debug, instrument};

use crate::{
    QueueError, JobError, JobEvent, JobRecord, JobState,
    job::{JobContext, JobRegistry},
    observability::ObservabilityLayer,
    retry::{RetryDecision, RetryPolicy},
    store::JobStore,
};

/// Everything a worker slot shares with its queue instance
#[derive(Clone)]
pub(crate) struct WorkerShared {
    pub queue: String,
    pub store: Arc<dyn JobStore>,
    pub registry: Arc<RwLock<JobRegistry>>,
    pub observability: ObservabilityLayer,
    pub retry_policy: RetryPolicy,
    pub default_timeout: Duration,
    pub fallback_tick: Duration,
    pub wake: Arc<Notify>,
    pub shutdown: CancellationToken,
}

/// One worker slot: claims eligible jobs and runs their handlers
pub(crate) struct Worker {
    slot: usize,
    shared: WorkerShared,
}

impl Worker {
    pub(crate) fn new(slot: usize, shared: WorkerShared) -> Self {
        Self { slot, shared }
    }

    /// Run the worker loop until shutdown
    pub(crate) async fn run(self) {
        info!(queue = %self.shared.queue, slot = self.slot, "Worker started");

        loop {
            // Register interest before looking at the store so an enqueue
            // between the check and the wait is not lost.
            let notified = self.shared.wake.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.shutdown.is_cancelled() {
                break;
            }

            if let Some(record) = self.claim_next() {
                self.process(record).await;
                continue;
            }

            let idle = self.idle_duration();
            tokio::select! {
                _ = self.shared.shutdown.cancelled() => break,
                _ = &mut notified => {}
                _ = tokio::time::sleep(idle) => {}
            }
        }

        info!(queue = %self.shared.queue, slot = self.slot, "Worker stopped");
    }

    /// Claim the highest-ranked ready job, moving down the list on lost races
    fn claim_next(&self) -> Option<JobRecord> {
        let now = Utc::now();
        let candidates = self.shared.store.list_ready(now);
        let total = candidates.len();

        for (index, candidate) in candidates.into_iter().enumerate() {
            match self.shared.store.claim(&candidate.id, now) {
                Ok(record) => {
                    if index + 1 < total {
                        // More ready work: let an idle sibling pick it up
                        self.shared.wake.notify_one();
                    }
                    return Some(record);
                }
                Err(QueueError::NotEligible(_)) | Err(QueueError::JobNotFound(_)) => {
                    debug!(queue = %self.shared.queue, slot = self.slot, job_id = %candidate.id, "Lost claim race");
                }
                Err(e) => {
                    warn!(queue = %self.shared.queue, job_id = %candidate.id, error = %e, "Claim failed");
                }
            }
        }

        None
    }

    /// Sleep until the next delayed job becomes eligible, bounded by the fallback tick
    fn idle_duration(&self) -> Duration {
        let now = Utc::now();
        self.shared
            .store
            .next_wake_at(now)
            .and_then(|at| (at - now).to_std().ok())
            .map_or(self.shared.fallback_tick, |until| until.min(self.shared.fallback_tick))
            .max(Duration::from_millis(1))
    }

    #[instrument(
        name = "job",
        skip(self, record),
        fields(queue = %self.shared.queue, job_id = %record.id, job_type = %record.job_type, attempt = record.attempts + 1)
    )]
    async fn process(&self, record: JobRecord) {
        let observability = &self.shared.observability;
        observability.emit(
            JobEvent::Claimed {
                job_id: record.id.clone(),
                job_type: record.job_type.clone(),
                at: record.started_at.unwrap_or_else(Utc::now),
            },
            Some(&record),
        );

        let handler = self.shared.registry.read().get(&record.job_type);
        let Some(handler) = handler else {
            let error = format!("Configuration error: no handler registered for job type '{}'", record.job_type);
            error!("{}", error);
            self.finish_failed(&record, error, None, false);
            return;
        };

        let job = JobContext {
            job_id: record.id.clone(),
            job_type: record.job_type.clone(),
            queue: self.shared.queue.clone(),
            attempt: record.attempts + 1,
            max_attempts: record.max_attempts,
            cancellation: self.shared.shutdown.child_token(),
        };
        let timeout = handler.timeout().unwrap_or(self.shared.default_timeout);

        debug!("Processing job");
        let started = Instant::now();
        let outcome = AssertUnwindSafe(tokio::time::timeout(timeout, handler.handle(record.payload.clone(), job)))
            .catch_unwind()
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let outcome = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_elapsed)) => Err(JobError::Timeout(timeout)),
            Err(panic) => Err(JobError::Retryable(format!("Handler panicked: {}", panic_message(&*panic)))),
        };

        match outcome {
            Ok(result) => self.finish_completed(&record, result, duration_ms),
            Err(JobError::Cancelled) => self.finish_released(&record),
            Err(job_error) if job_error.is_retryable() => self.finish_retry(&record, job_error, duration_ms),
            Err(job_error) => {
                error!(error = %job_error, "Job failed permanently");
                self.finish_failed(&record, job_error.to_string(), Some(duration_ms), true);
            }
        }
    }

    fn finish_completed(&self, record: &JobRecord, result: Option<serde_json::Value>, duration_ms: u64) {
        let now = Utc::now();
        match self.shared.store.complete(&record.id, result, now) {
            Ok(updated) => {
                info!(duration_ms, "Job completed successfully");
                self.shared.observability.emit(
                    JobEvent::Completed {
                        job_id: updated.id.clone(),
                        job_type: updated.job_type.clone(),
                        duration_ms,
                        at: now,
                    },
                    Some(&updated),
                );
            }
            Err(e) => error!(error = %e, "Failed to record job completion"),
        }
    }

    fn finish_retry(&self, record: &JobRecord, job_error: JobError, duration_ms: u64) {
        let now = Utc::now();
        let delay = match self.shared.retry_policy.decide(record.attempts + 1, record.max_attempts) {
            RetryDecision::Retry { delay } => delay,
            RetryDecision::Terminal => Duration::ZERO,
        };

        let updated = match self.shared.store.retry_or_fail(&record.id, job_error.to_string(), delay, now) {
            Ok(updated) => updated,
            Err(e) => {
                // Never leave the job claimed: give up on it instead
                error!(error = %e, "Could not schedule retry, failing job");
                self.finish_failed(record, job_error.to_string(), Some(duration_ms), true);
                return;
            }
        };

        let error = job_error.to_string();
        if updated.state == JobState::Pending {
            warn!(error = %error, attempts = updated.attempts, delay_ms = delay.as_millis() as u64, "Job failed, will retry");
            self.shared.observability.emit(
                JobEvent::Retried {
                    job_id: updated.id.clone(),
                    job_type: updated.job_type.clone(),
                    attempts: updated.attempts,
                    retry_at: updated.next_eligible_at,
                    error,
                    duration_ms,
                    at: now,
                },
                Some(&updated),
            );
            // Idle workers re-read next_wake_at and sleep until the retry is due
            self.shared.wake.notify_one();
        } else {
            error!(error = %error, attempts = updated.attempts, "Job failed permanently: attempts exhausted");
            self.emit_failed(&updated, error, Some(duration_ms), true, now);
        }
    }

    fn finish_failed(&self, record: &JobRecord, error: String, duration_ms: Option<u64>, count_attempt: bool) {
        let now = Utc::now();
        match self.shared.store.fail(&record.id, error.clone(), count_attempt, now) {
            Ok(updated) => self.emit_failed(&updated, error, duration_ms, true, now),
            Err(e) => error!(error = %e, "Failed to record job failure"),
        }
    }

    fn emit_failed(
        &self,
        record: &JobRecord,
        error: String,
        duration_ms: Option<u64>,
        was_processing: bool,
        at: chrono::DateTime<Utc>,
    ) {
        self.shared.observability.emit(
            JobEvent::Failed {
                job_id: record.id.clone(),
                job_type: record.job_type.clone(),
                attempts: record.attempts,
                error,
                duration_ms,
                was_processing,
                at,
            },
            Some(record),
        );
    }

    fn finish_released(&self, record: &JobRecord) {
        let now = Utc::now();
        match self.shared.store.release(&record.id, now) {
            Ok(updated) => {
                info!("Job cancelled, released back to pending");
                self.shared.observability.emit(
                    JobEvent::Released {
                        job_id: updated.id.clone(),
                        job_type: updated.job_type.clone(),
                        at: now,
                    },
                    Some(&updated),
                );
            }
            Err(e) => error!(error = %e, "Failed to release cancelled job"),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
