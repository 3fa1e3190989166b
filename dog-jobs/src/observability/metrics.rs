use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::JobEvent;

/// Live metrics for one queue instance, fed by lifecycle events
pub struct LiveMetrics {
    total_enqueued: AtomicU64,
    total_completed: AtomicU64,
    total_failed: AtomicU64,
    total_retried: AtomicU64,
    total_reaped: AtomicU64,
    currently_processing: AtomicU64,

    // Handler run time, summed over every finished execution
    processing_micros: AtomicU64,
    processing_samples: AtomicU64,

    // Per-job-type metrics
    job_type_metrics: RwLock<HashMap<String, JobTypeMetrics>>,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self {
            total_enqueued: AtomicU64::new(0),
            total_completed: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
            total_retried: AtomicU64::new(0),
            total_reaped: AtomicU64::new(0),
            currently_processing: AtomicU64::new(0),
            processing_micros: AtomicU64::new(0),
            processing_samples: AtomicU64::new(0),
            job_type_metrics: RwLock::new(HashMap::new()),
        }
    }

    /// Apply one lifecycle event
    pub fn observe(&self, event: &JobEvent) {
        match event {
            JobEvent::Added { job_type, .. } => {
                self.total_enqueued.fetch_add(1, Ordering::Relaxed);
                self.update_job_type(job_type, |m| m.enqueued += 1);
            }
            JobEvent::Claimed { .. } => {
                self.currently_processing.fetch_add(1, Ordering::Relaxed);
            }
            JobEvent::Completed { job_type, duration_ms, .. } => {
                self.total_completed.fetch_add(1, Ordering::Relaxed);
                self.leave_processing();
                self.record_duration(*duration_ms);
                self.update_job_type(job_type, |m| m.completed += 1);
            }
            JobEvent::Retried { job_type, duration_ms, .. } => {
                self.total_retried.fetch_add(1, Ordering::Relaxed);
                self.leave_processing();
                self.record_duration(*duration_ms);
                self.update_job_type(job_type, |m| m.retried += 1);
            }
            JobEvent::Failed { job_type, duration_ms, was_processing, .. } => {
                self.total_failed.fetch_add(1, Ordering::Relaxed);
                if *was_processing {
                    self.leave_processing();
                }
                if let Some(duration_ms) = duration_ms {
                    self.record_duration(*duration_ms);
                }
                self.update_job_type(job_type, |m| m.failed += 1);
            }
            JobEvent::Released { .. } => {
                self.leave_processing();
            }
            JobEvent::Reaped { .. } => {
                self.total_reaped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn leave_processing(&self) {
        let _ = self.currently_processing.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
            Some(n.saturating_sub(1))
        });
    }

    fn record_duration(&self, duration_ms: u64) {
        self.processing_micros.fetch_add(duration_ms.saturating_mul(1000), Ordering::Relaxed);
        self.processing_samples.fetch_add(1, Ordering::Relaxed);
    }

    fn update_job_type(&self, job_type: &str, f: impl FnOnce(&mut JobTypeMetrics)) {
        let mut metrics = self.job_type_metrics.write();
        f(metrics.entry(job_type.to_string()).or_default());
    }

    pub fn total_enqueued(&self) -> u64 {
        self.total_enqueued.load(Ordering::Relaxed)
    }

    pub fn total_completed(&self) -> u64 {
        self.total_completed.load(Ordering::Relaxed)
    }

    pub fn total_failed(&self) -> u64 {
        self.total_failed.load(Ordering::Relaxed)
    }

    pub fn currently_processing(&self) -> u64 {
        self.currently_processing.load(Ordering::Relaxed)
    }

    /// Running average handler duration
    pub fn average_processing_time(&self) -> Option<Duration> {
        let samples = self.processing_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return None;
        }
        let micros = self.processing_micros.load(Ordering::Relaxed);
        Some(Duration::from_micros(micros / samples))
    }

    /// Get metrics for a specific job type
    pub fn job_type_metrics(&self, job_type: &str) -> Option<JobTypeMetrics> {
        self.job_type_metrics.read().get(job_type).cloned()
    }

    /// Collect current snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            total_enqueued: self.total_enqueued(),
            total_completed: self.total_completed(),
            total_failed: self.total_failed(),
            total_retried: self.total_retried.load(Ordering::Relaxed),
            total_reaped: self.total_reaped.load(Ordering::Relaxed),
            currently_processing: self.currently_processing(),
            average_processing_time: self.average_processing_time(),
            job_types: self.job_type_metrics.read().clone(),
        }
    }
}

impl Default for LiveMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics for a specific job type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobTypeMetrics {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
}

impl JobTypeMetrics {
    /// completed / (completed + failed); 1.0 before anything finished
    pub fn success_rate(&self) -> f64 {
        success_rate(self.completed, self.failed)
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_enqueued: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_retried: u64,
    pub total_reaped: u64,
    pub currently_processing: u64,
    pub average_processing_time: Option<Duration>,
    pub job_types: HashMap<String, JobTypeMetrics>,
}

impl MetricsSnapshot {
    /// completed / (completed + failed); 1.0 before anything finished
    pub fn success_rate(&self) -> f64 {
        success_rate(self.total_completed, self.total_failed)
    }
}

fn success_rate(completed: u64, failed: u64) -> f64 {
    let total_processed = completed + failed;
    if total_processed == 0 {
        1.0
    } else {
        completed as f64 / total_processed as f64
    }
}
