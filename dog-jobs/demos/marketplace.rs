//! Two independent queues for a marketplace backend.
//!
//! The verification queue runs document OCR and liveness scoring; the
//! recommendation queue runs profile matching and feed refreshes. Each is
//! built once here and handed to producers as an `Arc<QueueManager>`.
//!
//! Run with `cargo run --example marketplace --features tracing-basic`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dog_jobs::observability::init_tracing;
use dog_jobs::prelude::*;
use dog_jobs::{CacheInvalidator, CallbackError, JobEvent, JobNotifier};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Stand-in for the OCR and scoring vendors
#[derive(Clone)]
struct VerificationClients {
    ocr_endpoint: String,
}

/// Stand-in for the matching index
#[derive(Clone)]
struct MatchingIndex {
    candidates: Arc<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DocumentOcr {
    user_id: String,
    document_id: String,
}

#[async_trait]
impl Job for DocumentOcr {
    type Context = VerificationClients;
    type Output = serde_json::Value;

    const JOB_TYPE: &'static str = "document_ocr";
    const PRIORITY: JobPriority = JobPriority::HIGH;
    const TIMEOUT: Option<Duration> = Some(Duration::from_secs(30));

    async fn execute(&self, ctx: VerificationClients, job: &JobContext) -> Result<serde_json::Value, JobError> {
        info!(endpoint = %ctx.ocr_endpoint, document_id = %self.document_id, attempt = job.attempt, "Extracting document text");
        tokio::time::sleep(Duration::from_millis(150)).await;

        // The vendor rate-limits first calls; the second attempt goes through
        if job.attempt == 1 {
            return Err(JobError::retryable("OCR vendor returned 429"));
        }
        Ok(serde_json::json!({ "user_id": self.user_id, "full_name": "JANE DOE" }))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LivenessCheck {
    user_id: String,
    selfie_id: String,
}

#[async_trait]
impl Job for LivenessCheck {
    type Context = VerificationClients;
    type Output = f64;

    const JOB_TYPE: &'static str = "liveness_check";
    const PRIORITY: JobPriority = JobPriority::CRITICAL;
    const MAX_ATTEMPTS: u32 = 2;

    async fn execute(&self, _ctx: VerificationClients, _job: &JobContext) -> Result<f64, JobError> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if self.selfie_id.is_empty() {
            return Err(JobError::permanent("missing selfie"));
        }
        Ok(0.97)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ProfileMatch {
    user_id: String,
}

#[async_trait]
impl Job for ProfileMatch {
    type Context = MatchingIndex;
    type Output = Vec<String>;

    const JOB_TYPE: &'static str = "profile_match";

    async fn execute(&self, ctx: MatchingIndex, job: &JobContext) -> Result<Vec<String>, JobError> {
        let mut matches = Vec::new();
        for candidate in ctx.candidates.iter().filter(|c| **c != self.user_id) {
            if job.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            matches.push(candidate.clone());
        }
        Ok(matches)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RecommendationRefresh {
    user_id: String,
}

#[async_trait]
impl Job for RecommendationRefresh {
    type Context = MatchingIndex;
    type Output = ();

    const JOB_TYPE: &'static str = "recommendation_refresh";
    const PRIORITY: JobPriority = JobPriority::LOW;

    async fn execute(&self, _ctx: MatchingIndex, job: &JobContext) -> Result<(), JobError> {
        tokio::select! {
            _ = job.cancelled() => Err(JobError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(200)) => Ok(()),
        }
    }
}

struct LogNotifier;

#[async_trait]
impl JobNotifier for LogNotifier {
    async fn notify(&self, event: &JobEvent, record: &JobRecord) -> Result<(), CallbackError> {
        info!(queue_event = event.event_name(), job_id = %record.id, job_type = %record.job_type, "Notifying user");
        Ok(())
    }
}

struct ProfileCache;

#[async_trait]
impl CacheInvalidator for ProfileCache {
    async fn invalidate(&self, record: &JobRecord) -> Result<(), CallbackError> {
        info!(job_id = %record.id, job_type = %record.job_type, "Invalidating cached profile");
        Ok(())
    }
}

async fn wait_until_settled(queue: &QueueManager, jobs: &[JobId]) -> Result<()> {
    loop {
        let mut settled = true;
        for job_id in jobs {
            settled &= queue.get_status(job_id)?.state.is_terminal();
        }
        if settled {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(std::env::var("LOG_JSON").is_ok());

    let verification = Arc::new(
        QueueManager::new(QueueConfig::verification().with_max_pending(1_000))?
            .with_notifier(Arc::new(LogNotifier))
            .with_cache_invalidator(Arc::new(ProfileCache)),
    );
    let clients = VerificationClients { ocr_endpoint: "https://ocr.internal/v2".to_string() };
    verification.register::<DocumentOcr>(clients.clone())?;
    verification.register::<LivenessCheck>(clients)?;

    let recommendation = Arc::new(
        QueueManager::new(QueueConfig::recommendation())?.with_cache_invalidator(Arc::new(ProfileCache)),
    );
    let index = MatchingIndex {
        candidates: Arc::new(vec!["u-1".into(), "u-2".into(), "u-3".into()]),
    };
    recommendation.register::<ProfileMatch>(index.clone())?;
    recommendation.register::<RecommendationRefresh>(index)?;

    verification.start()?;
    recommendation.start()?;

    let verification_jobs = vec![
        verification.enqueue_job(&DocumentOcr { user_id: "u-1".into(), document_id: "passport-7".into() })?,
        verification.enqueue_job(&LivenessCheck { user_id: "u-1".into(), selfie_id: "selfie-3".into() })?,
        verification.enqueue_job(&LivenessCheck { user_id: "u-2".into(), selfie_id: String::new() })?,
    ];
    let recommendation_jobs = vec![
        recommendation.enqueue_job(&ProfileMatch { user_id: "u-1".into() })?,
        recommendation.enqueue_job_with(
            &RecommendationRefresh { user_id: "u-1".into() },
            EnqueueOptions::default().with_initial_delay(Duration::from_millis(500)),
        )?,
    ];

    wait_until_settled(&verification, &verification_jobs).await?;
    wait_until_settled(&recommendation, &recommendation_jobs).await?;

    for (queue, jobs) in [(&verification, &verification_jobs), (&recommendation, &recommendation_jobs)] {
        for job_id in jobs.iter() {
            let record = queue.get_status(job_id)?;
            info!(
                queue = queue.name(),
                job_type = %record.job_type,
                state = %record.state,
                attempts = record.attempts,
                result = ?record.result,
                error = ?record.last_error,
                "Job settled"
            );
        }
        let metrics = queue.get_metrics();
        info!(
            queue = queue.name(),
            completed = metrics.total_completed,
            failed = metrics.total_failed,
            retried = metrics.total_retried,
            success_rate = metrics.success_rate(),
            "Queue metrics"
        );
    }

    verification.shutdown().await?;
    recommendation.shutdown().await?;
    Ok(())
}
