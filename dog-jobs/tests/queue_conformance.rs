use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_test::{assert_err, assert_ok};

use dog_jobs::{
    CacheInvalidator, CallbackError, EnqueueOptions, JobContext, JobError, JobEvent, JobId,
    JobNotifier, JobPriority, JobRecord, JobState, QueueConfig, QueueError, QueueManager,
};

/// Fast backoff and a short idle tick so tests settle quickly
fn test_config(workers: usize) -> QueueConfig {
    QueueConfig::default()
        .with_name("conformance")
        .with_workers(workers)
        .with_retry_backoff(Duration::from_millis(10), Duration::from_millis(100))
        .with_fallback_tick(Duration::from_millis(20))
}

async fn wait_for_terminal(queue: &QueueManager, job_id: &JobId) -> JobRecord {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let record = queue.get_status(job_id).expect("job should exist");
            if record.state.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Timeout waiting for terminal state")
}

async fn wait_for_state(queue: &QueueManager, job_id: &JobId, state: JobState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while queue.get_status(job_id).expect("job should exist").state != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Timeout waiting for state");
}

fn drain(receiver: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

/// A freshly enqueued job is pending, unattempted, and eligible no later than now + delay
#[test]
fn test_enqueue_round_trip() {
    let queue = QueueManager::new(test_config(1)).unwrap();
    queue.register_fn("document_ocr", |_payload, _job| async move { Ok(None) }).unwrap();

    let delay = Duration::from_secs(30);
    let options = EnqueueOptions::default()
        .with_priority(JobPriority::HIGH)
        .with_initial_delay(delay);
    let job_id = assert_ok!(queue.enqueue("document_ocr", json!({"document_id": "doc-1"}), options));
    let after = Utc::now();

    let record = queue.get_status(&job_id).unwrap();
    assert_eq!(record.state, JobState::Pending);
    assert_eq!(record.attempts, 0);
    assert_eq!(record.max_attempts, 3);
    assert_eq!(record.priority, JobPriority::HIGH);
    assert_eq!(record.payload, json!({"document_id": "doc-1"}));
    assert!(record.next_eligible_at <= after + chrono::Duration::from_std(delay).unwrap());
    assert!(record.next_eligible_at > record.created_at);
}

#[test]
fn test_unknown_job_id() {
    let queue = QueueManager::new(test_config(1)).unwrap();
    let error = assert_err!(queue.get_status(&JobId::from("missing")));
    assert_eq!(error, QueueError::JobNotFound("missing".to_string()));
}

/// Unregistered types fail at enqueue without consuming an attempt
#[tokio::test]
async fn test_unregistered_type_fails_immediately() {
    let queue = QueueManager::new(test_config(1)).unwrap();
    let mut events = queue.subscribe();

    let job_id = assert_ok!(queue.enqueue("no_such_type", json!({}), EnqueueOptions::default()));

    let record = queue.get_status(&job_id).unwrap();
    assert_eq!(record.state, JobState::Failed);
    assert_eq!(record.attempts, 0);
    assert!(record.failed_at.is_some());
    assert!(record.last_error.unwrap().contains("no_such_type"));

    let events = drain(&mut events);
    assert!(matches!(events.as_slice(), [
        JobEvent::Added { .. },
        JobEvent::Failed { was_processing: false, attempts: 0, .. },
    ]));
    assert_eq!(queue.get_metrics().total_failed, 1);
}

/// A handler that always errors ends FAILED after exactly max_attempts tries
#[tokio::test]
async fn test_always_failing_handler_exhausts_attempts() {
    let queue = QueueManager::new(test_config(2)).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    queue
        .register_fn("liveness_check", move |_payload, _job| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(JobError::retryable("scoring service unavailable"))
            }
        })
        .unwrap();
    queue.start().unwrap();

    let job_id = queue
        .enqueue("liveness_check", json!({}), EnqueueOptions::default().with_max_attempts(2))
        .unwrap();
    let record = wait_for_terminal(&queue, &job_id).await;

    assert_eq!(record.state, JobState::Failed);
    assert_eq!(record.attempts, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(record.last_error.unwrap().contains("scoring service unavailable"));

    let metrics = queue.get_metrics();
    assert_eq!(metrics.total_retried, 1);
    assert_eq!(metrics.total_failed, 1);
    queue.shutdown().await.unwrap();
}

/// attempts never exceeds max_attempts, whatever the limit
#[tokio::test]
async fn test_attempts_never_exceed_max() {
    let queue = QueueManager::new(test_config(3)).unwrap();
    queue
        .register_fn("flaky", |_payload, _job| async move { Err(JobError::retryable("flaky")) })
        .unwrap();
    let mut events = queue.subscribe();
    queue.start().unwrap();

    let mut jobs = Vec::new();
    for max_attempts in 1..=4 {
        let options = EnqueueOptions::default().with_max_attempts(max_attempts);
        jobs.push((queue.enqueue("flaky", json!({}), options).unwrap(), max_attempts));
    }

    for (job_id, max_attempts) in &jobs {
        let record = wait_for_terminal(&queue, job_id).await;
        assert_eq!(record.attempts, *max_attempts);
    }

    for event in drain(&mut events) {
        if let JobEvent::Retried { job_id, attempts, .. } | JobEvent::Failed { job_id, attempts, .. } = &event {
            let (_, max_attempts) = jobs.iter().find(|(id, _)| id == job_id).unwrap();
            assert!(attempts <= max_attempts, "{:?} exceeded {}", event, max_attempts);
        }
    }
    queue.shutdown().await.unwrap();
}

/// Successive retries wait base, 2*base, 4*base
#[tokio::test]
async fn test_retry_backoff_doubles() {
    let config = test_config(1).with_retry_backoff(Duration::from_millis(20), Duration::from_secs(5));
    let queue = QueueManager::new(config).unwrap();
    queue
        .register_fn("profile_match", |_payload, _job| async move { Err(JobError::retryable("index warming up")) })
        .unwrap();
    let mut events = queue.subscribe();
    queue.start().unwrap();

    let job_id = queue
        .enqueue("profile_match", json!({}), EnqueueOptions::default().with_max_attempts(4))
        .unwrap();
    wait_for_terminal(&queue, &job_id).await;

    let delays: Vec<(u32, i64)> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            JobEvent::Retried { attempts, retry_at, at, .. } => {
                Some((attempts, (retry_at - at).num_milliseconds()))
            }
            _ => None,
        })
        .collect();

    assert_eq!(delays, vec![(1, 20), (2, 40), (3, 80)]);
    queue.shutdown().await.unwrap();
}

/// With one worker, a priority-10 job finishes before a priority-1 job starts
#[tokio::test]
async fn test_priority_order_with_single_worker() {
    let queue = QueueManager::new(test_config(1)).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let recorder = log.clone();
    queue
        .register_fn("recommendation_refresh", move |payload: serde_json::Value, _job| {
            let recorder = recorder.clone();
            async move {
                let name = payload["name"].as_str().unwrap_or_default().to_string();
                recorder.lock().push(format!("start:{}", name));
                tokio::time::sleep(Duration::from_millis(20)).await;
                recorder.lock().push(format!("end:{}", name));
                Ok(None)
            }
        })
        .unwrap();

    let low = queue
        .enqueue("recommendation_refresh", json!({"name": "low"}), EnqueueOptions::default().with_priority(1))
        .unwrap();
    let high = queue
        .enqueue("recommendation_refresh", json!({"name": "high"}), EnqueueOptions::default().with_priority(10))
        .unwrap();
    let fifo = queue
        .enqueue("recommendation_refresh", json!({"name": "high-later"}), EnqueueOptions::default().with_priority(10))
        .unwrap();
    queue.start().unwrap();

    for job_id in [&low, &high, &fifo] {
        assert_eq!(wait_for_terminal(&queue, job_id).await.state, JobState::Completed);
    }

    assert_eq!(
        *log.lock(),
        vec![
            "start:high", "end:high",
            "start:high-later", "end:high-later",
            "start:low", "end:low",
        ]
    );
    queue.shutdown().await.unwrap();
}

/// Many workers racing over many jobs: every job runs exactly once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_double_claims() {
    let config = QueueConfig {
        event_capacity: 4096,
        ..test_config(8)
    };
    let queue = QueueManager::new(config).unwrap();
    let executions: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));
    let recorder = executions.clone();
    queue
        .register_fn("document_ocr", move |_payload, job: JobContext| {
            let recorder = recorder.clone();
            async move {
                *recorder.lock().entry(job.job_id.to_string()).or_default() += 1;
                tokio::task::yield_now().await;
                Ok(None)
            }
        })
        .unwrap();
    let mut events = queue.subscribe();
    queue.start().unwrap();

    let jobs: Vec<JobId> = (0..200)
        .map(|i| {
            let options = EnqueueOptions::default().with_priority(i % 5);
            queue.enqueue("document_ocr", json!({"page": i}), options).unwrap()
        })
        .collect();

    for job_id in &jobs {
        let record = wait_for_terminal(&queue, job_id).await;
        assert_eq!(record.state, JobState::Completed);
        assert_eq!(record.attempts, 1);
    }

    let executions = executions.lock();
    assert_eq!(executions.len(), jobs.len());
    assert!(executions.values().all(|count| *count == 1));

    let mut claims: HashMap<JobId, usize> = HashMap::new();
    for event in drain(&mut events) {
        if let JobEvent::Claimed { job_id, .. } = event {
            *claims.entry(job_id).or_default() += 1;
        }
    }
    assert_eq!(claims.len(), jobs.len());
    assert!(claims.values().all(|count| *count == 1));

    assert_eq!(queue.counts().completed, jobs.len());
    queue.shutdown().await.unwrap();
}

/// The reaper removes old terminal jobs and nothing else
#[tokio::test]
async fn test_reaper_spares_pending_and_processing() {
    let config = test_config(1).with_retention(Duration::ZERO, Duration::from_secs(3600));
    let queue = QueueManager::new(config).unwrap();
    queue.register_fn("quick", |_payload, _job| async move { Ok(None) }).unwrap();
    queue
        .register_fn("slow", |_payload, _job| async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(None)
        })
        .unwrap();
    queue.start().unwrap();

    let done = queue.enqueue("quick", json!({}), EnqueueOptions::default()).unwrap();
    wait_for_terminal(&queue, &done).await;

    let running = queue.enqueue("slow", json!({}), EnqueueOptions::default()).unwrap();
    wait_for_state(&queue, &running, JobState::Processing).await;

    let delayed = queue
        .enqueue("quick", json!({}), EnqueueOptions::default().with_initial_delay(Duration::from_secs(60)))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(queue.reap_now(), 1);

    assert_err!(queue.get_status(&done));
    assert_eq!(queue.get_status(&running).unwrap().state, JobState::Processing);
    assert_eq!(queue.get_status(&delayed).unwrap().state, JobState::Pending);
    assert_eq!(queue.get_metrics().total_reaped, 1);
    queue.shutdown().await.unwrap();
}

/// Shutdown waits for handlers that run to completion
#[tokio::test]
async fn test_shutdown_waits_for_in_flight_jobs() {
    let queue = QueueManager::new(test_config(2)).unwrap();
    queue
        .register_fn("liveness_check", |_payload, _job| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(Some(json!({"score": 0.97})))
        })
        .unwrap();
    queue.start().unwrap();

    let job_id = queue.enqueue("liveness_check", json!({}), EnqueueOptions::default()).unwrap();
    wait_for_state(&queue, &job_id, JobState::Processing).await;

    queue.shutdown().await.unwrap();

    let record = queue.get_status(&job_id).unwrap();
    assert_eq!(record.state, JobState::Completed);
    assert_eq!(record.result, Some(json!({"score": 0.97})));
    assert_eq!(queue.get_metrics().currently_processing, 0);
}

/// Handlers that honor cancellation are released without losing an attempt
#[tokio::test]
async fn test_shutdown_releases_cancelled_jobs() {
    let queue = QueueManager::new(test_config(1)).unwrap();
    queue
        .register_fn("recommendation_refresh", |_payload, job: JobContext| async move {
            tokio::select! {
                _ = job.cancelled() => Err(JobError::Cancelled),
                _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(None),
            }
        })
        .unwrap();
    queue.start().unwrap();

    let job_id = queue
        .enqueue("recommendation_refresh", json!({}), EnqueueOptions::default())
        .unwrap();
    wait_for_state(&queue, &job_id, JobState::Processing).await;

    tokio::time::timeout(Duration::from_secs(2), queue.shutdown())
        .await
        .expect("shutdown should not wait for the full handler")
        .unwrap();

    let record = queue.get_status(&job_id).unwrap();
    assert_eq!(record.state, JobState::Pending);
    assert_eq!(record.attempts, 0);
    assert_eq!(queue.get_metrics().currently_processing, 0);
}

struct FailingNotifier {
    calls: AtomicUsize,
}

#[async_trait]
impl JobNotifier for FailingNotifier {
    async fn notify(&self, _event: &JobEvent, _record: &JobRecord) -> Result<(), CallbackError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err("push gateway unreachable".into())
    }
}

struct SlowInvalidator {
    invalidated: Mutex<Vec<JobId>>,
}

#[async_trait]
impl CacheInvalidator for SlowInvalidator {
    async fn invalidate(&self, record: &JobRecord) -> Result<(), CallbackError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.invalidated.lock().push(record.id.clone());
        Ok(())
    }
}

/// Failing or slow callbacks never change job outcomes
#[tokio::test]
async fn test_callbacks_do_not_interfere() {
    let notifier = Arc::new(FailingNotifier { calls: AtomicUsize::new(0) });
    let invalidator = Arc::new(SlowInvalidator { invalidated: Mutex::new(Vec::new()) });
    let queue = QueueManager::new(test_config(1))
        .unwrap()
        .with_notifier(notifier.clone())
        .with_cache_invalidator(invalidator.clone());
    queue.register_fn("profile_match", |_payload, _job| async move { Ok(Some(json!(["p-1", "p-2"]))) }).unwrap();
    queue
        .register_fn("document_ocr", |_payload, _job| async move { Err(JobError::permanent("unreadable scan")) })
        .unwrap();
    queue.start().unwrap();

    let matched = queue.enqueue("profile_match", json!({}), EnqueueOptions::default()).unwrap();
    let rejected = queue.enqueue("document_ocr", json!({}), EnqueueOptions::default()).unwrap();

    assert_eq!(wait_for_terminal(&queue, &matched).await.state, JobState::Completed);
    let rejected = wait_for_terminal(&queue, &rejected).await;
    assert_eq!(rejected.state, JobState::Failed);
    assert_eq!(rejected.attempts, 1);

    tokio::time::timeout(Duration::from_secs(2), async {
        while notifier.calls.load(Ordering::SeqCst) < 2 || invalidator.invalidated.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("callbacks should eventually run");

    assert_eq!(*invalidator.invalidated.lock(), vec![matched.clone()]);
    assert_eq!(queue.get_status(&matched).unwrap().result, Some(json!(["p-1", "p-2"])));
    queue.shutdown().await.unwrap();
}

/// Two instances share no state: types, records and metrics stay separate
#[tokio::test]
async fn test_queue_instances_are_independent() {
    let verification = QueueManager::new(QueueConfig::verification().with_fallback_tick(Duration::from_millis(20))).unwrap();
    let recommendation = QueueManager::new(QueueConfig::recommendation().with_fallback_tick(Duration::from_millis(20))).unwrap();
    verification.register_fn("document_ocr", |_payload, _job| async move { Ok(None) }).unwrap();
    recommendation.register_fn("profile_match", |_payload, _job| async move { Ok(None) }).unwrap();
    verification.start().unwrap();
    recommendation.start().unwrap();

    let ocr = verification.enqueue("document_ocr", json!({}), EnqueueOptions::default()).unwrap();
    let misrouted = recommendation.enqueue("document_ocr", json!({}), EnqueueOptions::default()).unwrap();

    assert_eq!(wait_for_terminal(&verification, &ocr).await.state, JobState::Completed);
    assert_eq!(recommendation.get_status(&misrouted).unwrap().state, JobState::Failed);
    assert!(recommendation.get_status(&ocr).is_err());

    assert_eq!(verification.get_metrics().total_completed, 1);
    assert_eq!(recommendation.get_metrics().total_completed, 0);
    assert_eq!(recommendation.registered_types(), vec!["profile_match".to_string()]);

    verification.shutdown().await.unwrap();
    assert!(!recommendation.is_shutdown());
    recommendation.shutdown().await.unwrap();
}

/// Lifecycle events arrive in order on the event stream
#[tokio::test]
async fn test_event_stream_lifecycle() {
    let queue = QueueManager::new(test_config(1)).unwrap();
    queue
        .register_fn("document_ocr", |_payload, job: JobContext| async move {
            if job.attempt == 1 {
                return Err(JobError::retryable("ocr backend timeout"));
            }
            Ok(Some(json!({"text": "JANE DOE"})))
        })
        .unwrap();
    let mut stream = queue.event_stream();
    queue.start().unwrap();

    let job_id = queue.enqueue("document_ocr", json!({}), EnqueueOptions::default()).unwrap();

    let mut names = Vec::new();
    while names.last() != Some(&"completed") {
        let event = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("Timeout waiting for event")
            .expect("Stream ended");
        assert_eq!(event.job_id(), &job_id);
        names.push(event.event_name());
    }

    assert_eq!(names, vec!["added", "claimed", "retried", "claimed", "completed"]);
    queue.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_enqueue_after_shutdown_rejected() {
    let queue = QueueManager::new(test_config(1)).unwrap();
    queue.start().unwrap();
    queue.shutdown().await.unwrap();

    assert_eq!(
        queue.enqueue("document_ocr", json!({}), EnqueueOptions::default()),
        Err(QueueError::ShuttingDown)
    );
}
