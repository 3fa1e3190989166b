use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, debug, instrument};

use crate::{
    QueueResult, QueueError, QueueConfig, Job, JobError, JobId, JobEvent, JobRecord, EnqueueOptions,
    job::{JobContext, JobHandler, JobRegistry},
    observability::{BoxStream, CacheInvalidator, JobNotifier, MetricsSnapshot, ObservabilityLayer},
    store::{JobStore, MemoryJobStore, RetentionReaper, StateCounts},
    worker::{Worker, WorkerShared},
};

/// One queue instance: job store, handler registry, worker slots and reaper.
///
/// Construct one per workload at the composition root and pass it by
/// handle (`Arc<QueueManager>`) to producers. Instances share nothing.
pub struct QueueManager {
    config: QueueConfig,
    store: Arc<dyn JobStore>,
    registry: Arc<RwLock<JobRegistry>>,
    observability: ObservabilityLayer,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl QueueManager {
    /// Create a queue backed by the in-memory store
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        Self::with_store(config, Arc::new(MemoryJobStore::new()))
    }

    /// Create a queue over a custom store
    pub fn with_store(config: QueueConfig, store: Arc<dyn JobStore>) -> QueueResult<Self> {
        config.validate()?;
        let observability = ObservabilityLayer::new(config.name.clone(), config.event_capacity);

        Ok(Self {
            config,
            store,
            registry: Arc::new(RwLock::new(JobRegistry::new())),
            observability,
            wake: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Attach a best-effort completion/failure notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn JobNotifier>) -> Self {
        self.observability = self.observability.with_notifier(notifier);
        self
    }

    /// Attach a best-effort cache invalidation hook
    pub fn with_cache_invalidator(mut self, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        self.observability = self.observability.with_cache_invalidator(invalidator);
        self
    }

    /// Register a typed job and the context its executions receive
    pub fn register<J: Job>(&self, context: J::Context) -> QueueResult<()> {
        self.registry.write().register::<J>(context)?;
        info!(queue = %self.config.name, job_type = J::JOB_TYPE, "Registered job type");
        Ok(())
    }

    /// Register an async closure for a job type
    pub fn register_fn<F, Fut>(&self, job_type: impl Into<String>, f: F) -> QueueResult<()>
    where
        F: Fn(serde_json::Value, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<serde_json::Value>, JobError>> + Send + 'static,
    {
        let job_type = job_type.into();
        self.registry.write().register_fn(job_type.clone(), f)?;
        info!(queue = %self.config.name, job_type = %job_type, "Registered job type");
        Ok(())
    }

    /// Register any handler implementation
    pub fn register_handler(&self, job_type: impl Into<String>, handler: impl JobHandler + 'static) -> QueueResult<()> {
        let job_type = job_type.into();
        self.registry.write().register_handler(job_type.clone(), handler)?;
        info!(queue = %self.config.name, job_type = %job_type, "Registered job type");
        Ok(())
    }

    /// Spawn the worker slots and the retention reaper
    pub fn start(&self) -> QueueResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::ShuttingDown);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(QueueError::Internal(format!("Queue '{}' already started", self.config.name)));
        }

        let shared = WorkerShared {
            queue: self.config.name.clone(),
            store: self.store.clone(),
            registry: self.registry.clone(),
            observability: self.observability.clone(),
            retry_policy: self.config.retry_policy(),
            default_timeout: self.config.default_timeout,
            fallback_tick: self.config.fallback_tick,
            wake: self.wake.clone(),
            shutdown: self.shutdown.clone(),
        };

        let mut tasks = self.tasks.lock();
        for slot in 0..self.config.workers {
            let worker = Worker::new(slot, shared.clone());
            tasks.push(tokio::spawn(worker.run()));
        }

        let reaper = RetentionReaper::new(
            self.store.clone(),
            self.observability.clone(),
            self.config.retention,
            self.config.reaper_interval,
        );
        tasks.push(tokio::spawn(reaper.run(self.shutdown.clone())));

        info!(queue = %self.config.name, workers = self.config.workers, "Queue started");
        Ok(())
    }

    /// Submit a job; returns as soon as the pending record is stored
    #[instrument(skip(self, payload), fields(queue = %self.config.name))]
    pub fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> QueueResult<JobId> {
        if self.shutdown.is_cancelled() {
            return Err(QueueError::ShuttingDown);
        }
        options.validate()?;

        let now = Utc::now();
        let mut record = JobRecord::new(JobId::new(), job_type, payload, &options, now);
        let job_id = record.id.clone();

        // Unknown types are stored already failed so no worker can ever claim them
        let rejection = if self.registry.read().is_registered(job_type) {
            None
        } else {
            let error = format!("Configuration error: {}", QueueError::JobTypeNotRegistered(job_type.to_string()));
            record.fail(error.clone(), false, now)?;
            Some(error)
        };

        let inserted = match self.config.max_pending {
            Some(max) => self.store.insert_bounded(record.clone(), max),
            None => self.store.insert(record.clone()),
        };
        if let Err(QueueError::QueueFull { pending, max }) = &inserted {
            warn!(pending, max, "Rejecting enqueue, queue is full");
        }
        inserted?;

        self.observability.emit(
            JobEvent::Added {
                job_id: job_id.clone(),
                job_type: job_type.to_string(),
                at: now,
            },
            Some(&record),
        );

        if let Some(error) = rejection {
            warn!(job_id = %job_id, "{}", error);
            self.observability.emit(
                JobEvent::Failed {
                    job_id: job_id.clone(),
                    job_type: job_type.to_string(),
                    attempts: record.attempts,
                    error,
                    duration_ms: None,
                    was_processing: false,
                    at: now,
                },
                Some(&record),
            );
            return Ok(job_id);
        }

        self.wake.notify_one();
        debug!(job_id = %job_id, priority = %options.priority, "Enqueued job");
        Ok(job_id)
    }

    /// Submit a typed job with its type-level priority and attempt defaults
    pub fn enqueue_job<J: Job>(&self, job: &J) -> QueueResult<JobId> {
        self.enqueue_job_with(job, job.options())
    }

    /// Submit a typed job with explicit options
    pub fn enqueue_job_with<J: Job>(&self, job: &J, options: EnqueueOptions) -> QueueResult<JobId> {
        let payload = serde_json::to_value(job)?;
        self.enqueue(J::JOB_TYPE, payload, options)
    }

    /// Snapshot of a job record
    pub fn get_status(&self, job_id: &JobId) -> QueueResult<JobRecord> {
        self.store.get(job_id)
    }

    /// Snapshot of the queue metrics
    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.observability.snapshot()
    }

    /// Records per state
    pub fn counts(&self) -> StateCounts {
        self.store.counts()
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.observability.subscribe()
    }

    /// Lifecycle events as a stream
    pub fn event_stream(&self) -> BoxStream<JobEvent> {
        self.observability.event_stream()
    }

    /// Run one retention sweep now
    pub fn reap_now(&self) -> usize {
        RetentionReaper::new(
            self.store.clone(),
            self.observability.clone(),
            self.config.retention,
            self.config.reaper_interval,
        )
        .reap_expired()
    }

    /// Stop claiming, cancel handler tokens, and wait for in-flight jobs to settle
    pub async fn shutdown(&self) -> QueueResult<()> {
        info!(queue = %self.config.name, "Shutting down queue");
        self.shutdown.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            task.await
                .map_err(|e| QueueError::Internal(format!("Worker join error: {}", e)))?;
        }

        let in_flight = self.observability.metrics().currently_processing();
        if in_flight != 0 {
            warn!(queue = %self.config.name, in_flight, "Jobs still marked processing after shutdown");
        }
        info!(queue = %self.config.name, "Queue stopped");
        Ok(())
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Get configuration
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get the handler registry
    pub fn registered_types(&self) -> Vec<String> {
        self.registry.read().registered_types()
    }
}
