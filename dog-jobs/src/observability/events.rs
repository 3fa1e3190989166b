use std::pin::Pin;
use std::sync::Arc;
use async_trait::async_trait;
use futures_core::Stream;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{JobEvent, JobRecord};
use super::{LiveMetrics, MetricsSnapshot};

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Error type returned by best-effort callbacks
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Best-effort notification hook, called when a job completes or fails
#[async_trait]
pub trait JobNotifier: Send + Sync {
    async fn notify(&self, event: &JobEvent, record: &JobRecord) -> Result<(), CallbackError>;
}

/// Best-effort cache invalidation hook, called when a job completes
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, record: &JobRecord) -> Result<(), CallbackError>;
}

/// Lifecycle event fan-out for one queue instance
///
/// Metrics are updated inline; the broadcast channel and callbacks are
/// fire-and-forget and can never affect job state.
#[derive(Clone)]
pub struct ObservabilityLayer {
    queue: String,
    event_broadcaster: broadcast::Sender<JobEvent>,
    metrics: Arc<LiveMetrics>,
    notifier: Option<Arc<dyn JobNotifier>>,
    cache_invalidator: Option<Arc<dyn CacheInvalidator>>,
}

impl ObservabilityLayer {
    /// Create new observability layer
    pub fn new(queue: impl Into<String>, capacity: usize) -> Self {
        let (event_broadcaster, _) = broadcast::channel(capacity.max(1));

        Self {
            queue: queue.into(),
            event_broadcaster,
            metrics: Arc::new(LiveMetrics::new()),
            notifier: None,
            cache_invalidator: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn JobNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_cache_invalidator(mut self, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        self.cache_invalidator = Some(invalidator);
        self
    }

    /// Publish an event; `record` is the post-transition snapshot when there is one
    pub fn emit(&self, event: JobEvent, record: Option<&JobRecord>) {
        self.metrics.observe(&event);
        debug!(queue = %self.queue, job_id = %event.job_id(), event = event.event_name(), "Job event");

        if let Some(record) = record {
            self.dispatch_callbacks(&event, record);
        }

        // No subscribers is fine
        let _ = self.event_broadcaster.send(event);
    }

    fn dispatch_callbacks(&self, event: &JobEvent, record: &JobRecord) {
        let notifier = self.notifier.clone().filter(|_| event.is_terminal());
        let invalidator = self
            .cache_invalidator
            .clone()
            .filter(|_| matches!(event, JobEvent::Completed { .. }));

        if notifier.is_none() && invalidator.is_none() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(queue = %self.queue, job_id = %record.id, "No runtime available, skipping job callbacks");
            return;
        };

        let queue = self.queue.clone();
        let event = event.clone();
        let record = record.clone();

        runtime.spawn(async move {
            if let Some(notifier) = notifier {
                if let Err(e) = notifier.notify(&event, &record).await {
                    warn!(queue = %queue, job_id = %record.id, error = %e, "Job notifier failed");
                }
            }
            if let Some(invalidator) = invalidator {
                if let Err(e) = invalidator.invalidate(&record).await {
                    warn!(queue = %queue, job_id = %record.id, error = %e, "Cache invalidation failed");
                }
            }
        });
    }

    /// Subscribe to raw lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_broadcaster.subscribe()
    }

    /// Lifecycle events as a stream; lagged events are dropped
    pub fn event_stream(&self) -> BoxStream<JobEvent> {
        use tokio_stream::{wrappers::BroadcastStream, StreamExt};

        let stream = BroadcastStream::new(self.event_broadcaster.subscribe())
            .filter_map(|result| result.ok());

        Box::pin(stream)
    }

    /// Get live metrics
    pub fn metrics(&self) -> &LiveMetrics {
        &self.metrics
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
