pub mod metrics;
pub mod events;

#[cfg(feature = "tracing-basic")]
pub mod tracing;

pub use metrics::{LiveMetrics, MetricsSnapshot, JobTypeMetrics};
pub use events::{ObservabilityLayer, JobNotifier, CacheInvalidator, CallbackError, BoxStream};

#[cfg(feature = "tracing-basic")]
pub use self::tracing::init_tracing;
