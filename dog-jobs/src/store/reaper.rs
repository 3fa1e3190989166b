use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, debug, warn};

use crate::{
    JobEvent,
    observability::ObservabilityLayer,
    store::JobStore,
};

/// Retention reaper deleting terminal jobs past the retention window
pub struct RetentionReaper {
    store: Arc<dyn JobStore>,
    observability: ObservabilityLayer,
    retention: Duration,
    interval: Duration,
}

impl RetentionReaper {
    /// Create a new reaper
    pub fn new(
        store: Arc<dyn JobStore>,
        observability: ObservabilityLayer,
        retention: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            observability,
            retention,
            interval,
        }
    }

    /// Sweep on every interval tick until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; nothing is old enough yet
        ticker.tick().await;

        info!("Starting retention reaper with interval: {:?}, retention: {:?}", self.interval, self.retention);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.reap_expired();
                }
            }
        }

        debug!("Retention reaper stopped");
    }

    /// Run one sweep, returning the number of deleted records
    pub fn reap_expired(&self) -> usize {
        let now = Utc::now();
        let cutoff = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention));
        let Some(cutoff) = cutoff else {
            warn!("Retention window out of range, skipping sweep: {:?}", self.retention);
            return 0;
        };

        let reaped = self.store.sweep_terminal_older_than(cutoff);
        for job_id in &reaped {
            self.observability.emit(JobEvent::Reaped { job_id: job_id.clone(), at: now }, None);
        }

        if reaped.is_empty() {
            debug!("No expired jobs found");
        } else {
            info!("Reaped {} expired jobs", reaped.len());
        }
        reaped.len()
    }
}
