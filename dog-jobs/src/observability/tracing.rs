//! Subscriber bootstrap for binaries embedding a queue.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber driven by `RUST_LOG`.
///
/// Falls back to `info,dog_jobs=debug` when `RUST_LOG` is unset. `json`
/// switches to structured JSON lines. Safe to call more than once;
/// later calls are no-ops.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dog_jobs=debug"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
