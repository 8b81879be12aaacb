//! Tracing bootstrap for binaries and tests embedding the scheduler.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "prometheus_qos_scheduler=info";

/// Install a fmt subscriber filtered by `RUST_LOG` (or [`DEFAULT_DIRECTIVE`]).
///
/// Does nothing if a global subscriber is already set, so it is safe to call
/// from every test.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_DIRECTIVE);
}

/// Like [`init_tracing`] with a caller-chosen fallback directive.
pub fn init_tracing_with(default_directive: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
