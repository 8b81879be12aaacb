//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `live + queued` already sits at the hard in-flight cap.
    #[error("capacity exceeded: {max_in_flight} requests in flight")]
    CapacityExceeded {
        /// Configured cap.
        max_in_flight: usize,
    },
    /// The scheduler has been stopped.
    #[error("scheduler is shut down")]
    Shutdown,
    /// The priority queue refused an entry.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
