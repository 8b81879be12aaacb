//! Tests for error types

use std::io;

use prometheus_qos_scheduler::core::SchedulerError;

#[test]
fn test_capacity_exceeded_error() {
    let err = SchedulerError::CapacityExceeded { max_in_flight: 8 };
    assert_eq!(format!("{}", err), "capacity exceeded: 8 requests in flight");
}

#[test]
fn test_shutdown_error() {
    assert_eq!(format!("{}", SchedulerError::Shutdown), "scheduler is shut down");
}

#[test]
fn test_queue_full_error() {
    let err = SchedulerError::QueueFull("max queue depth reached".to_string());
    assert_eq!(format!("{}", err), "queue full: max queue depth reached");
}

#[test]
fn test_invalid_config_error() {
    let err = SchedulerError::InvalidConfig("worker_count must be greater than 0".to_string());
    assert_eq!(format!("{}", err), "invalid configuration: worker_count must be greater than 0");
}

#[test]
fn test_worker_spawn_error_wraps_io_error() {
    let err: SchedulerError = io::Error::new(io::ErrorKind::OutOfMemory, "no threads left").into();
    assert_eq!(format!("{}", err), "failed to spawn worker thread: no threads left");
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_error_debug() {
    let debug_str = format!("{:?}", SchedulerError::Shutdown);
    assert!(debug_str.contains("Shutdown"));
}
