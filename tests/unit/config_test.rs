//! Tests for configuration validation

use prometheus_qos_scheduler::config::SchedulerConfig;
use prometheus_qos_scheduler::core::Qos;

#[test]
fn test_scheduler_config_defaults() {
    let cfg = SchedulerConfig::new();
    assert!(cfg.worker_count >= 1);
    assert_eq!(cfg.max_body_bytes, 1024 * 1024);
    assert_eq!(cfg.write_chunk_size, 2048);
    assert_eq!(cfg.thread_name_prefix, "qos-worker");
    assert_eq!(cfg.default_qos, Qos::Normal);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_scheduler_config_builder() {
    let cfg = SchedulerConfig::new()
        .with_worker_count(3)
        .with_max_in_flight(30)
        .with_max_body_bytes(512)
        .with_write_chunk_size(64)
        .with_thread_stack_size(256 * 1024)
        .with_thread_name_prefix("edge")
        .with_default_qos(Qos::High);
    assert_eq!(cfg.worker_count, 3);
    assert_eq!(cfg.max_in_flight, 30);
    assert_eq!(cfg.max_body_bytes, 512);
    assert_eq!(cfg.write_chunk_size, 64);
    assert_eq!(cfg.thread_stack_size, 256 * 1024);
    assert_eq!(cfg.thread_name_prefix, "edge");
    assert_eq!(cfg.default_qos, Qos::High);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_scheduler_config_invalid_worker_count() {
    assert!(SchedulerConfig::new().with_worker_count(0).validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_cap() {
    let cfg = SchedulerConfig::new().with_worker_count(4).with_max_in_flight(3);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_sizes() {
    assert!(SchedulerConfig::new().with_max_body_bytes(0).validate().is_err());
    assert!(SchedulerConfig::new().with_write_chunk_size(0).validate().is_err());
    assert!(SchedulerConfig::new().with_thread_stack_size(0).validate().is_err());
}

#[test]
fn test_scheduler_config_from_json() {
    let json = r#"{
        "worker_count": 2,
        "max_in_flight": 10,
        "default_qos": "critical"
    }"#;
    let cfg = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.worker_count, 2);
    assert_eq!(cfg.max_in_flight, 10);
    assert_eq!(cfg.default_qos, Qos::Critical);
    assert_eq!(cfg.write_chunk_size, 2048);
}

#[test]
fn test_scheduler_config_from_invalid_json() {
    assert!(SchedulerConfig::from_json_str("not json").unwrap_err().starts_with("parse error"));
    assert!(SchedulerConfig::from_json_str(r#"{"worker_count": 0}"#).is_err());
}

#[test]
fn test_scheduler_config_json_roundtrip() {
    let cfg = SchedulerConfig::new().with_worker_count(2).with_max_in_flight(5);
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(SchedulerConfig::from_json_str(&json).unwrap(), cfg);
}

#[test]
fn test_scheduler_config_from_env() {
    // The only test touching QOS_* variables.
    std::env::set_var("QOS_WORKER_COUNT", "3");
    std::env::set_var("QOS_DEFAULT", "low");
    std::env::set_var("QOS_WRITE_CHUNK_SIZE", "512");
    let cfg = SchedulerConfig::from_env().unwrap();
    assert_eq!(cfg.worker_count, 3);
    assert_eq!(cfg.max_in_flight, 3 * 64);
    assert_eq!(cfg.default_qos, Qos::Low);
    assert_eq!(cfg.write_chunk_size, 512);

    std::env::set_var("QOS_MAX_BODY_BYTES", "lots");
    let err = SchedulerConfig::from_env().unwrap_err();
    assert!(format!("{err:#}").contains("QOS_MAX_BODY_BYTES"));

    for name in ["QOS_WORKER_COUNT", "QOS_DEFAULT", "QOS_WRITE_CHUNK_SIZE", "QOS_MAX_BODY_BYTES"] {
        std::env::remove_var(name);
    }
}
