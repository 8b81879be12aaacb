//! Tests for the scheduler builder

use std::sync::Arc;
use std::time::Duration;

use prometheus_qos_scheduler::builders::SchedulerBuilder;
use prometheus_qos_scheduler::config::SchedulerConfig;
use prometheus_qos_scheduler::core::{get_qos, FixedQos, InMemorySensor, Qos, SchedulerError};
use prometheus_qos_scheduler::infra::InMemoryExchange;
use prometheus_qos_scheduler::transport::{RequestMetadata, Response};

#[test]
fn test_builder_defaults() {
    let scheduler = SchedulerBuilder::new(SchedulerConfig::new().with_worker_count(1).with_max_in_flight(2))
        .build()
        .unwrap();
    assert_eq!(scheduler.config().worker_count, 1);
    let stats = scheduler.stats();
    assert_eq!(stats.worker_count, 1);
    assert_eq!(stats.max_in_flight, 2);
    scheduler.stop();
}

#[test]
fn test_builder_default_classifier_uses_configured_qos() {
    let scheduler = SchedulerBuilder::new(
        SchedulerConfig::new()
            .with_worker_count(1)
            .with_max_in_flight(2)
            .with_default_qos(Qos::High),
    )
    .build()
    .unwrap();
    let exchange = InMemoryExchange::new(RequestMetadata::new("GET", "/"));
    let probe = exchange.probe();
    scheduler
        .submit(exchange.boxed(), get_qos().map(|q| Response::text(200, q.as_str())))
        .unwrap();
    assert_eq!(probe.wait(Duration::from_secs(5)).unwrap().body_text(), "high");
    scheduler.stop();
}

#[test]
fn test_builder_custom_hooks() {
    let sensor = Arc::new(InMemorySensor::new(4));
    let scheduler = SchedulerBuilder::new(SchedulerConfig::new().with_worker_count(1).with_max_in_flight(1))
        .sensor(sensor.clone())
        .qos_classifier(Arc::new(FixedQos(Qos::Critical)))
        .build()
        .unwrap();
    scheduler.stop();
    let err = scheduler
        .submit(
            InMemoryExchange::new(RequestMetadata::new("GET", "/")).boxed(),
            prometheus_qos_scheduler::core::Step::pure(Response::new(204)),
        )
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Shutdown));
    assert_eq!(sensor.events().len(), 1);
}

#[test]
fn test_builder_rejects_invalid_config() {
    let err = SchedulerBuilder::new(SchedulerConfig::new().with_worker_count(2).with_max_in_flight(1))
        .build()
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidConfig(msg) if msg.contains("max_in_flight")));
}
