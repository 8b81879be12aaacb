//! Tests for sensors

use prometheus_qos_scheduler::core::{report, InMemorySensor, Sensor, SensorEvent, TracingSensor};

#[test]
fn test_in_memory_sensor_records_in_order() {
    let sensor = InMemorySensor::new(10);
    report(&sensor, SensorEvent::Rejected { ordinal: 1, reason: "full".into() });
    report(&sensor, SensorEvent::ConnectionError { ordinal: 2, message: "reset".into() });
    let events = sensor.events();
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], SensorEvent::Rejected { ordinal: 1, .. }));
    assert!(matches!(events[1], SensorEvent::ConnectionError { ordinal: 2, .. }));
}

#[test]
fn test_in_memory_sensor_keeps_newest() {
    let sensor = InMemorySensor::new(2);
    for ordinal in 0..5 {
        sensor.record(SensorEvent::CleanupFailed { ordinal, message: "boom".into() });
    }
    let ordinals: Vec<u64> = sensor
        .events()
        .iter()
        .map(|e| match e {
            SensorEvent::CleanupFailed { ordinal, .. } => *ordinal,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(ordinals, vec![3, 4]);
}

#[test]
fn test_tracing_sensor_accepts_every_event() {
    let sensor = TracingSensor;
    report(&sensor, SensorEvent::Rejected { ordinal: 0, reason: "shutdown".into() });
    report(&sensor, SensorEvent::ConnectionError { ordinal: 0, message: "reset".into() });
    report(&sensor, SensorEvent::CleanupFailed { ordinal: 0, message: "boom".into() });
}
