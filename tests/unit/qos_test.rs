//! Tests for QoS classes and classifiers

use prometheus_qos_scheduler::core::{FixedQos, HeaderQosClassifier, Qos, QosClassifier};
use prometheus_qos_scheduler::infra::QueueKey;
use prometheus_qos_scheduler::transport::RequestMetadata;

#[test]
fn test_qos_parse_and_display() {
    for qos in [Qos::Low, Qos::Normal, Qos::High, Qos::Critical] {
        assert_eq!(qos.to_string().parse::<Qos>().unwrap(), qos);
    }
    assert_eq!(" HIGH ".parse::<Qos>().unwrap(), Qos::High);
    assert!("urgent".parse::<Qos>().is_err());
}

#[test]
fn test_qos_serde() {
    assert_eq!(serde_json::to_string(&Qos::Critical).unwrap(), "\"critical\"");
    assert_eq!(serde_json::from_str::<Qos>("\"low\"").unwrap(), Qos::Low);
}

#[test]
fn test_header_classifier() {
    let classifier = HeaderQosClassifier::new("x-qos", Qos::Normal);
    let high = RequestMetadata::new("GET", "/").with_header("X-QoS", "high");
    let bogus = RequestMetadata::new("GET", "/").with_header("x-qos", "asap");
    let missing = RequestMetadata::new("GET", "/");
    assert_eq!(classifier.classify(&high), Qos::High);
    assert_eq!(classifier.classify(&bogus), Qos::Normal);
    assert_eq!(classifier.classify(&missing), Qos::Normal);
}

#[test]
fn test_fixed_classifier() {
    assert_eq!(FixedQos(Qos::Low).classify(&RequestMetadata::new("GET", "/")), Qos::Low);
}

#[test]
fn test_queue_key_order() {
    let mut keys = vec![
        QueueKey::new(Qos::Low, 0),
        QueueKey::new(Qos::High, 3),
        QueueKey::new(Qos::Low, 1),
        QueueKey::new(Qos::High, 2),
    ];
    keys.sort();
    let ordinals: Vec<u64> = keys.iter().map(|k| k.ordinal).collect();
    assert_eq!(ordinals, vec![2, 3, 0, 1]);
}
