//! Sensor implementations.
//!
//! A sensor observes failures that never reach a caller: connection-level
//! errors, rejected exchanges and cleaners that panicked. Sensors run on
//! whatever thread hit the failure, so they must be cheap and thread-safe. A
//! sensor that panics is contained by [`report`].

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;

use crate::util::panic_message;

/// Something a sensor is told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorEvent {
    /// I/O or internal failure while serving a request.
    ConnectionError {
        /// Arrival ordinal of the affected request.
        ordinal: u64,
        /// Failure description.
        message: String,
    },
    /// A request was refused at the connection level.
    Rejected {
        /// Arrival ordinal of the refused request.
        ordinal: u64,
        /// Why it was refused.
        reason: String,
    },
    /// A cleaner panicked during the final sweep.
    CleanupFailed {
        /// Arrival ordinal of the request owning the cleaner.
        ordinal: u64,
        /// Panic message.
        message: String,
    },
}

/// Observability hook for failures.
pub trait Sensor: Send + Sync {
    /// Record an event.
    fn record(&self, event: SensorEvent);
}

/// Forward `event` to `sensor`, swallowing any panic the sensor raises.
pub fn report(sensor: &dyn Sensor, event: SensorEvent) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| sensor.record(event))) {
        tracing::warn!(panic = %panic_message(payload.as_ref()), "sensor panicked while recording");
    }
}

/// Default sensor: logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSensor;

impl Sensor for TracingSensor {
    fn record(&self, event: SensorEvent) {
        match event {
            SensorEvent::ConnectionError { ordinal, message } => {
                tracing::error!(ordinal, error = %message, "connection error");
            }
            SensorEvent::Rejected { ordinal, reason } => {
                tracing::warn!(ordinal, reason = %reason, "request rejected");
            }
            SensorEvent::CleanupFailed { ordinal, message } => {
                tracing::warn!(ordinal, error = %message, "cleaner failed");
            }
        }
    }
}

/// In-memory sensor for testing and dev. Keeps the newest `max_events` events.
pub struct InMemorySensor {
    events: Mutex<VecDeque<SensorEvent>>,
    max_events: usize,
}

impl InMemorySensor {
    /// Create a sensor with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    pub fn events(&self) -> Vec<SensorEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl Sensor for InMemorySensor {
    fn record(&self, event: SensorEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PanickingSensor;

    impl Sensor for PanickingSensor {
        fn record(&self, _event: SensorEvent) {
            panic!("sensor is broken");
        }
    }

    #[test]
    fn test_report_contains_sensor_panic() {
        report(
            &PanickingSensor,
            SensorEvent::Rejected {
                ordinal: 1,
                reason: "full".into(),
            },
        );
    }

    #[test]
    fn test_in_memory_sensor_overflow() {
        let sensor = InMemorySensor::new(2);
        for ordinal in 0..3 {
            sensor.record(SensorEvent::ConnectionError {
                ordinal,
                message: "reset".into(),
            });
        }
        let events = sensor.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SensorEvent::ConnectionError { ordinal: 1, .. }));
    }
}
