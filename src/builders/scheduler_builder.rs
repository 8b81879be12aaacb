//! Builder to construct a scheduler from configuration and pluggable hooks.

use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::core::{FixedQos, QosClassifier, Scheduler, SchedulerError, Sensor, TracingSensor};
use crate::transport::{DefaultErrorFormatter, ErrorFormatter};

/// Assembles a [`Scheduler`] from configuration plus optional hooks.
///
/// Unset hooks default to [`TracingSensor`], [`DefaultErrorFormatter`] and
/// [`FixedQos`] with the configured default QoS.
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    sensor: Option<Arc<dyn Sensor>>,
    formatter: Option<Arc<dyn ErrorFormatter>>,
    classifier: Option<Arc<dyn QosClassifier>>,
}

impl SchedulerBuilder {
    /// Start from `config`.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            sensor: None,
            formatter: None,
            classifier: None,
        }
    }

    /// Where connection errors, rejections and cleaner failures are reported.
    #[must_use]
    pub fn sensor(mut self, sensor: Arc<dyn Sensor>) -> Self {
        self.sensor = Some(sensor);
        self
    }

    /// Renders internal-error responses.
    #[must_use]
    pub fn error_formatter(mut self, formatter: Arc<dyn ErrorFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Assigns QoS to arrivals.
    #[must_use]
    pub fn qos_classifier(mut self, classifier: Arc<dyn QosClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Validate the configuration and start the workers.
    ///
    /// # Errors
    ///
    /// See [`Scheduler::new`].
    pub fn build(self) -> Result<Scheduler, SchedulerError> {
        let default_qos = self.config.default_qos;
        Scheduler::new(
            self.config,
            self.sensor.unwrap_or_else(|| Arc::new(TracingSensor)),
            self.formatter.unwrap_or_else(|| Arc::new(DefaultErrorFormatter)),
            self.classifier.unwrap_or_else(|| Arc::new(FixedQos(default_qos))),
        )
    }
}

impl std::fmt::Debug for SchedulerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerBuilder")
            .field("config", &self.config)
            .field("custom_sensor", &self.sensor.is_some())
            .field("custom_formatter", &self.formatter.is_some())
            .field("custom_classifier", &self.classifier.is_some())
            .finish()
    }
}
