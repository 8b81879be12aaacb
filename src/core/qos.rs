//! Quality-of-service classes and arrival-time classification.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::transport::RequestMetadata;

/// Priority class of a request. Higher classes are promoted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Qos {
    /// Background work.
    Low,
    /// Regular traffic.
    #[default]
    Normal,
    /// Latency-sensitive traffic.
    High,
    /// Must run before everything else that is waiting.
    Critical,
}

impl Qos {
    /// Lower-case name as used in headers and configuration.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Qos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Qos {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown qos class `{other}`")),
        }
    }
}

/// Decides the QoS a request is queued with when it arrives.
pub trait QosClassifier: Send + Sync {
    /// Classify a freshly arrived request.
    fn classify(&self, meta: &RequestMetadata) -> Qos;
}

/// Gives every request the same class.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedQos(pub Qos);

impl QosClassifier for FixedQos {
    fn classify(&self, _meta: &RequestMetadata) -> Qos {
        self.0
    }
}

/// Reads the class from a request header, falling back to a default.
#[derive(Debug, Clone)]
pub struct HeaderQosClassifier {
    header: String,
    fallback: Qos,
}

impl HeaderQosClassifier {
    /// Classify by `header` (case-insensitive name), using `fallback` when absent or invalid.
    pub fn new(header: impl Into<String>, fallback: Qos) -> Self {
        Self {
            header: header.into(),
            fallback,
        }
    }
}

impl QosClassifier for HeaderQosClassifier {
    fn classify(&self, meta: &RequestMetadata) -> Qos {
        meta.header(&self.header)
            .first()
            .and_then(|value| value.parse().ok())
            .unwrap_or(self.fallback)
    }
}
