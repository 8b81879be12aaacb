//! Scheduler configuration.

use std::env;
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, Qos};

/// Default largest request body accepted by `ReadBody`.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
/// Default largest single body write.
pub const DEFAULT_WRITE_CHUNK_SIZE: usize = 2048;
/// Default worker thread stack size.
pub const DEFAULT_THREAD_STACK_SIZE: usize = 2 * 1024 * 1024;
/// Queued requests allowed per worker by default.
pub const DEFAULT_IN_FLIGHT_PER_WORKER: usize = 64;

/// Worker pool size, admission cap and I/O limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Requests that may be Live at once (worker threads).
    pub worker_count: usize,
    /// Hard cap on `live + queued`; arrivals beyond it are rejected.
    pub max_in_flight: usize,
    /// Ceiling applied on top of every `ReadBody` limit.
    pub max_body_bytes: usize,
    /// Largest single write issued while sending a response body.
    pub write_chunk_size: usize,
    /// Worker thread stack size in bytes.
    pub thread_stack_size: usize,
    /// Worker thread name prefix.
    pub thread_name_prefix: String,
    /// QoS given to arrivals by the default classifier.
    pub default_qos: Qos,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let worker_count = num_cpus::get().max(1);
        Self {
            worker_count,
            max_in_flight: worker_count * DEFAULT_IN_FLIGHT_PER_WORKER,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            write_chunk_size: DEFAULT_WRITE_CHUNK_SIZE,
            thread_stack_size: DEFAULT_THREAD_STACK_SIZE,
            thread_name_prefix: "qos-worker".into(),
            default_qos: Qos::Normal,
        }
    }
}

impl SchedulerConfig {
    /// Defaults sized to the machine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the in-flight cap.
    #[must_use]
    pub const fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// Set the body size ceiling.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    /// Set the write chunk size.
    #[must_use]
    pub const fn with_write_chunk_size(mut self, write_chunk_size: usize) -> Self {
        self.write_chunk_size = write_chunk_size;
        self
    }

    /// Set the worker stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, thread_stack_size: usize) -> Self {
        self.thread_stack_size = thread_stack_size;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the QoS used for unclassified arrivals.
    #[must_use]
    pub const fn with_default_qos(mut self, qos: Qos) -> Self {
        self.default_qos = qos;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.max_in_flight < self.worker_count {
            return Err(format!(
                "max_in_flight ({}) must be at least worker_count ({})",
                self.max_in_flight, self.worker_count
            ));
        }
        if self.max_body_bytes == 0 {
            return Err("max_body_bytes must be greater than 0".into());
        }
        if self.write_chunk_size == 0 {
            return Err("write_chunk_size must be greater than 0".into());
        }
        if self.thread_stack_size == 0 {
            return Err("thread_stack_size must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `QOS_*` environment variables, after loading `.env`.
    ///
    /// `max_in_flight` follows `QOS_WORKER_COUNT` unless set explicitly.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable does not parse or the result is invalid.
    pub fn from_env() -> AppResult<Self> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();
        if let Some(worker_count) = env_var("QOS_WORKER_COUNT")? {
            cfg.worker_count = worker_count;
            cfg.max_in_flight = worker_count * DEFAULT_IN_FLIGHT_PER_WORKER;
        }
        if let Some(max_in_flight) = env_var("QOS_MAX_IN_FLIGHT")? {
            cfg.max_in_flight = max_in_flight;
        }
        if let Some(max_body_bytes) = env_var("QOS_MAX_BODY_BYTES")? {
            cfg.max_body_bytes = max_body_bytes;
        }
        if let Some(write_chunk_size) = env_var("QOS_WRITE_CHUNK_SIZE")? {
            cfg.write_chunk_size = write_chunk_size;
        }
        if let Some(thread_stack_size) = env_var("QOS_THREAD_STACK_SIZE")? {
            cfg.thread_stack_size = thread_stack_size;
        }
        if let Some(qos) = env_var("QOS_DEFAULT")? {
            cfg.default_qos = qos;
        }
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}

fn env_var<T>(name: &str) -> AppResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid {name}={raw:?}")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("cannot read {name}")),
    }
}
