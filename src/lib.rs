//! # Prometheus QoS Scheduler
//!
//! Suspendable request programs driven by a stack-safe interpreter, admitted
//! onto a fixed worker pool by a QoS-aware priority scheduler.
//!
//! A request handler is written as a [`Step<T>`](core::Step): a chain of pure
//! computations and suspension tokens (read a header, read the body, set a
//! cookie, change QoS, ...). The interpreter runs a chain of any length in
//! constant native stack, answers in-place tokens on the worker, and hands
//! I/O tokens to a callback-driven bridge so that a request waiting on the
//! network never holds a worker.
//!
//! ## Core Problem Solved
//!
//! - **Deep programs**: hundreds of thousands of binds run without growing the stack
//! - **Bounded concurrency**: at most `worker_count` requests compute at once
//! - **Priority under load**: waiting requests are served by `(qos desc, arrival asc)`
//! - **Fail-fast backpressure**: arrivals past `max_in_flight` are refused at the connection
//! - **Reliable cleanup**: registered cleaners run exactly once, in reverse order, on every path
//!
//! ## Scheduler
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_qos_scheduler::builders::SchedulerBuilder;
//! use prometheus_qos_scheduler::config::SchedulerConfig;
//! use prometheus_qos_scheduler::core::{get_header, read_body, HeaderQosClassifier, Qos};
//! use prometheus_qos_scheduler::transport::Response;
//!
//! let scheduler = SchedulerBuilder::new(
//!     SchedulerConfig::new()
//!         .with_worker_count(4)
//!         .with_max_in_flight(256),
//! )
//! .qos_classifier(Arc::new(HeaderQosClassifier::new("x-qos", Qos::Normal)))
//! .build()?;
//!
//! let program = get_header("content-type").flat_map(|ct| {
//!     read_body(64 * 1024).map(move |body| {
//!         Response::text(200, format!("{} bytes of {ct:?}", body.len()))
//!     })
//! });
//! scheduler.submit(exchange, program)?;
//!
//! scheduler.stop();
//! ```
//!
//! For complete examples, see:
//! - `tests/scheduler_test.rs` - admission, priority and shutdown scenarios
//! - `tests/bridge_test.rs` - body reads, chunked writes and error responses

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Request programs, the interpreter and the scheduler.
pub mod core;
/// Configuration models for the scheduler and its limits.
pub mod config;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Infrastructure adapters: priority queue and in-memory transport.
pub mod infra;
/// Transport-facing types: request metadata, responses and the exchange trait.
pub mod transport;
/// Shared utilities.
pub mod util;
