//! Configuration models for the scheduler and its I/O limits.

pub mod scheduler;

pub use scheduler::SchedulerConfig;
