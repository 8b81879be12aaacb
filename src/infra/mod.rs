//! Infrastructure adapters: the priority queue and an in-memory transport.

pub mod exchange;
pub mod queue;

pub use exchange::{ExchangeProbe, InMemoryExchange, Recorded};
pub use queue::{InMemoryQueue, QueueKey};
