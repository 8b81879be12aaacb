//! Exchange adapters.

pub mod memory;

pub use memory::{ExchangeProbe, InMemoryExchange, Recorded};
