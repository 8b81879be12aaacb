//! Unit tests for individual components

mod builders_test;
mod config_test;
mod error_test;
mod qos_test;
mod sensor_test;
mod util_test;
