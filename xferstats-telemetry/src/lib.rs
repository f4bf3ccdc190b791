//! Logging and metrics setup shared by the ingester binary and the test suites.

pub mod metrics;
pub mod tracing;
