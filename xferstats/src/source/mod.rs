//! Sources of raw transfer log entries.

mod base;
pub mod memory;

pub use base::LogSource;
