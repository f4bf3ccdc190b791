//! Configuration loading and shared configuration types for the transfer statistics ingester.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{LoadConfigError, load_config, load_config_from};
