//! Conversions from raw log text into typed values.

pub mod numeric;
pub mod timestamp;
