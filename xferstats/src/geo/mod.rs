//! Geographic annotation of destination addresses.

mod base;
pub mod maxmind;
pub mod memory;

pub use base::{GeoEnricher, GeoLookup, parse_destination};
