//! Clients of external systems.

pub mod elasticsearch;
