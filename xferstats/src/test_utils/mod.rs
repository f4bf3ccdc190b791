//! Helpers shared by unit and integration tests: sample entries and geo data, and a store
//! wrapper that injects write failures.

pub mod faulty_store;
pub mod fixtures;
