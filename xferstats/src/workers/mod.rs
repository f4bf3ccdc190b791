//! Workers scanning windows and writing their records.

pub mod bulk;
pub mod pool;
pub mod window;
