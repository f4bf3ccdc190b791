//! Deterministic record identity.
//!
//! Re-ingesting an entry yields the same id, so the stored record is overwritten in place
//! instead of duplicated.

use sha2::{Digest, Sha256};

use crate::types::{RawLogEntry, RecordId};

/// Computes the SHA-256 digest of `message`, `host` and the decimal `offset`, concatenated in
/// that order, as 64 lowercase hex digits.
pub fn record_id(message: &str, host: &str, offset: u64) -> RecordId {
    let mut hasher = Sha256::new();
    hasher.update(message.as_bytes());
    hasher.update(host.as_bytes());
    hasher.update(offset.to_string().as_bytes());

    RecordId::new(format!("{:x}", hasher.finalize()))
}

/// Computes the id of a raw entry.
pub fn entry_id(entry: &RawLogEntry) -> RecordId {
    record_id(&entry.message, &entry.host, entry.offset)
}
