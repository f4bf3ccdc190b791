use std::collections::HashMap;
use std::net::IpAddr;

use crate::error::IngestResult;
use crate::geo::GeoLookup;
use crate::types::GeoAnnotation;

/// In-memory geographic table.
///
/// Used by tests and by runs without a configured database, in which case it stays empty and
/// records are stored without geographic data.
#[derive(Debug, Clone, Default)]
pub struct MemoryGeoLookup {
    entries: HashMap<IpAddr, GeoAnnotation>,
}

impl MemoryGeoLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `annotation` under its own address.
    pub fn with_annotation(mut self, annotation: GeoAnnotation) -> Self {
        self.insert(annotation);
        self
    }

    pub fn insert(&mut self, annotation: GeoAnnotation) {
        self.entries.insert(annotation.ip, annotation);
    }
}

impl GeoLookup for MemoryGeoLookup {
    fn lookup(&self, ip: IpAddr) -> IngestResult<Option<GeoAnnotation>> {
        Ok(self.entries.get(&ip).cloned())
    }
}
