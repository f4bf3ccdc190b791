use std::sync::Arc;

use futures::{Stream, stream};

use crate::connector::Connector;
use crate::error::IngestResult;
use crate::source::LogSource;
use crate::types::{RawLogEntry, TimeWindow};

/// In-memory source of raw entries for tests and local runs.
///
/// Cloning is cheap and every clone sees the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    entries: Arc<Vec<RawLogEntry>>,
}

impl MemorySource {
    pub fn new(entries: Vec<RawLogEntry>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }
}

impl LogSource for MemorySource {
    fn name() -> &'static str {
        "memory"
    }

    fn scan(&self, window: TimeWindow) -> impl Stream<Item = IngestResult<RawLogEntry>> + Send {
        let matching = self
            .entries
            .iter()
            .filter(|entry| window.contains(entry.timestamp))
            .cloned()
            .map(Ok)
            .collect::<Vec<_>>();

        stream::iter(matching)
    }
}

impl Connector for MemorySource {
    type Connection = MemorySource;

    async fn connect(&self) -> IngestResult<Self::Connection> {
        Ok(self.clone())
    }
}
