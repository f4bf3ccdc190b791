use futures::Stream;

use crate::error::IngestResult;
use crate::types::{RawLogEntry, TimeWindow};

/// Streams the raw log entries shipped within a window.
///
/// An item carrying an [`crate::error::ErrorKind::InvalidData`] error describes one unreadable
/// source document and does not end the stream; any other error does.
pub trait LogSource {
    /// Returns the name of the source.
    fn name() -> &'static str;

    /// Streams every entry whose `@timestamp` falls inside `window`, in no particular order.
    fn scan(&self, window: TimeWindow) -> impl Stream<Item = IngestResult<RawLogEntry>> + Send;
}
