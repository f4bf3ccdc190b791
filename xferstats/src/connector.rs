use std::future::Future;

use crate::error::IngestResult;

/// Opens fresh connections to a source or store.
///
/// Every window opens its own connection through a connector, so no connection is shared
/// between concurrently running windows.
pub trait Connector {
    type Connection: Send + 'static;

    fn connect(&self) -> impl Future<Output = IngestResult<Self::Connection>> + Send;
}
