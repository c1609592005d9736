//! Destinations for flushed changes.

use crate::change::DataChange;
use crate::error::Result;
use async_trait::async_trait;

/// Receives every batch of committed changes.
///
/// Returning an error marks the sync result `failed`; the changes are not
/// requeued.
#[async_trait]
pub trait SyncSink: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Delivers the committed changes of one flush, in recording order.
    async fn deliver(&self, module_id: &str, changes: &[DataChange]) -> Result<()>;
}
