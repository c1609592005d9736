//! Data sync manager for modlink.
//!
//! Modules register which data keys they own and how changes to them are
//! flushed. Each recorded change is queued per module (FIFO) and flushed to
//! the registered [`SyncSink`]s according to the module's [`SyncStrategy`]:
//!
//! - **Realtime**: flushed as soon as it is recorded
//! - **Batch**: flushed by a per-module timer task
//! - **OnDemand**: flushed only by [`SyncManager::trigger_sync`]
//! - **ConflictResolution**: flushed immediately, but a change to a key that
//!   another module committed within the conflict window is handed to the
//!   [`ConflictEngine`](modlink_conflict::ConflictEngine) and committed only
//!   if its module wins
//!
//! Every flush that moved changes is recorded as a [`SyncResult`] in a
//! bounded history.
//!
//! # Example
//!
//! ```
//! use modlink_sync::{ChangeType, SyncConfig, SyncManager, SyncStrategy};
//! use modlink_types::Payload;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let manager = SyncManager::default();
//! manager
//!     .register_sync_config(
//!         SyncConfig::new("notes", SyncStrategy::OnDemand).with_data_keys(["note:1"]),
//!     )
//!     .await
//!     .unwrap();
//!
//! manager
//!     .record_data_change("notes", "note:1", ChangeType::Update, None, None, Payload::new())
//!     .await;
//! let result = manager.trigger_sync("notes").await.unwrap();
//! assert_eq!(result.synced_changes.len(), 1);
//! # }
//! ```

mod change;
mod config;
mod error;
mod manager;
mod result;
mod sink;

pub use change::{ChangeId, ChangeType, DataChange};
pub use config::{SyncConfig, SyncManagerConfig, SyncStrategy};
pub use error::{Result, SyncError};
pub use manager::{PendingSnapshot, SyncManager};
pub use result::{SyncConflict, SyncId, SyncResult, SyncStatus};
pub use sink::SyncSink;
