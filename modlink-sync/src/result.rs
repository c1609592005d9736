//! Outcomes of sync flushes.

use crate::change::DataChange;
use chrono::{DateTime, Utc};
use modlink_conflict::ConflictRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncId(Uuid);

impl SyncId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SyncId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Syncing,
    Success,
    Failed,
    Conflict,
    Cancelled,
}

/// A change that overlapped with another module's recent commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub change: DataChange,
    /// Module that committed the same key inside the conflict window.
    pub other_module: String,
    /// Engine outcome, when an engine is attached.
    pub record: Option<ConflictRecord>,
    /// Whether the change was committed after all.
    pub committed: bool,
}

/// Result of one flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub sync_id: SyncId,
    pub module_id: String,
    pub status: SyncStatus,
    /// Changes every sink accepted. Empty when the flush failed.
    pub synced_changes: Vec<DataChange>,
    /// Changes a sink rejected. They are not requeued.
    #[serde(default)]
    pub failed_changes: Vec<DataChange>,
    pub conflicts: Vec<SyncConflict>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncResult {
    pub(crate) fn syncing(module_id: &str) -> Self {
        Self {
            sync_id: SyncId::new(),
            module_id: module_id.to_string(),
            status: SyncStatus::Syncing,
            synced_changes: Vec::new(),
            failed_changes: Vec::new(),
            conflicts: Vec::new(),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub(crate) fn finish(mut self, status: SyncStatus) -> Self {
        self.status = status;
        self.completed_at = Some(Utc::now());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }
}
