use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// When a module's pending changes are flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// Flush every change as soon as it is recorded.
    Realtime,
    /// Flush on a fixed interval.
    Batch,
    /// Flush only on `trigger_sync`.
    OnDemand,
    /// Flush immediately, checking for overlapping writes first.
    ConflictResolution,
}

/// Per-module sync registration.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub module_id: String,
    pub data_keys: HashSet<String>,
    pub strategy: SyncStrategy,
    /// Flush period, used only by [`SyncStrategy::Batch`].
    pub batch_interval: Duration,
}

impl SyncConfig {
    pub fn new(module_id: impl Into<String>, strategy: SyncStrategy) -> Self {
        Self {
            module_id: module_id.into(),
            data_keys: HashSet::new(),
            strategy,
            batch_interval: Duration::from_secs(1),
        }
    }

    pub fn with_data_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.data_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn with_batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = interval;
        self
    }

    pub fn tracks(&self, data_key: &str) -> bool {
        self.data_keys.contains(data_key)
    }
}

/// Manager-wide settings.
#[derive(Debug, Clone)]
pub struct SyncManagerConfig {
    /// Two modules committing the same key within this window conflict.
    pub conflict_window: Duration,
    /// Sync results kept in history, across all modules.
    pub max_history: usize,
}

impl Default for SyncManagerConfig {
    fn default() -> Self {
        Self {
            conflict_window: Duration::from_secs(5),
            max_history: 1_000,
        }
    }
}
