//! Data changes recorded by modules.

use chrono::{DateTime, Utc};
use modlink_types::Payload;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a data change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeId(Uuid);

impl ChangeId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ChangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of change applied to a data key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    Batch,
}

/// One change to a tracked data key. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataChange {
    pub id: ChangeId,
    pub module_id: String,
    pub data_key: String,
    pub change_type: ChangeType,
    pub timestamp: DateTime<Utc>,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub metadata: Payload,
}

impl DataChange {
    pub fn new(
        module_id: impl Into<String>,
        data_key: impl Into<String>,
        change_type: ChangeType,
    ) -> Self {
        Self {
            id: ChangeId::new(),
            module_id: module_id.into(),
            data_key: data_key.into(),
            change_type,
            timestamp: Utc::now(),
            old_value: None,
            new_value: None,
            metadata: Payload::new(),
        }
    }

    pub fn with_old_value(mut self, value: Option<Value>) -> Self {
        self.old_value = value;
        self
    }

    pub fn with_new_value(mut self, value: Option<Value>) -> Self {
        self.new_value = value;
        self
    }

    pub fn with_metadata(mut self, metadata: Payload) -> Self {
        self.metadata = metadata;
        self
    }
}
