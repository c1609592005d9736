//! Conflict records and their state transitions.
//!
//! Records are copy-on-write: every transition returns a new record and
//! leaves the original untouched.

use chrono::{DateTime, Utc};
use modlink_types::Payload;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a conflict record.
/// Uses UUID v7 so ids sort by detection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictId(Uuid);

impl ConflictId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConflictId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What kind of contention a conflict describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    ResourceAccess,
    DataState,
    Priority,
    Dependency,
    Configuration,
    Lifecycle,
}

impl ConflictType {
    /// Every conflict type.
    pub const ALL: [ConflictType; 6] = [
        Self::ResourceAccess,
        Self::DataState,
        Self::Priority,
        Self::Dependency,
        Self::Configuration,
        Self::Lifecycle,
    ];
}

/// Conflict severity. Ordered `Low(1) < Medium(2) < High(3) < Critical(4)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Severity {
    /// Numeric level, 1 to 4.
    pub const fn level(&self) -> u8 {
        *self as u8
    }
}

/// Where a conflict is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Detected,
    Resolving,
    Resolved,
    Failed,
    ManualIntervention,
    Ignored,
}

impl ConflictStatus {
    /// Terminal states never transition again.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Resolved | Self::Failed | Self::ManualIntervention | Self::Ignored
        )
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::Failed => "failed",
            Self::ManualIntervention => "manual_intervention",
            Self::Ignored => "ignored",
        }
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to [`ConflictEngine::detect_conflict`](crate::ConflictEngine::detect_conflict).
#[derive(Debug, Clone)]
pub struct ConflictSpec {
    pub conflict_type: ConflictType,
    pub severity: Severity,
    pub involved_modules: Vec<String>,
    pub resource_id: String,
    pub description: String,
    pub metadata: Payload,
}

impl ConflictSpec {
    pub fn new<I, S>(
        conflict_type: ConflictType,
        severity: Severity,
        involved_modules: I,
        resource_id: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            conflict_type,
            severity,
            involved_modules: involved_modules.into_iter().map(Into::into).collect(),
            resource_id: resource_id.into(),
            description: String::new(),
            metadata: Payload::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Payload) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A detected conflict and, once terminal, its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: ConflictId,
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    pub severity: Severity,
    pub involved_modules: Vec<String>,
    pub resource_id: String,
    pub description: String,
    pub metadata: Payload,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub status: ConflictStatus,
    pub resolution_strategy: Option<String>,
    pub resolution_details: Option<String>,
    /// The winning module, set only for `resolved` records.
    pub winner: Option<String>,
}

impl ConflictRecord {
    /// Creates a `detected` record.
    pub fn detected(spec: ConflictSpec) -> Self {
        Self {
            id: ConflictId::new(),
            conflict_type: spec.conflict_type,
            severity: spec.severity,
            involved_modules: spec.involved_modules,
            resource_id: spec.resource_id,
            description: spec.description,
            metadata: spec.metadata,
            detected_at: Utc::now(),
            resolved_at: None,
            status: ConflictStatus::Detected,
            resolution_strategy: None,
            resolution_details: None,
            winner: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `detected → resolving`.
    pub fn resolving(&self) -> Self {
        Self {
            status: ConflictStatus::Resolving,
            ..self.clone()
        }
    }

    /// Terminal `resolved` with a winner.
    pub fn resolve(
        &self,
        strategy: &str,
        winner: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        self.finish(
            ConflictStatus::Resolved,
            Some(strategy),
            Some(winner.into()),
            details.into(),
        )
    }

    /// Terminal `failed`.
    pub fn fail(&self, strategy: Option<&str>, reason: impl Into<String>) -> Self {
        self.finish(ConflictStatus::Failed, strategy, None, reason.into())
    }

    /// Terminal `manual_intervention`.
    pub fn escalate(&self, strategy: &str, reason: impl Into<String>) -> Self {
        self.finish(
            ConflictStatus::ManualIntervention,
            Some(strategy),
            None,
            reason.into(),
        )
    }

    /// Terminal `ignored`.
    pub fn ignore(&self, strategy: Option<&str>, reason: impl Into<String>) -> Self {
        self.finish(ConflictStatus::Ignored, strategy, None, reason.into())
    }

    fn finish(
        &self,
        status: ConflictStatus,
        strategy: Option<&str>,
        winner: Option<String>,
        details: String,
    ) -> Self {
        Self {
            status,
            resolution_strategy: strategy.map(str::to_string),
            resolution_details: Some(details),
            winner,
            resolved_at: Some(Utc::now()),
            ..self.clone()
        }
    }
}
