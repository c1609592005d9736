//! The strategy abstraction.
//!
//! Strategies decide; the engine owns the record transitions. A strategy
//! returns a [`Resolution`] or an error, and the engine turns either into
//! the stored terminal record.

use crate::error::Result;
use crate::record::{ConflictRecord, ConflictType};
use async_trait::async_trait;

/// Decision produced by a strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// One of the involved modules wins.
    Winner { module: String, details: String },
    /// A human has to decide.
    ManualIntervention { reason: String },
    /// The conflict is deliberately left alone.
    Ignored { reason: String },
}

impl Resolution {
    pub fn winner(module: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Winner {
            module: module.into(),
            details: details.into(),
        }
    }
}

/// A pluggable conflict resolution algorithm.
#[async_trait]
pub trait ResolutionStrategy: Send + Sync {
    /// Unique strategy name.
    fn name(&self) -> &str;

    /// Conflict types this strategy knows how to resolve.
    fn supported_types(&self) -> &[ConflictType];

    /// Higher priority strategies are tried first.
    fn priority(&self) -> i32;

    /// Returns true if this strategy should resolve the conflict.
    fn can_handle(&self, conflict: &ConflictRecord) -> bool {
        self.supported_types().contains(&conflict.conflict_type)
    }

    /// Decides the conflict.
    async fn resolve(&self, conflict: &ConflictRecord) -> Result<Resolution>;
}
