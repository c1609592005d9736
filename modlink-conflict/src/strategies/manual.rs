use crate::error::Result;
use crate::record::{ConflictRecord, ConflictType, Severity};
use crate::strategy::{Resolution, ResolutionStrategy};
use async_trait::async_trait;

/// Hands severe structural conflicts to a human instead of choosing.
///
/// By default it takes critical lifecycle and dependency conflicts, where
/// picking a winner automatically could leave modules half-initialised.
pub struct ManualInterventionStrategy {
    types: Vec<ConflictType>,
    min_severity: Severity,
    priority: i32,
}

impl ManualInterventionStrategy {
    pub const NAME: &'static str = "manual_intervention";

    pub fn new() -> Self {
        Self {
            types: vec![ConflictType::Lifecycle, ConflictType::Dependency],
            min_severity: Severity::Critical,
            priority: 200,
        }
    }

    pub fn with_types(mut self, types: Vec<ConflictType>) -> Self {
        self.types = types;
        self
    }

    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Default for ManualInterventionStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResolutionStrategy for ManualInterventionStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supported_types(&self) -> &[ConflictType] {
        &self.types
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn can_handle(&self, conflict: &ConflictRecord) -> bool {
        self.types.contains(&conflict.conflict_type) && conflict.severity >= self.min_severity
    }

    async fn resolve(&self, conflict: &ConflictRecord) -> Result<Resolution> {
        Ok(Resolution::ManualIntervention {
            reason: format!(
                "{:?} conflict on {} between {} needs a manual decision",
                conflict.conflict_type,
                conflict.resource_id,
                conflict.involved_modules.join(", ")
            ),
        })
    }
}
