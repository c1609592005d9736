use crate::error::{ConflictError, Result};
use crate::record::{ConflictRecord, ConflictType};
use crate::strategy::{Resolution, ResolutionStrategy};
use async_trait::async_trait;
use std::collections::HashMap;

/// Picks the involved module with the highest configured priority.
///
/// Unknown modules count as priority 0. Ties go to the module listed first.
pub struct PriorityStrategy {
    module_priorities: HashMap<String, i32>,
    priority: i32,
    types: Vec<ConflictType>,
}

impl PriorityStrategy {
    pub const NAME: &'static str = "priority_based";

    pub fn new(module_priorities: HashMap<String, i32>) -> Self {
        Self {
            module_priorities,
            priority: 100,
            types: vec![
                ConflictType::ResourceAccess,
                ConflictType::Priority,
                ConflictType::Configuration,
            ],
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_types(mut self, types: Vec<ConflictType>) -> Self {
        self.types = types;
        self
    }

    pub fn module_priority(&self, module_id: &str) -> i32 {
        self.module_priorities.get(module_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ResolutionStrategy for PriorityStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supported_types(&self) -> &[ConflictType] {
        &self.types
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn resolve(&self, conflict: &ConflictRecord) -> Result<Resolution> {
        let mut best: Option<(&str, i32)> = None;
        for module in &conflict.involved_modules {
            let p = self.module_priority(module);
            // Strictly greater keeps the earliest module on ties.
            if best.is_none_or(|(_, bp)| p > bp) {
                best = Some((module.as_str(), p));
            }
        }

        let (winner, p) =
            best.ok_or_else(|| ConflictError::Unresolvable("no involved modules".into()))?;
        Ok(Resolution::winner(
            winner,
            format!("module {winner} has the highest priority ({p})"),
        ))
    }
}
