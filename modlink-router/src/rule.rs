//! Routing rules.

use crate::glob;
use serde::{Deserialize, Serialize};

/// A rule selecting messages by source, target and action patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Rule identifier, unique within a router.
    pub id: String,
    /// Pattern over the sending module.
    pub source_pattern: String,
    /// Pattern over the target module. An absent target matches as `""`.
    pub target_pattern: String,
    /// Pattern over the action name.
    pub action_pattern: String,
    /// Higher priority rules are evaluated first.
    #[serde(default)]
    pub priority: i32,
    /// Disabled rules never match.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl RoutingRule {
    /// Creates an enabled rule with priority 0.
    pub fn new(
        id: impl Into<String>,
        source_pattern: impl Into<String>,
        target_pattern: impl Into<String>,
        action_pattern: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_pattern: source_pattern.into(),
            target_pattern: target_pattern.into(),
            action_pattern: action_pattern.into(),
            priority: 0,
            enabled: true,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns true if the rule is enabled and all three patterns match.
    pub fn matches(&self, source: &str, target: Option<&str>, action: &str) -> bool {
        self.enabled
            && glob::matches(&self.source_pattern, source)
            && glob::matches(&self.target_pattern, target.unwrap_or(""))
            && glob::matches(&self.action_pattern, action)
    }
}
