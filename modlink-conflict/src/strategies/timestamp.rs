use crate::error::{ConflictError, Result};
use crate::record::{ConflictRecord, ConflictType};
use crate::strategy::{Resolution, ResolutionStrategy};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Last writer wins, based on `metadata.timestamps`.
///
/// Expects `{"timestamps": {"<module>": "<ISO 8601>"}}` in the conflict
/// metadata. Modules without an entry are skipped; a missing map, a
/// malformed timestamp, or no usable entry at all fails the resolution.
pub struct TimestampStrategy {
    priority: i32,
    types: Vec<ConflictType>,
}

impl TimestampStrategy {
    pub const NAME: &'static str = "timestamp_based";

    pub fn new() -> Self {
        Self {
            priority: 90,
            types: vec![ConflictType::DataState, ConflictType::ResourceAccess],
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
}

impl Default for TimestampStrategy {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses RFC 3339, falling back to an offset-less ISO 8601 form read as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[async_trait]
impl ResolutionStrategy for TimestampStrategy {
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
        let timestamps = conflict
            .metadata
            .get_object("timestamps")
            .map_err(|e| ConflictError::MissingMetadata(e.to_string()))?;

        let mut latest: Option<(&str, DateTime<Utc>)> = None;
        for module in &conflict.involved_modules {
            let Some(value) = timestamps.get(module) else {
                continue;
            };
            let raw = value.as_str().ok_or_else(|| {
                ConflictError::InvalidMetadata(format!("timestamp for {module} is not a string"))
            })?;
            let ts = parse_timestamp(raw).ok_or_else(|| {
                ConflictError::InvalidMetadata(format!("unparseable timestamp for {module}: {raw}"))
            })?;
            if latest.is_none_or(|(_, best)| ts > best) {
                latest = Some((module.as_str(), ts));
            }
        }

        let (winner, ts) = latest.ok_or_else(|| {
            ConflictError::MissingMetadata("no timestamps for the involved modules".into())
        })?;
        Ok(Resolution::winner(
            winner,
            format!("module {winner} wrote last at {}", ts.to_rfc3339()),
        ))
    }
}
