//! The conflict resolution engine.

use crate::error::{ConflictError, Result};
use crate::metrics::LatencyWindow;
use crate::record::{ConflictId, ConflictRecord, ConflictSpec, ConflictStatus, Severity};
use crate::strategies::{
    ManualInterventionStrategy, PriorityStrategy, RandomStrategy, TimestampStrategy,
};
use crate::strategy::{Resolution, ResolutionStrategy};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Reason stored on records no strategy could handle.
pub const NO_STRATEGY_REASON: &str = "No suitable strategy found";

/// Configuration for the conflict engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictEngineConfig {
    /// Conflicts at or above this severity are resolved on detection.
    pub auto_resolve_threshold: Severity,
    /// Latency samples kept per strategy.
    pub latency_window: usize,
    /// Capacity of the record event stream.
    pub event_capacity: usize,
}

impl Default for ConflictEngineConfig {
    fn default() -> Self {
        Self {
            auto_resolve_threshold: Severity::High,
            latency_window: 100,
            event_capacity: 128,
        }
    }
}

type RecordSlot = Arc<Mutex<ConflictRecord>>;

/// Stores conflict records and resolves them through registered strategies.
///
/// Each record sits behind its own mutex, held for the whole resolution, so
/// concurrent `resolve_conflict` calls on one id resolve it once.
pub struct ConflictEngine {
    config: ConflictEngineConfig,
    strategies: RwLock<Vec<Arc<dyn ResolutionStrategy>>>,
    records: RwLock<HashMap<ConflictId, RecordSlot>>,
    resolution_stats: Mutex<HashMap<String, u64>>,
    latencies: Mutex<HashMap<String, LatencyWindow>>,
    events: broadcast::Sender<ConflictRecord>,
}

impl ConflictEngine {
    /// Creates an engine with no strategies.
    pub fn new(config: ConflictEngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            strategies: RwLock::new(Vec::new()),
            records: RwLock::new(HashMap::new()),
            resolution_stats: Mutex::new(HashMap::new()),
            latencies: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Creates an engine with the four built-in strategies.
    pub async fn with_default_strategies(
        config: ConflictEngineConfig,
        module_priorities: HashMap<String, i32>,
    ) -> Self {
        let engine = Self::new(config);
        let defaults: [Arc<dyn ResolutionStrategy>; 4] = [
            Arc::new(ManualInterventionStrategy::new()),
            Arc::new(PriorityStrategy::new(module_priorities)),
            Arc::new(TimestampStrategy::new()),
            Arc::new(RandomStrategy::new()),
        ];
        for strategy in defaults {
            if let Err(e) = engine.add_strategy(strategy).await {
                warn!("Skipping built-in strategy: {}", e);
            }
        }
        engine
    }

    pub fn config(&self) -> &ConflictEngineConfig {
        &self.config
    }

    // ── Strategies ───────────────────────────────────────────────

    /// Registers a strategy. Names must be unique.
    pub async fn add_strategy(&self, strategy: Arc<dyn ResolutionStrategy>) -> Result<()> {
        let mut strategies = self.strategies.write().await;
        if strategies.iter().any(|s| s.name() == strategy.name()) {
            return Err(ConflictError::DuplicateStrategy(strategy.name().to_string()));
        }
        debug!(
            "Registering strategy {} (priority {})",
            strategy.name(),
            strategy.priority()
        );
        strategies.push(strategy);
        strategies.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Ok(())
    }

    /// Removes a strategy by name. Returns false if unknown.
    pub async fn remove_strategy(&self, name: &str) -> bool {
        let mut strategies = self.strategies.write().await;
        let before = strategies.len();
        strategies.retain(|s| s.name() != name);
        before != strategies.len()
    }

    /// Strategy names in evaluation order.
    pub async fn strategy_names(&self) -> Vec<String> {
        self.strategies
            .read()
            .await
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    async fn select_strategy(&self, conflict: &ConflictRecord) -> Option<Arc<dyn ResolutionStrategy>> {
        self.strategies
            .read()
            .await
            .iter()
            .find(|s| s.can_handle(conflict))
            .cloned()
    }

    // ── Detection & resolution ───────────────────────────────────

    /// Records a new conflict. Severities at or above the auto-resolve
    /// threshold are resolved before this returns.
    pub async fn detect_conflict(&self, spec: ConflictSpec) -> Result<ConflictRecord> {
        if spec.involved_modules.len() < 2 {
            return Err(ConflictError::TooFewModules(spec.involved_modules.len()));
        }

        let record = ConflictRecord::detected(spec);
        let id = record.id;
        self.records
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(record.clone())));
        self.bump("detected").await;
        self.emit(&record);
        info!(
            "Conflict {} detected: {:?}/{:?} on {} between {:?}",
            id, record.conflict_type, record.severity, record.resource_id, record.involved_modules
        );

        if record.severity >= self.config.auto_resolve_threshold {
            self.bump("auto_resolved").await;
            if let Some(resolved) = self.resolve_conflict(&id).await {
                return Ok(resolved);
            }
        }
        Ok(record)
    }

    /// Resolves a stored conflict.
    ///
    /// Returns `None` for unknown ids. Terminal records are returned as they
    /// are without invoking any strategy.
    pub async fn resolve_conflict(&self, id: &ConflictId) -> Option<ConflictRecord> {
        let slot = self.records.read().await.get(id).cloned()?;
        let mut record = slot.lock().await;

        if record.is_terminal() {
            debug!("Conflict {} already {}", id, record.status);
            return Some(record.clone());
        }

        *record = record.resolving();
        self.emit(&record);

        let outcome = match self.select_strategy(&record).await {
            Some(strategy) => self.run_strategy(strategy.as_ref(), &record).await,
            None => {
                warn!("No strategy can handle conflict {}", id);
                record.fail(None, NO_STRATEGY_REASON)
            }
        };

        *record = outcome;
        self.bump(record.status.as_str()).await;
        self.emit(&record);
        info!(
            "Conflict {} {} by {:?}: {}",
            id,
            record.status,
            record.resolution_strategy,
            record.resolution_details.as_deref().unwrap_or("")
        );
        Some(record.clone())
    }

    /// Runs a strategy and turns whatever it does into a terminal record.
    async fn run_strategy(
        &self,
        strategy: &dyn ResolutionStrategy,
        record: &ConflictRecord,
    ) -> ConflictRecord {
        let name = strategy.name().to_string();
        let started = Instant::now();
        let outcome = AssertUnwindSafe(strategy.resolve(record)).catch_unwind().await;
        self.record_latency(&name, started).await;

        match outcome {
            Ok(Ok(Resolution::Winner { module, details })) => {
                if record.involved_modules.contains(&module) {
                    record.resolve(&name, module, details)
                } else {
                    warn!("Strategy {} picked uninvolved module {}", name, module);
                    record.fail(
                        Some(&name),
                        format!("strategy picked uninvolved module {module}"),
                    )
                }
            }
            Ok(Ok(Resolution::ManualIntervention { reason })) => record.escalate(&name, reason),
            Ok(Ok(Resolution::Ignored { reason })) => record.ignore(Some(&name), reason),
            Ok(Err(e)) => {
                warn!("Strategy {} failed on conflict {}: {}", name, record.id, e);
                record.fail(Some(&name), e.to_string())
            }
            Err(_) => {
                warn!("Strategy {} panicked on conflict {}", name, record.id);
                record.fail(Some(&name), format!("strategy {name} panicked"))
            }
        }
    }

    /// Marks a non-terminal conflict as ignored.
    pub async fn ignore_conflict(
        &self,
        id: &ConflictId,
        reason: impl Into<String>,
    ) -> Option<ConflictRecord> {
        let slot = self.records.read().await.get(id).cloned()?;
        let mut record = slot.lock().await;
        if !record.is_terminal() {
            *record = record.ignore(None, reason);
            self.bump(ConflictStatus::Ignored.as_str()).await;
            self.emit(&record);
        }
        Some(record.clone())
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Returns a record by id.
    pub async fn get_conflict(&self, id: &ConflictId) -> Option<ConflictRecord> {
        let slot = self.records.read().await.get(id).cloned()?;
        let record = slot.lock().await;
        Some(record.clone())
    }

    /// Every record, oldest first.
    pub async fn all_conflicts(&self) -> Vec<ConflictRecord> {
        let slots: Vec<RecordSlot> = self.records.read().await.values().cloned().collect();
        let mut records = Vec::with_capacity(slots.len());
        for slot in slots {
            records.push(slot.lock().await.clone());
        }
        records.sort_by(|a, b| a.detected_at.cmp(&b.detected_at).then(a.id.cmp(&b.id)));
        records
    }

    /// Records that are not yet terminal, oldest first.
    pub async fn active_conflicts(&self) -> Vec<ConflictRecord> {
        self.all_conflicts()
            .await
            .into_iter()
            .filter(|r| !r.is_terminal())
            .collect()
    }

    /// Records touching a resource, oldest first.
    pub async fn conflicts_for_resource(&self, resource_id: &str) -> Vec<ConflictRecord> {
        self.all_conflicts()
            .await
            .into_iter()
            .filter(|r| r.resource_id == resource_id)
            .collect()
    }

    /// Drops terminal records. Returns how many were removed.
    pub async fn clear_terminal(&self) -> usize {
        let mut records = self.records.write().await;
        let mut terminal = Vec::new();
        for (id, slot) in records.iter() {
            // A locked slot is mid-resolution, so not terminal.
            if let Ok(record) = slot.try_lock() {
                if record.is_terminal() {
                    terminal.push(*id);
                }
            }
        }
        for id in &terminal {
            records.remove(id);
        }
        terminal.len()
    }

    // ── Observability ────────────────────────────────────────────

    /// Subscribes to every stored record transition.
    pub fn subscribe(&self) -> broadcast::Receiver<ConflictRecord> {
        self.events.subscribe()
    }

    /// Counters keyed by action (`detected`, `auto_resolved`, `resolved`,
    /// `failed`, `manual_intervention`, `ignored`).
    pub async fn resolution_stats(&self) -> HashMap<String, u64> {
        self.resolution_stats.lock().await.clone()
    }

    /// Average strategy latency in milliseconds over the recent window.
    pub async fn performance_averages(&self) -> HashMap<String, f64> {
        self.latencies
            .lock()
            .await
            .iter()
            .filter_map(|(name, w)| w.average_ms().map(|avg| (name.clone(), avg)))
            .collect()
    }

    async fn bump(&self, action: &str) {
        *self
            .resolution_stats
            .lock()
            .await
            .entry(action.to_string())
            .or_insert(0) += 1;
    }

    async fn record_latency(&self, strategy: &str, started: Instant) {
        let capacity = self.config.latency_window;
        self.latencies
            .lock()
            .await
            .entry(strategy.to_string())
            .or_insert_with(|| LatencyWindow::new(capacity))
            .push(started.elapsed());
    }

    fn emit(&self, record: &ConflictRecord) {
        // No receivers is fine.
        let _ = self.events.send(record.clone());
    }
}

impl Default for ConflictEngine {
    fn default() -> Self {
        Self::new(ConflictEngineConfig::default())
    }
}
