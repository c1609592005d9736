//! The sync manager: per-module pending queues, flush scheduling and the
//! conflict-aware commit path.

use crate::change::{ChangeId, ChangeType, DataChange};
use crate::config::{SyncConfig, SyncManagerConfig, SyncStrategy};
use crate::error::{Result, SyncError};
use crate::result::{SyncConflict, SyncResult, SyncStatus};
use crate::sink::SyncSink;
use chrono::{DateTime, Utc};
use modlink_conflict::{ConflictEngine, ConflictSpec, ConflictType, Severity};
use modlink_types::Payload;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Pending changes per module, as published on the snapshot stream.
pub type PendingSnapshot = BTreeMap<String, Vec<DataChange>>;

struct ModuleEntry {
    config: SyncConfig,
    pending: Mutex<VecDeque<DataChange>>,
    /// Held by the one task flushing this module. Never awaited: a second
    /// flush leaves its changes to the holder, which drains until empty.
    flush_lock: tokio::sync::Mutex<()>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl ModuleEntry {
    fn new(config: SyncConfig, pending: VecDeque<DataChange>) -> Self {
        Self {
            config,
            pending: Mutex::new(pending),
            flush_lock: tokio::sync::Mutex::new(()),
            timer: Mutex::new(None),
        }
    }

    fn module_id(&self) -> &str {
        &self.config.module_id
    }

    fn push(&self, change: DataChange) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(change);
    }

    fn drain(&self) -> Vec<DataChange> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }

    fn has_pending(&self) -> bool {
        !self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    fn snapshot(&self) -> Vec<DataChange> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn set_timer(&self, handle: JoinHandle<()>) {
        *self.timer.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    fn stop_timer(&self) {
        if let Some(handle) = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

/// A module's write to a data key, committed or on its way to the sinks.
#[derive(Debug, Clone)]
struct KeyWriter {
    module_id: String,
    change_id: ChangeId,
    at: DateTime<Utc>,
}

impl KeyWriter {
    fn of(change: &DataChange) -> Self {
        Self {
            module_id: change.module_id.clone(),
            change_id: change.id,
            at: change.timestamp,
        }
    }
}

/// Writers per data key. A change is reserved in `in_flight` before its
/// batch is delivered and moves to `committed` once every sink accepted it.
#[derive(Debug, Default)]
struct KeyLedger {
    committed: HashMap<String, KeyWriter>,
    in_flight: HashMap<String, Vec<KeyWriter>>,
}

impl KeyLedger {
    /// Another module's write that `change` overlaps with: one still in
    /// flight, else a commit inside `window`.
    fn contender(&self, change: &DataChange, window: Duration) -> Option<KeyWriter> {
        let in_flight = self
            .in_flight
            .get(&change.data_key)
            .into_iter()
            .flatten()
            .filter(|w| w.module_id != change.module_id)
            .max_by_key(|w| w.at);
        if let Some(writer) = in_flight {
            return Some(writer.clone());
        }

        let last = self.committed.get(&change.data_key)?;
        if last.module_id == change.module_id {
            return None;
        }
        // A commit stamped after this change counts as age zero.
        let age = change
            .timestamp
            .signed_duration_since(last.at)
            .to_std()
            .unwrap_or_default();
        (age <= window).then(|| last.clone())
    }

    fn reserve(&mut self, key: &str, writer: KeyWriter) {
        self.in_flight.entry(key.to_string()).or_default().push(writer);
    }

    fn release(&mut self, key: &str, change_id: ChangeId) {
        if let Some(writers) = self.in_flight.get_mut(key) {
            writers.retain(|w| w.change_id != change_id);
            if writers.is_empty() {
                self.in_flight.remove(key);
            }
        }
    }

    fn commit(&mut self, key: &str, writer: KeyWriter) {
        self.release(key, writer.change_id);
        let newer = self
            .committed
            .get(key)
            .is_none_or(|last| writer.at >= last.at);
        if newer {
            self.committed.insert(key.to_string(), writer);
        }
    }
}

/// The in-flight reservations of one batch. Whatever is still held when
/// this is dropped (a flush cancelled mid-delivery) is released.
struct Reservations<'a> {
    ledger: &'a Mutex<KeyLedger>,
    held: Vec<(String, KeyWriter)>,
}

impl<'a> Reservations<'a> {
    fn new(ledger: &'a Mutex<KeyLedger>) -> Self {
        Self {
            ledger,
            held: Vec::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'a, KeyLedger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves `change` and returns the write it overlaps with, if any.
    /// Check and reservation happen under one lock, so two concurrent
    /// writers to a key always see each other.
    fn check_and_reserve(&mut self, change: &DataChange, window: Duration) -> Option<KeyWriter> {
        let contender = {
            let mut ledger = self.lock();
            let contender = ledger.contender(change, window);
            ledger.reserve(&change.data_key, KeyWriter::of(change));
            contender
        };
        self.held.push((change.data_key.clone(), KeyWriter::of(change)));
        contender
    }

    fn reserve(&mut self, change: &DataChange) {
        self.lock()
            .reserve(&change.data_key, KeyWriter::of(change));
        self.held.push((change.data_key.clone(), KeyWriter::of(change)));
    }

    fn release(&mut self, change: &DataChange) {
        self.lock().release(&change.data_key, change.id);
        self.held.retain(|(_, w)| w.change_id != change.id);
    }

    /// Commits every held reservation when the batch was delivered, else
    /// releases them.
    fn settle(mut self, delivered: bool) {
        let held = std::mem::take(&mut self.held);
        let mut ledger = self.lock();
        for (key, writer) in held {
            if delivered {
                ledger.commit(&key, writer);
            } else {
                ledger.release(&key, writer.change_id);
            }
        }
    }
}

impl Drop for Reservations<'_> {
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let mut ledger = self.lock();
        for (key, writer) in self.held.drain(..) {
            ledger.release(&key, writer.change_id);
        }
    }
}

struct Inner {
    config: SyncManagerConfig,
    modules: RwLock<HashMap<String, Arc<ModuleEntry>>>,
    sinks: tokio::sync::RwLock<Vec<Arc<dyn SyncSink>>>,
    history: Mutex<VecDeque<SyncResult>>,
    ledger: Mutex<KeyLedger>,
    engine: Option<Arc<ConflictEngine>>,
    snapshots: watch::Sender<PendingSnapshot>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let modules = self
            .modules
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for entry in modules.values() {
            entry.stop_timer();
        }
    }
}

/// Tracks data changes per module and flushes them to the registered sinks
/// according to each module's [`SyncStrategy`].
///
/// Cloning is cheap; clones share state. Batch timers hold only a weak
/// reference and stop once the last clone is dropped.
#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<Inner>,
}

impl SyncManager {
    /// Creates a manager without a conflict engine. Overlapping writes on the
    /// conflict-aware path are then never committed.
    pub fn new(config: SyncManagerConfig) -> Self {
        Self::build(config, None)
    }

    /// Creates a manager that resolves overlapping writes through `engine`.
    pub fn with_conflict_engine(config: SyncManagerConfig, engine: Arc<ConflictEngine>) -> Self {
        Self::build(config, Some(engine))
    }

    fn build(config: SyncManagerConfig, engine: Option<Arc<ConflictEngine>>) -> Self {
        let (snapshots, _) = watch::channel(PendingSnapshot::new());
        Self {
            inner: Arc::new(Inner {
                config,
                modules: RwLock::new(HashMap::new()),
                sinks: tokio::sync::RwLock::new(Vec::new()),
                history: Mutex::new(VecDeque::new()),
                ledger: Mutex::new(KeyLedger::default()),
                engine,
                snapshots,
            }),
        }
    }

    pub fn config(&self) -> &SyncManagerConfig {
        &self.inner.config
    }

    pub fn conflict_engine(&self) -> Option<&Arc<ConflictEngine>> {
        self.inner.engine.as_ref()
    }

    /// Adds a destination for committed changes.
    pub async fn add_sink(&self, sink: Arc<dyn SyncSink>) {
        debug!("Adding sync sink {}", sink.name());
        self.inner.sinks.write().await.push(sink);
    }

    // ── Registration ─────────────────────────────────────────────

    /// Starts tracking a module, replacing any previous config for it.
    ///
    /// Pending changes of a replaced config carry over when the new config
    /// still tracks their key. Batch configs get a timer task flushing every
    /// `batch_interval`.
    pub async fn register_sync_config(&self, config: SyncConfig) -> Result<()> {
        if config.strategy == SyncStrategy::Batch && config.batch_interval.is_zero() {
            return Err(SyncError::InvalidConfig {
                module_id: config.module_id,
                reason: "batch interval must be non-zero".into(),
            });
        }

        let module_id = config.module_id.clone();
        let strategy = config.strategy;
        let interval = config.batch_interval;

        let mut carried = VecDeque::new();
        if let Some(previous) = self.modules_write().remove(&module_id) {
            previous.stop_timer();
            for change in previous.drain() {
                if config.tracks(&change.data_key) {
                    carried.push_back(change);
                } else {
                    warn!(
                        "Dropping pending change {} on {}: key {} no longer tracked",
                        change.id, module_id, change.data_key
                    );
                }
            }
        }

        let entry = Arc::new(ModuleEntry::new(config, carried));
        if strategy == SyncStrategy::Batch {
            entry.set_timer(spawn_batch_timer(
                Arc::downgrade(&self.inner),
                module_id.clone(),
                interval,
            ));
        }
        self.modules_write().insert(module_id.clone(), entry);
        info!("Registered sync for {} ({:?})", module_id, strategy);
        self.publish_snapshot();
        Ok(())
    }

    /// Stops tracking a module. Its timer is cancelled and its pending
    /// changes are dropped. Returns false if the module was not registered.
    pub fn unregister_sync_config(&self, module_id: &str) -> bool {
        let Some(entry) = self.modules_write().remove(module_id) else {
            return false;
        };
        entry.stop_timer();

        let dropped = entry.drain();
        if !dropped.is_empty() {
            warn!(
                "Unregistered {} with {} pending changes; they are lost",
                module_id,
                dropped.len()
            );
            let mut result = SyncResult::syncing(module_id);
            result.error = Some(format!(
                "{} pending changes dropped on unregister",
                dropped.len()
            ));
            self.push_history(result.finish(SyncStatus::Cancelled));
        }
        info!("Unregistered sync for {}", module_id);
        self.publish_snapshot();
        true
    }

    pub fn is_registered(&self, module_id: &str) -> bool {
        self.modules_read().contains_key(module_id)
    }

    pub fn sync_config(&self, module_id: &str) -> Option<SyncConfig> {
        self.modules_read().get(module_id).map(|e| e.config.clone())
    }

    /// Registered module ids, sorted.
    pub fn registered_modules(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.modules_read().keys().cloned().collect();
        ids.sort();
        ids
    }

    // ── Recording & flushing ─────────────────────────────────────

    /// Records a change for a tracked key.
    ///
    /// Returns `None` when the module is not registered or does not track
    /// `data_key`. Realtime and conflict-aware modules flush before this
    /// returns.
    pub async fn record_data_change(
        &self,
        module_id: &str,
        data_key: &str,
        change_type: ChangeType,
        old_value: Option<Value>,
        new_value: Option<Value>,
        metadata: Payload,
    ) -> Option<DataChange> {
        let Some(entry) = self.entry(module_id) else {
            debug!("Ignoring change from unregistered module {}", module_id);
            return None;
        };
        if !entry.config.tracks(data_key) {
            debug!("Ignoring change to untracked key {} from {}", data_key, module_id);
            return None;
        }

        let change = DataChange::new(module_id, data_key, change_type)
            .with_old_value(old_value)
            .with_new_value(new_value)
            .with_metadata(metadata);
        entry.push(change.clone());
        self.publish_snapshot();

        match entry.config.strategy {
            SyncStrategy::Realtime | SyncStrategy::ConflictResolution => {
                self.flush(&entry).await;
            }
            SyncStrategy::Batch | SyncStrategy::OnDemand => {}
        }
        Some(change)
    }

    /// Flushes every pending change of a module now.
    ///
    /// With nothing pending this is a successful no-op that is not recorded
    /// in history. While another flush of the module is running (for example
    /// when a sink's subscriber records a change for the same module), the
    /// changes are left to that flush and a `syncing` result is returned.
    pub async fn trigger_sync(&self, module_id: &str) -> Result<SyncResult> {
        let entry = self
            .entry(module_id)
            .ok_or_else(|| SyncError::NotRegistered(module_id.to_string()))?;
        Ok(self.flush(&entry).await)
    }

    /// Drains the module's queue batch by batch until it stays empty.
    /// Returns the result of the first batch.
    async fn flush(&self, entry: &ModuleEntry) -> SyncResult {
        let module_id = entry.module_id();
        let mut first = None;

        loop {
            let Ok(guard) = entry.flush_lock.try_lock() else {
                debug!("Flush for {} already running; leaving changes to it", module_id);
                return first.unwrap_or_else(|| SyncResult::syncing(module_id));
            };
            loop {
                let changes = entry.drain();
                if changes.is_empty() {
                    break;
                }
                let result = self.flush_batch(entry, changes).await;
                first.get_or_insert(result);
            }
            drop(guard);

            // A change pushed after the last drain but before the unlock found
            // the lock held and returned; pick it up here.
            if !entry.has_pending() {
                break;
            }
        }
        first.unwrap_or_else(|| SyncResult::syncing(module_id).finish(SyncStatus::Success))
    }

    async fn flush_batch(&self, entry: &ModuleEntry, changes: Vec<DataChange>) -> SyncResult {
        let module_id = entry.module_id();
        let mut result = SyncResult::syncing(module_id);
        self.publish_snapshot();
        debug!("Flushing {} changes for {}", changes.len(), module_id);

        let mut reservations = Reservations::new(&self.inner.ledger);
        let committed = if entry.config.strategy == SyncStrategy::ConflictResolution {
            let (committed, conflicts) = self.check_overlaps(changes, &mut reservations).await;
            result.conflicts = conflicts;
            committed
        } else {
            for change in &changes {
                reservations.reserve(change);
            }
            changes
        };

        let delivered = self.deliver(module_id, &committed).await;
        reservations.settle(delivered.is_ok());

        let status = match delivered {
            Err(e) => {
                warn!("Sync {} for {} failed: {}", result.sync_id, module_id, e);
                result.error = Some(e.to_string());
                result.failed_changes = committed;
                SyncStatus::Failed
            }
            Ok(()) => {
                result.synced_changes = committed;
                if result.conflicts.is_empty() {
                    SyncStatus::Success
                } else {
                    SyncStatus::Conflict
                }
            }
        };
        let result = result.finish(status);

        info!(
            "Sync {} for {}: {:?}, {} synced, {} conflicts",
            result.sync_id,
            module_id,
            result.status,
            result.synced_changes.len(),
            result.conflicts.len()
        );
        self.push_history(result.clone());
        result
    }

    /// Splits changes into those that may commit and those that overlap with
    /// another module's write (in flight, or committed inside the conflict
    /// window) and lost or could not be decided.
    async fn check_overlaps(
        &self,
        changes: Vec<DataChange>,
        reservations: &mut Reservations<'_>,
    ) -> (Vec<DataChange>, Vec<SyncConflict>) {
        let mut committed = Vec::with_capacity(changes.len());
        let mut conflicts = Vec::new();
        let window = self.inner.config.conflict_window;

        for change in changes {
            let Some(other) = reservations.check_and_reserve(&change, window) else {
                committed.push(change);
                continue;
            };

            let record = match &self.inner.engine {
                Some(engine) => match engine.detect_conflict(overlap_spec(&change, &other)).await {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("Could not record conflict on {}: {}", change.data_key, e);
                        None
                    }
                },
                None => None,
            };

            let won = record
                .as_ref()
                .is_some_and(|r| r.winner.as_deref() == Some(change.module_id.as_str()));
            if won {
                committed.push(change.clone());
            } else {
                reservations.release(&change);
                debug!(
                    "Dropping change {} on {}: overlaps with {}",
                    change.id, change.data_key, other.module_id
                );
            }
            conflicts.push(SyncConflict {
                change,
                other_module: other.module_id,
                record,
                committed: won,
            });
        }
        (committed, conflicts)
    }

    /// Hands committed changes to every sink. All sinks are tried; the first
    /// error is returned.
    async fn deliver(&self, module_id: &str, changes: &[DataChange]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let sinks: Vec<Arc<dyn SyncSink>> = self.inner.sinks.read().await.clone();
        let mut first_error = None;
        for sink in sinks {
            if let Err(e) = sink.deliver(module_id, changes).await {
                warn!("Sink {} rejected changes from {}: {}", sink.name(), module_id, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    // ── Pending queues ───────────────────────────────────────────

    /// Pending changes of a module, oldest first.
    pub fn pending_changes(&self, module_id: &str) -> Vec<DataChange> {
        self.entry(module_id)
            .map(|e| e.snapshot())
            .unwrap_or_default()
    }

    /// Drops a module's pending changes. Returns how many were dropped.
    pub fn clear_pending(&self, module_id: &str) -> usize {
        let cleared = self.entry(module_id).map_or(0, |e| e.drain().len());
        if cleared > 0 {
            debug!("Cleared {} pending changes for {}", cleared, module_id);
            self.publish_snapshot();
        }
        cleared
    }

    /// Stream of pending queues, updated on every change to any of them.
    pub fn pending_snapshots(&self) -> watch::Receiver<PendingSnapshot> {
        self.inner.snapshots.subscribe()
    }

    fn publish_snapshot(&self) {
        let snapshot: PendingSnapshot = self
            .modules_read()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.snapshot()))
            .collect();
        self.inner.snapshots.send_replace(snapshot);
    }

    // ── History ──────────────────────────────────────────────────

    /// Recorded results for a module, oldest first.
    pub fn sync_history(&self, module_id: &str) -> Vec<SyncResult> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.module_id == module_id)
            .cloned()
            .collect()
    }

    /// Every recorded result, oldest first.
    pub fn all_history(&self) -> Vec<SyncResult> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn push_history(&self, result: SyncResult) {
        let capacity = self.inner.config.max_history.max(1);
        let mut history = self
            .inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while history.len() >= capacity {
            history.pop_front();
        }
        history.push_back(result);
    }

    /// Cancels every batch timer. Pending changes stay queued and can still
    /// be flushed with [`trigger_sync`](Self::trigger_sync).
    pub fn shutdown(&self) {
        for entry in self.modules_read().values() {
            entry.stop_timer();
        }
        info!("Sync manager timers stopped");
    }

    fn entry(&self, module_id: &str) -> Option<Arc<ModuleEntry>> {
        self.modules_read().get(module_id).cloned()
    }

    fn modules_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<ModuleEntry>>> {
        self.inner
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn modules_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<ModuleEntry>>> {
        self.inner
            .modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SyncManager {
    fn default() -> Self {
        Self::new(SyncManagerConfig::default())
    }
}

/// Builds the conflict raised when `change` lands on a key `other` is writing
/// or committed inside the conflict window.
fn overlap_spec(change: &DataChange, other: &KeyWriter) -> ConflictSpec {
    let mut timestamps = Map::new();
    timestamps.insert(
        change.module_id.clone(),
        Value::String(change.timestamp.to_rfc3339()),
    );
    timestamps.insert(other.module_id.clone(), Value::String(other.at.to_rfc3339()));

    ConflictSpec::new(
        ConflictType::DataState,
        Severity::High,
        [change.module_id.clone(), other.module_id.clone()],
        change.data_key.clone(),
    )
    .with_description(format!(
        "{} and {} both wrote {}",
        change.module_id, other.module_id, change.data_key
    ))
    .with_metadata(
        Payload::new()
            .with("timestamps", Value::Object(timestamps))
            .with("change_id", change.id.to_string()),
    )
}

fn spawn_batch_timer(inner: Weak<Inner>, module_id: String, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("Batch timer for {} started ({:?})", module_id, period);

        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let manager = SyncManager { inner };
            if let Err(e) = manager.trigger_sync(&module_id).await {
                debug!("Batch timer for {} stopping: {}", module_id, e);
                break;
            }
        }
        debug!("Batch timer for {} exited", module_id);
    })
}
