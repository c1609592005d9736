use async_trait::async_trait;
use modlink_conflict::{
    ConflictEngine, ConflictEngineConfig, ConflictStatus, ConflictType, PriorityStrategy,
};
use modlink_sync::{
    ChangeType, DataChange, SyncConfig, SyncError, SyncManager, SyncManagerConfig, SyncSink,
    SyncStatus, SyncStrategy,
};
use modlink_types::Payload;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<(String, Vec<DataChange>)>>,
}

impl RecordingSink {
    fn batches(&self) -> Vec<(String, Vec<DataChange>)> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, module_id: &str, changes: &[DataChange]) -> modlink_sync::Result<()> {
        self.batches
            .lock()
            .unwrap()
            .push((module_id.to_string(), changes.to_vec()));
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl SyncSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn deliver(&self, _module_id: &str, _changes: &[DataChange]) -> modlink_sync::Result<()> {
        Err(SyncError::Sink("disk full".into()))
    }
}

/// Waits before accepting, so flushes stay in flight for a while.
#[derive(Default)]
struct SlowSink {
    inner: RecordingSink,
}

#[async_trait]
impl SyncSink for SlowSink {
    fn name(&self) -> &str {
        "slow"
    }

    async fn deliver(&self, module_id: &str, changes: &[DataChange]) -> modlink_sync::Result<()> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.inner.deliver(module_id, changes).await
    }
}

/// Records a follow-up change for the same module while delivering.
struct EchoSink {
    manager: Mutex<Option<SyncManager>>,
    inner: RecordingSink,
}

#[async_trait]
impl SyncSink for EchoSink {
    fn name(&self) -> &str {
        "echo"
    }

    async fn deliver(&self, module_id: &str, changes: &[DataChange]) -> modlink_sync::Result<()> {
        self.inner.deliver(module_id, changes).await?;
        let manager = self.manager.lock().unwrap().clone();
        if let Some(manager) = manager {
            if changes.iter().any(|c| c.data_key == "doc") {
                record(&manager, module_id, "derived", 0).await.unwrap();
            }
        }
        Ok(())
    }
}

async fn record(manager: &SyncManager, module: &str, key: &str, value: i64) -> Option<DataChange> {
    manager
        .record_data_change(
            module,
            key,
            ChangeType::Update,
            None,
            Some(json!(value)),
            Payload::new(),
        )
        .await
}

async fn manager_with_sink() -> (SyncManager, Arc<RecordingSink>) {
    let manager = SyncManager::default();
    let sink = Arc::new(RecordingSink::default());
    manager.add_sink(sink.clone()).await;
    (manager, sink)
}

// ── Registration ─────────────────────────────────────────────────

#[tokio::test]
async fn unregistered_module_changes_are_ignored() {
    let manager = SyncManager::default();
    assert!(record(&manager, "ghost", "k", 1).await.is_none());
    assert!(manager.all_history().is_empty());
}

#[tokio::test]
async fn untracked_key_is_never_queued() {
    let manager = SyncManager::default();
    manager
        .register_sync_config(SyncConfig::new("notes", SyncStrategy::OnDemand).with_data_keys(["a"]))
        .await
        .unwrap();

    assert!(record(&manager, "notes", "b", 1).await.is_none());
    assert!(manager.pending_changes("notes").is_empty());
}

#[tokio::test]
async fn zero_batch_interval_is_rejected() {
    let manager = SyncManager::default();
    let err = manager
        .register_sync_config(
            SyncConfig::new("m", SyncStrategy::Batch).with_batch_interval(Duration::ZERO),
        )
        .await
        .unwrap_err();
    match err {
        SyncError::InvalidConfig { module_id, .. } => assert_eq!(module_id, "m"),
        _ => panic!("Expected InvalidConfig"),
    }
    assert!(!manager.is_registered("m"));
}

#[tokio::test]
async fn reregister_carries_still_tracked_changes() {
    let manager = SyncManager::default();
    manager
        .register_sync_config(
            SyncConfig::new("m", SyncStrategy::OnDemand).with_data_keys(["a", "b"]),
        )
        .await
        .unwrap();
    record(&manager, "m", "a", 1).await.unwrap();
    record(&manager, "m", "b", 2).await.unwrap();

    manager
        .register_sync_config(SyncConfig::new("m", SyncStrategy::OnDemand).with_data_keys(["a"]))
        .await
        .unwrap();

    let pending = manager.pending_changes("m");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].data_key, "a");
    assert_eq!(manager.registered_modules(), vec!["m".to_string()]);
}

#[tokio::test]
async fn unregister_drops_pending_and_records_cancellation() {
    let manager = SyncManager::default();
    manager
        .register_sync_config(SyncConfig::new("m", SyncStrategy::OnDemand).with_data_keys(["k"]))
        .await
        .unwrap();
    record(&manager, "m", "k", 1).await.unwrap();

    assert!(manager.unregister_sync_config("m"));
    assert!(!manager.unregister_sync_config("m"));
    assert!(manager.pending_changes("m").is_empty());

    let history = manager.sync_history("m");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SyncStatus::Cancelled);

    match manager.trigger_sync("m").await.unwrap_err() {
        SyncError::NotRegistered(id) => assert_eq!(id, "m"),
        _ => panic!("Expected NotRegistered"),
    }
}

// ── Strategies ───────────────────────────────────────────────────

#[tokio::test]
async fn realtime_flushes_each_change() {
    let (manager, sink) = manager_with_sink().await;
    manager
        .register_sync_config(SyncConfig::new("live", SyncStrategy::Realtime).with_data_keys(["k"]))
        .await
        .unwrap();

    let change = record(&manager, "live", "k", 1).await.unwrap();
    assert!(manager.pending_changes("live").is_empty());

    let history = manager.sync_history("live");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SyncStatus::Success);
    assert_eq!(history[0].synced_changes, vec![change.clone()]);
    assert!(history[0].completed_at.is_some());
    assert_eq!(sink.batches(), vec![("live".to_string(), vec![change])]);
}

#[tokio::test]
async fn on_demand_waits_for_trigger() {
    let (manager, sink) = manager_with_sink().await;
    manager
        .register_sync_config(SyncConfig::new("m", SyncStrategy::OnDemand).with_data_keys(["k"]))
        .await
        .unwrap();

    for i in 0..5 {
        record(&manager, "m", "k", i).await.unwrap();
    }
    assert_eq!(manager.pending_changes("m").len(), 5);
    assert!(sink.batches().is_empty());

    let result = manager.trigger_sync("m").await.unwrap();
    assert_eq!(result.status, SyncStatus::Success);
    assert_eq!(result.synced_changes.len(), 5);
    assert!(manager.pending_changes("m").is_empty());

    // FIFO order.
    let values: Vec<i64> = result
        .synced_changes
        .iter()
        .map(|c| c.new_value.as_ref().unwrap().as_i64().unwrap())
        .collect();
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn empty_trigger_is_unrecorded_success() {
    let manager = SyncManager::default();
    manager
        .register_sync_config(SyncConfig::new("m", SyncStrategy::OnDemand).with_data_keys(["k"]))
        .await
        .unwrap();

    let result = manager.trigger_sync("m").await.unwrap();
    assert!(result.is_success());
    assert!(result.synced_changes.is_empty());
    assert!(manager.sync_history("m").is_empty());
}

#[tokio::test(start_paused = true)]
async fn batch_flushes_on_interval() {
    let (manager, sink) = manager_with_sink().await;
    manager
        .register_sync_config(
            SyncConfig::new("batch", SyncStrategy::Batch)
                .with_data_keys(["k"])
                .with_batch_interval(Duration::from_millis(100)),
        )
        .await
        .unwrap();

    for i in 0..3 {
        record(&manager, "batch", "k", i).await.unwrap();
    }
    assert_eq!(manager.pending_changes("batch").len(), 3);

    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(manager.pending_changes("batch").is_empty());
    let history = manager.sync_history("batch");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].synced_changes.len(), 3);
    assert_eq!(sink.batches().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unregister_stops_batch_timer() {
    let manager = SyncManager::default();
    manager
        .register_sync_config(
            SyncConfig::new("batch", SyncStrategy::Batch)
                .with_data_keys(["k"])
                .with_batch_interval(Duration::from_millis(100)),
        )
        .await
        .unwrap();
    record(&manager, "batch", "k", 1).await.unwrap();
    manager.unregister_sync_config("batch");

    tokio::time::sleep(Duration::from_millis(300)).await;
    let history = manager.sync_history("batch");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SyncStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_timers_but_keeps_pending() {
    let manager = SyncManager::default();
    manager
        .register_sync_config(
            SyncConfig::new("batch", SyncStrategy::Batch)
                .with_data_keys(["k"])
                .with_batch_interval(Duration::from_millis(50)),
        )
        .await
        .unwrap();
    manager.shutdown();
    record(&manager, "batch", "k", 1).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.pending_changes("batch").len(), 1);
    assert_eq!(manager.trigger_sync("batch").await.unwrap().synced_changes.len(), 1);
}

// ── Sinks & history ──────────────────────────────────────────────

#[tokio::test]
async fn sink_failure_marks_result_failed() {
    let (manager, recording) = manager_with_sink().await;
    manager.add_sink(Arc::new(FailingSink)).await;
    manager
        .register_sync_config(SyncConfig::new("m", SyncStrategy::Realtime).with_data_keys(["k"]))
        .await
        .unwrap();

    record(&manager, "m", "k", 1).await.unwrap();
    let result = manager.sync_history("m").pop().unwrap();
    assert_eq!(result.status, SyncStatus::Failed);
    assert!(result.error.unwrap().contains("disk full"));
    assert!(result.synced_changes.is_empty());
    assert_eq!(result.failed_changes.len(), 1);
    assert!(manager.pending_changes("m").is_empty());
    // Other sinks still received the changes.
    assert_eq!(recording.batches().len(), 1);
}

#[tokio::test]
async fn history_is_bounded() {
    let manager = SyncManager::new(SyncManagerConfig {
        max_history: 3,
        ..SyncManagerConfig::default()
    });
    manager
        .register_sync_config(SyncConfig::new("m", SyncStrategy::Realtime).with_data_keys(["k"]))
        .await
        .unwrap();
    for i in 0..5 {
        record(&manager, "m", "k", i).await.unwrap();
    }

    let history = manager.all_history();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].synced_changes[0].new_value, Some(json!(2)));
}

#[tokio::test]
async fn clear_pending_reports_count() {
    let manager = SyncManager::default();
    manager
        .register_sync_config(SyncConfig::new("m", SyncStrategy::OnDemand).with_data_keys(["k"]))
        .await
        .unwrap();
    record(&manager, "m", "k", 1).await.unwrap();
    record(&manager, "m", "k", 2).await.unwrap();

    assert_eq!(manager.clear_pending("m"), 2);
    assert_eq!(manager.clear_pending("m"), 0);
    assert_eq!(manager.clear_pending("unknown"), 0);
}

#[tokio::test]
async fn pending_snapshots_follow_queues() {
    let manager = SyncManager::default();
    let rx = manager.pending_snapshots();
    manager
        .register_sync_config(SyncConfig::new("m", SyncStrategy::OnDemand).with_data_keys(["k"]))
        .await
        .unwrap();
    record(&manager, "m", "k", 1).await.unwrap();
    assert_eq!(rx.borrow()["m"].len(), 1);

    manager.trigger_sync("m").await.unwrap();
    assert!(rx.borrow()["m"].is_empty());
}

// ── Conflict-aware path ──────────────────────────────────────────

async fn register_writers(manager: &SyncManager) {
    manager
        .register_sync_config(
            SyncConfig::new("autosave", SyncStrategy::Realtime).with_data_keys(["doc"]),
        )
        .await
        .unwrap();
    manager
        .register_sync_config(
            SyncConfig::new("editor", SyncStrategy::ConflictResolution).with_data_keys(["doc"]),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn overlapping_write_wins_by_timestamp() {
    let engine = Arc::new(
        ConflictEngine::with_default_strategies(ConflictEngineConfig::default(), HashMap::new())
            .await,
    );
    let manager = SyncManager::with_conflict_engine(SyncManagerConfig::default(), engine.clone());
    let sink = Arc::new(RecordingSink::default());
    manager.add_sink(sink.clone()).await;
    register_writers(&manager).await;

    record(&manager, "autosave", "doc", 1).await.unwrap();
    record(&manager, "editor", "doc", 2).await.unwrap();

    let result = manager.sync_history("editor").pop().unwrap();
    assert_eq!(result.status, SyncStatus::Conflict);
    assert_eq!(result.synced_changes.len(), 1);
    assert_eq!(result.conflicts.len(), 1);

    let conflict = &result.conflicts[0];
    assert!(conflict.committed);
    assert_eq!(conflict.other_module, "autosave");
    let record = conflict.record.as_ref().unwrap();
    assert_eq!(record.conflict_type, ConflictType::DataState);
    assert_eq!(record.status, ConflictStatus::Resolved);
    assert_eq!(record.winner.as_deref(), Some("editor"));

    assert_eq!(sink.batches().len(), 2);
    assert_eq!(engine.all_conflicts().await.len(), 1);
}

#[tokio::test]
async fn losing_write_is_dropped() {
    let engine = Arc::new(ConflictEngine::new(ConflictEngineConfig::default()));
    engine
        .add_strategy(Arc::new(
            PriorityStrategy::new(HashMap::from([("autosave".to_string(), 10)]))
                .with_types(vec![ConflictType::DataState]),
        ))
        .await
        .unwrap();
    let manager = SyncManager::with_conflict_engine(SyncManagerConfig::default(), engine);
    let sink = Arc::new(RecordingSink::default());
    manager.add_sink(sink.clone()).await;
    register_writers(&manager).await;

    record(&manager, "autosave", "doc", 1).await.unwrap();
    record(&manager, "editor", "doc", 2).await.unwrap();

    let result = manager.sync_history("editor").pop().unwrap();
    assert_eq!(result.status, SyncStatus::Conflict);
    assert!(result.synced_changes.is_empty());
    assert!(!result.conflicts[0].committed);
    assert_eq!(sink.batches().len(), 1);
}

#[tokio::test]
async fn overlap_without_engine_is_not_committed() {
    let manager = SyncManager::default();
    register_writers(&manager).await;

    record(&manager, "autosave", "doc", 1).await.unwrap();
    record(&manager, "editor", "doc", 2).await.unwrap();

    let result = manager.sync_history("editor").pop().unwrap();
    assert_eq!(result.status, SyncStatus::Conflict);
    assert!(result.synced_changes.is_empty());
    assert!(result.conflicts[0].record.is_none());
}

#[tokio::test]
async fn commit_outside_window_does_not_conflict() {
    let manager = SyncManager::new(SyncManagerConfig {
        conflict_window: Duration::from_millis(10),
        ..SyncManagerConfig::default()
    });
    register_writers(&manager).await;

    record(&manager, "autosave", "doc", 1).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    record(&manager, "editor", "doc", 2).await.unwrap();

    let result = manager.sync_history("editor").pop().unwrap();
    assert_eq!(result.status, SyncStatus::Success);
    assert_eq!(result.synced_changes.len(), 1);
}

#[tokio::test]
async fn own_recent_commit_does_not_conflict() {
    let manager = SyncManager::default();
    register_writers(&manager).await;

    record(&manager, "editor", "doc", 1).await.unwrap();
    record(&manager, "editor", "doc", 2).await.unwrap();

    let history = manager.sync_history("editor");
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|r| r.status == SyncStatus::Success));
}

#[tokio::test]
async fn concurrent_writers_to_one_key_conflict() {
    let engine = Arc::new(
        ConflictEngine::with_default_strategies(ConflictEngineConfig::default(), HashMap::new())
            .await,
    );
    let manager = SyncManager::with_conflict_engine(SyncManagerConfig::default(), engine.clone());
    let sink = Arc::new(SlowSink::default());
    manager.add_sink(sink.clone()).await;
    for module in ["a", "b"] {
        manager
            .register_sync_config(
                SyncConfig::new(module, SyncStrategy::ConflictResolution).with_data_keys(["doc"]),
            )
            .await
            .unwrap();
    }

    let (a, b) = tokio::join!(record(&manager, "a", "doc", 1), record(&manager, "b", "doc", 2));
    a.unwrap();
    b.unwrap();

    let results: Vec<_> = manager
        .all_history()
        .into_iter()
        .filter(|r| r.status == SyncStatus::Conflict)
        .collect();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].conflicts.len(), 1);
    assert_eq!(engine.conflicts_for_resource("doc").await.len(), 1);
}

#[tokio::test]
async fn write_in_flight_blocks_overlapping_write() {
    let manager = SyncManager::default();
    let sink = Arc::new(SlowSink::default());
    manager.add_sink(sink.clone()).await;
    register_writers(&manager).await;

    // The autosave write is still being delivered when the editor checks.
    let (a, b) = tokio::join!(
        record(&manager, "autosave", "doc", 1),
        record(&manager, "editor", "doc", 2)
    );
    a.unwrap();
    b.unwrap();

    let editor = manager.sync_history("editor").pop().unwrap();
    assert_eq!(editor.status, SyncStatus::Conflict);
    assert_eq!(editor.conflicts[0].other_module, "autosave");
    assert_eq!(sink.inner.batches().len(), 1);
}

// ── Re-entrant flushes ───────────────────────────────────────────

#[tokio::test]
async fn change_recorded_during_delivery_is_flushed_after() {
    let manager = SyncManager::default();
    let sink = Arc::new(EchoSink {
        manager: Mutex::new(None),
        inner: RecordingSink::default(),
    });
    *sink.manager.lock().unwrap() = Some(manager.clone());
    manager.add_sink(sink.clone()).await;
    manager
        .register_sync_config(
            SyncConfig::new("m", SyncStrategy::Realtime).with_data_keys(["doc", "derived"]),
        )
        .await
        .unwrap();

    let recorded = tokio::time::timeout(Duration::from_secs(2), record(&manager, "m", "doc", 1))
        .await
        .expect("record_data_change blocked on its own flush");
    recorded.unwrap();

    let keys: Vec<String> = sink
        .inner
        .batches()
        .into_iter()
        .flat_map(|(_, changes)| changes.into_iter().map(|c| c.data_key))
        .collect();
    assert_eq!(keys, vec!["doc", "derived"]);
    assert_eq!(manager.sync_history("m").len(), 2);
    assert!(manager.pending_changes("m").is_empty());

    // Break the manager <-> sink cycle.
    sink.manager.lock().unwrap().take();
}
