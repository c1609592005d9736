//! Demo scenario and report types for the `modlink` tool.

use anyhow::{Context, Result};
use modlink_core::bus::BusStatistics;
use modlink_core::conflict::{ConflictSpec, ConflictType, Severity};
use modlink_core::router::{MessageFilter, RoutingRule, RoutingStats};
use modlink_core::sync::{ChangeType, SyncConfig, SyncStrategy};
use modlink_core::types::{Message, Payload, Priority};
use modlink_core::CommunicationCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Everything the demo prints.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DemoReport {
    pub bus: BusStatistics,
    pub routing: RoutingStats,
    pub conflicts: BTreeMap<String, u64>,
    pub strategy_latency_ms: BTreeMap<String, f64>,
    /// Sync results per status, across all modules.
    pub sync_results: BTreeMap<String, usize>,
    pub request_answered: bool,
    pub data_synced_events: u64,
}

/// Runs a short scenario touching every component of `core`.
pub async fn run_demo(core: &CommunicationCore) -> Result<DemoReport> {
    let bus = core.bus();
    let router = core.router();
    let sync = core.sync_manager();
    let engine = core.conflict_engine();

    router.add_rule(RoutingRule::new("demo.audit", "*", "*", "data_*"))?;
    router.add_filter("demo.quarantine", MessageFilter::deny_senders(["quarantined"]))?;

    let synced = Arc::new(AtomicU64::new(0));
    let counter = synced.clone();
    bus.subscribe_action("dashboard", "data_synced", move |_: Message| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(None)
        }
    })
    .await;
    bus.subscribe_action("storage", "load", |msg: Message| async move {
        let name = msg.payload().get_str("name")?.to_string();
        Ok(Some(Payload::new().with("content", format!("contents of {name}"))))
    })
    .await;

    info!("Publishing demo events");
    bus.publish("editor", "document_opened", Payload::new().with("name", "report.md"), Priority::Normal)
        .await;
    bus.publish("quarantined", "document_opened", Payload::new(), Priority::Low)
        .await;
    bus.broadcast("shell", "theme_changed", Payload::new().with("theme", "dark"))
        .await;

    let response = bus
        .request(
            "editor",
            Some("storage"),
            "load",
            Payload::new().with("name", "report.md"),
            Duration::from_secs(1),
        )
        .await
        .context("storage did not answer the load request")?;
    let request_answered = response.payload().contains_key("content");

    info!("Recording demo data changes");
    sync.register_sync_config(SyncConfig::new("autosave", SyncStrategy::Realtime).with_data_keys(["doc"]))
        .await?;
    sync.register_sync_config(
        SyncConfig::new("editor", SyncStrategy::ConflictResolution).with_data_keys(["doc"]),
    )
    .await?;
    sync.register_sync_config(SyncConfig::new("indexer", SyncStrategy::OnDemand).with_data_keys(["index"]))
        .await?;

    sync.record_data_change("autosave", "doc", ChangeType::Update, None, Some(json!("draft")), Payload::new())
        .await;
    sync.record_data_change("editor", "doc", ChangeType::Update, Some(json!("draft")), Some(json!("final")), Payload::new())
        .await;
    for term in ["alpha", "beta", "gamma"] {
        sync.record_data_change("indexer", "index", ChangeType::Create, None, Some(json!(term)), Payload::new())
            .await;
    }
    sync.trigger_sync("indexer").await?;

    info!("Raising a demo conflict");
    engine
        .detect_conflict(
            ConflictSpec::new(ConflictType::ResourceAccess, Severity::High, ["editor", "indexer"], "cpu")
                .with_description("both want a background worker"),
        )
        .await?;

    // Let the conflict forwarder publish before sampling statistics.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut sync_results = BTreeMap::new();
    for result in sync.all_history() {
        let status = serde_json::to_value(result.status)?
            .as_str()
            .unwrap_or("unknown")
            .to_string();
        *sync_results.entry(status).or_insert(0) += 1;
    }

    Ok(DemoReport {
        bus: bus.statistics().await,
        routing: router.stats(),
        conflicts: sorted(engine.resolution_stats().await),
        strategy_latency_ms: sorted(engine.performance_averages().await),
        sync_results,
        request_answered,
        data_synced_events: synced.load(Ordering::Relaxed),
    })
}

fn sorted<V>(map: HashMap<String, V>) -> BTreeMap<String, V> {
    map.into_iter().collect()
}
