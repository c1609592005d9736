use crate::config::CoreConfig;
use crate::error::Result;
use crate::sink::BusSink;
use modlink_bus::MessageBus;
use modlink_conflict::{ConflictEngine, ConflictRecord, ConflictStatus};
use modlink_router::EventRouter;
use modlink_sync::SyncManager;
use modlink_types::{Payload, Priority};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Sender id of events the core publishes on its own behalf.
pub const CORE_MODULE_ID: &str = "modlink.core";

/// One bus, router, conflict engine and sync manager, wired together.
///
/// - the router is attached to the bus
/// - the sync manager resolves overlapping writes through the engine
/// - committed sync batches are published as `data_synced` events
/// - terminal conflict records are published as `conflict_<status>` events
pub struct CommunicationCore {
    config: CoreConfig,
    router: Arc<EventRouter>,
    bus: MessageBus,
    engine: Arc<ConflictEngine>,
    sync: SyncManager,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl CommunicationCore {
    pub async fn new(config: CoreConfig) -> Result<Self> {
        let router = Arc::new(EventRouter::new());
        for rule in &config.routing_rules {
            router.add_rule(rule.clone())?;
        }

        let bus = MessageBus::new(config.bus_config()).with_router(router.clone());
        let engine = Arc::new(
            ConflictEngine::with_default_strategies(config.conflict.clone(), config.priority_map())
                .await,
        );
        let sync = SyncManager::with_conflict_engine(config.sync_config(), engine.clone());
        sync.add_sink(Arc::new(BusSink::new(bus.clone()))).await;

        let forwarder = spawn_conflict_forwarder(engine.subscribe(), bus.clone());
        info!(
            "Communication core ready ({} routing rules, {} module priorities)",
            config.routing_rules.len(),
            config.module_priorities.len()
        );

        Ok(Self {
            config,
            router,
            bus,
            engine,
            sync,
            forwarder: Mutex::new(Some(forwarder)),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn conflict_engine(&self) -> &Arc<ConflictEngine> {
        &self.engine
    }

    pub fn sync_manager(&self) -> &SyncManager {
        &self.sync
    }

    /// Stops the conflict forwarder and every batch timer.
    pub fn shutdown(&self) {
        if let Some(forwarder) = self
            .forwarder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            forwarder.abort();
        }
        self.sync.shutdown();
        info!("Communication core shut down");
    }
}

impl Drop for CommunicationCore {
    fn drop(&mut self) {
        let forwarder = self
            .forwarder
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = forwarder.take() {
            handle.abort();
        }
    }
}

/// Action published for a terminal conflict record.
pub fn conflict_action(status: ConflictStatus) -> String {
    format!("conflict_{}", status.as_str())
}

fn spawn_conflict_forwarder(
    mut records: broadcast::Receiver<ConflictRecord>,
    bus: MessageBus,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match records.recv().await {
                Ok(record) if record.is_terminal() => publish_conflict(&bus, &record).await,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Conflict forwarder lagged, {} records not published", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Conflict forwarder exited");
    })
}

async fn publish_conflict(bus: &MessageBus, record: &ConflictRecord) {
    let payload = match Payload::from_serialize(record) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Could not encode conflict {}: {}", record.id, e);
            return;
        }
    };
    let priority = match record.status {
        ConflictStatus::Failed | ConflictStatus::ManualIntervention => Priority::High,
        _ => Priority::Normal,
    };
    bus.publish(CORE_MODULE_ID, conflict_action(record.status), payload, priority)
        .await;
}
