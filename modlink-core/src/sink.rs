use async_trait::async_trait;
use modlink_bus::MessageBus;
use modlink_sync::{DataChange, SyncError, SyncSink};
use modlink_types::{Payload, Priority};

/// Action of the event published for every committed sync batch.
pub const DATA_SYNCED: &str = "data_synced";

/// Publishes committed changes on the bus as `data_synced` events sent by
/// the module that owns them.
pub struct BusSink {
    bus: MessageBus,
}

impl BusSink {
    pub fn new(bus: MessageBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl SyncSink for BusSink {
    fn name(&self) -> &str {
        "bus"
    }

    async fn deliver(&self, module_id: &str, changes: &[DataChange]) -> modlink_sync::Result<()> {
        let encoded = serde_json::to_value(changes).map_err(|e| SyncError::Sink(e.to_string()))?;
        let payload = Payload::new()
            .with("module_id", module_id)
            .with("count", changes.len())
            .with("changes", encoded);
        self.bus
            .publish(module_id, DATA_SYNCED, payload, Priority::Normal)
            .await;
        Ok(())
    }
}
