//! TOML configuration for the communication core.
//!
//! ```toml
//! module_priorities = { storage = 100, editor = 50 }
//!
//! [bus]
//! request_timeout_ms = 2000
//!
//! [sync]
//! conflict_window_ms = 5000
//!
//! [conflict]
//! auto_resolve_threshold = "high"
//!
//! [[routing_rules]]
//! id = "audit"
//! source_pattern = "*"
//! target_pattern = "*"
//! action_pattern = "data_*"
//! ```
//!
//! Every section and field is optional.

use crate::error::{CoreError, Result};
use modlink_bus::BusConfig;
use modlink_conflict::ConflictEngineConfig;
use modlink_router::RoutingRule;
use modlink_sync::SyncManagerConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    pub request_timeout_ms: u64,
    pub stream_capacity: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            stream_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub conflict_window_ms: u64,
    pub max_history: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            conflict_window_ms: 5_000,
            max_history: 1_000,
        }
    }
}

/// Configuration for [`CommunicationCore`](crate::CommunicationCore).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Module priorities for the priority strategy. Unlisted modules are 0.
    pub module_priorities: BTreeMap<String, i32>,
    pub bus: BusSettings,
    pub sync: SyncSettings,
    pub conflict: ConflictEngineConfig,
    /// Rules installed on the router at startup.
    pub routing_rules: Vec<RoutingRule>,
}

impl CoreConfig {
    /// Loads a config file. A missing file yields the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| CoreError::Config {
            origin: path.display().to_string(),
            source,
        })?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Parses a config from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|source| CoreError::Config {
            origin: "<string>".into(),
            source,
        })
    }

    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            request_timeout: Duration::from_millis(self.bus.request_timeout_ms),
            stream_capacity: self.bus.stream_capacity,
        }
    }

    pub fn sync_config(&self) -> SyncManagerConfig {
        SyncManagerConfig {
            conflict_window: Duration::from_millis(self.sync.conflict_window_ms),
            max_history: self.sync.max_history,
        }
    }

    pub fn priority_map(&self) -> HashMap<String, i32> {
        self.module_priorities
            .iter()
            .map(|(module, p)| (module.clone(), *p))
            .collect()
    }
}
