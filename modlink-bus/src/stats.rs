//! Delivery statistics.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of bus statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStatistics {
    /// Messages constructed, keyed by `<type>_<action>`.
    pub by_type_action: HashMap<String, u64>,
    /// Successful handler invocations.
    pub delivered: u64,
    /// Handler invocations that returned an error or panicked.
    pub handler_failures: u64,
    /// Messages a router filter vetoed.
    pub filtered: u64,
    /// Requests that timed out.
    pub timeouts: u64,
}

impl BusStatistics {
    /// Count for one `<type>_<action>` key.
    pub fn count(&self, key: &str) -> u64 {
        self.by_type_action.get(key).copied().unwrap_or(0)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) delivered: AtomicU64,
    pub(crate) handler_failures: AtomicU64,
    pub(crate) filtered: AtomicU64,
    pub(crate) timeouts: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        self.delivered.store(0, Ordering::Relaxed);
        self.handler_failures.store(0, Ordering::Relaxed);
        self.filtered.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, by_type_action: HashMap<String, u64>) -> BusStatistics {
        BusStatistics {
            by_type_action,
            delivered: self.delivered.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}
