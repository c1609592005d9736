//! The event router.

use crate::error::{Result, RouterError};
use crate::filter::MessageFilter;
use crate::rule::RoutingRule;
use modlink_types::Message;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Side effect run for every message a rule routes.
pub type RouteHandler = Arc<dyn Fn(&Message, &RoutingRule) + Send + Sync>;

/// Capacity of the delivery stream.
const DELIVERY_CHANNEL_CAPACITY: usize = 256;

/// A message routed along a rule, emitted on [`EventRouter::deliveries`].
#[derive(Debug, Clone)]
pub struct Delivery {
    pub rule_id: String,
    pub message: Message,
}

/// Outcome of a routing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A filter vetoed the message.
    Filtered,
    /// No enabled rule matched.
    NoRoute,
    /// The message was routed along this many rules.
    Routed(usize),
}

impl RouteOutcome {
    pub fn is_routed(&self) -> bool {
        matches!(self, Self::Routed(_))
    }

    pub fn is_filtered(&self) -> bool {
        matches!(self, Self::Filtered)
    }
}

/// Routing counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingStats {
    pub routed: u64,
    pub filtered: u64,
    pub no_route: u64,
}

#[derive(Clone)]
struct Route {
    rule: RoutingRule,
    handler: Option<RouteHandler>,
}

#[derive(Default)]
struct Counters {
    routed: AtomicU64,
    filtered: AtomicU64,
    no_route: AtomicU64,
}

/// Holds routing rules and filters and routes messages along them.
///
/// Rules and filters live behind separate locks. A routing decision works on
/// a snapshot, so side effects may add or remove rules without deadlocking.
pub struct EventRouter {
    routes: RwLock<Vec<Route>>,
    filters: RwLock<Vec<(String, MessageFilter)>>,
    counters: Counters,
    deliveries: broadcast::Sender<Delivery>,
}

impl EventRouter {
    /// Creates an empty router.
    pub fn new() -> Self {
        let (deliveries, _) = broadcast::channel(DELIVERY_CHANNEL_CAPACITY);
        Self {
            routes: RwLock::new(Vec::new()),
            filters: RwLock::new(Vec::new()),
            counters: Counters::default(),
            deliveries,
        }
    }

    // ── Rules ────────────────────────────────────────────────────

    /// Adds a rule without a side effect.
    pub fn add_rule(&self, rule: RoutingRule) -> Result<()> {
        self.insert_route(Route {
            rule,
            handler: None,
        })
    }

    /// Adds a rule whose side effect runs for every message it routes.
    pub fn add_rule_with_handler<F>(&self, rule: RoutingRule, handler: F) -> Result<()>
    where
        F: Fn(&Message, &RoutingRule) + Send + Sync + 'static,
    {
        self.insert_route(Route {
            rule,
            handler: Some(Arc::new(handler)),
        })
    }

    fn insert_route(&self, route: Route) -> Result<()> {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        if routes.iter().any(|r| r.rule.id == route.rule.id) {
            return Err(RouterError::DuplicateRule(route.rule.id));
        }
        debug!(
            "Adding routing rule {} (priority {})",
            route.rule.id, route.rule.priority
        );
        routes.push(route);
        // Stable: equal priorities keep insertion order.
        routes.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
        Ok(())
    }

    /// Removes every rule with this id. Returns false if none existed.
    pub fn remove_rule(&self, id: &str) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        let before = routes.len();
        routes.retain(|r| r.rule.id != id);
        before != routes.len()
    }

    /// Enables or disables a rule. Returns false if the id is unknown.
    pub fn set_rule_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        match routes.iter_mut().find(|r| r.rule.id == id) {
            Some(route) => {
                route.rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Returns all rules, highest priority first.
    pub fn rules(&self) -> Vec<RoutingRule> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| r.rule.clone())
            .collect()
    }

    /// Returns the enabled rules matching the triple, highest priority first.
    pub fn find_matching_rules(
        &self,
        source: &str,
        target: Option<&str>,
        action: &str,
    ) -> Vec<RoutingRule> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.rule.matches(source, target, action))
            .map(|r| r.rule.clone())
            .collect()
    }

    // ── Filters ──────────────────────────────────────────────────

    /// Registers a filter under an id.
    pub fn add_filter(&self, id: impl Into<String>, filter: MessageFilter) -> Result<()> {
        let id = id.into();
        let mut filters = self.filters.write().unwrap_or_else(PoisonError::into_inner);
        if filters.iter().any(|(fid, _)| *fid == id) {
            return Err(RouterError::DuplicateFilter(id));
        }
        filters.push((id, filter));
        Ok(())
    }

    /// Removes a filter. Returns false if the id is unknown.
    pub fn remove_filter(&self, id: &str) -> bool {
        let mut filters = self.filters.write().unwrap_or_else(PoisonError::into_inner);
        let before = filters.len();
        filters.retain(|(fid, _)| fid != id);
        before != filters.len()
    }

    /// Returns true if every filter allows the message.
    pub fn is_allowed(&self, message: &Message) -> bool {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .all(|(_, f)| f.allows(message))
    }

    // ── Routing ──────────────────────────────────────────────────

    /// Routes a message and reports what happened.
    pub fn route(&self, message: &Message) -> RouteOutcome {
        if !self.is_allowed(message) {
            self.counters.filtered.fetch_add(1, Ordering::Relaxed);
            debug!("Message {} ({}) filtered", message.id(), message.action());
            return RouteOutcome::Filtered;
        }

        let matched: Vec<Route> = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| {
                r.rule
                    .matches(message.sender(), message.target(), message.action())
            })
            .cloned()
            .collect();

        if matched.is_empty() {
            self.counters.no_route.fetch_add(1, Ordering::Relaxed);
            debug!(
                "No route for {} -> {:?} ({})",
                message.sender(),
                message.target(),
                message.action()
            );
            return RouteOutcome::NoRoute;
        }

        for route in &matched {
            if let Some(handler) = &route.handler {
                let result = catch_unwind(AssertUnwindSafe(|| handler(message, &route.rule)));
                if result.is_err() {
                    warn!(
                        "Route handler for rule {} panicked on message {}",
                        route.rule.id,
                        message.id()
                    );
                }
            }
            // No receivers is fine.
            let _ = self.deliveries.send(Delivery {
                rule_id: route.rule.id.clone(),
                message: message.clone(),
            });
        }

        self.counters.routed.fetch_add(1, Ordering::Relaxed);
        RouteOutcome::Routed(matched.len())
    }

    /// Routes a message. Returns true if at least one rule delivered it.
    pub fn route_message(&self, message: &Message) -> bool {
        self.route(message).is_routed()
    }

    /// Subscribes to the stream of deliveries.
    pub fn deliveries(&self) -> broadcast::Receiver<Delivery> {
        self.deliveries.subscribe()
    }

    /// Returns the routing counters.
    pub fn stats(&self) -> RoutingStats {
        RoutingStats {
            routed: self.counters.routed.load(Ordering::Relaxed),
            filtered: self.counters.filtered.load(Ordering::Relaxed),
            no_route: self.counters.no_route.load(Ordering::Relaxed),
        }
    }

    /// Resets the routing counters to zero.
    pub fn reset_stats(&self) {
        self.counters.routed.store(0, Ordering::Relaxed);
        self.counters.filtered.store(0, Ordering::Relaxed);
        self.counters.no_route.store(0, Ordering::Relaxed);
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}
