//! Rule-based event router for modlink.
//!
//! The router holds an ordered set of [`RoutingRule`]s and a set of
//! [`MessageFilter`]s and decides whether, and along which rules, a message
//! is delivered.
//!
//! # Routing decision
//!
//! 1. **Filter**: every registered filter may veto the message (AND).
//! 2. **Match**: enabled rules whose source, target and action patterns all
//!    match are selected, highest priority first.
//! 3. **Deliver**: each matching rule's side effect runs and a [`Delivery`]
//!    is emitted on the router's stream.
//!
//! # Example
//!
//! ```
//! use modlink_router::{EventRouter, RoutingRule};
//! use modlink_types::{Message, MessageId, MessageType};
//!
//! let router = EventRouter::new();
//! router
//!     .add_rule(RoutingRule::new("system_broadcasts", "system", "*", "broadcast_*").with_priority(100))
//!     .unwrap();
//!
//! let msg = Message::new(MessageId::from_raw(1), MessageType::Event, "system", "broadcast_update");
//! assert!(router.route_message(&msg));
//! assert_eq!(router.stats().routed, 1);
//! ```

mod error;
mod filter;
pub mod glob;
mod router;
mod rule;

pub use error::{Result, RouterError};
pub use filter::{FilterPredicate, MessageFilter};
pub use router::{Delivery, EventRouter, RouteHandler, RouteOutcome, RoutingStats};
pub use rule::RoutingRule;
