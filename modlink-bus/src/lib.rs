//! Unified in-process message bus for modlink.
//!
//! Modules exchange [`Message`](modlink_types::Message)s through three
//! operations:
//! - **publish**: fire-and-forget events delivered to every matching
//!   subscriber in registration order
//! - **request**: a targeted request awaiting exactly one correlated
//!   response, bounded by a timeout
//! - **subscribe**: predicate-filtered async handlers owned by a module
//!
//! Every constructed message is also emitted on an observable stream for
//! history and debugging tools, and per `type_action` counters are kept.
//!
//! # Example
//!
//! ```
//! # #[tokio::main]
//! # async fn main() {
//! use modlink_bus::MessageBus;
//! use modlink_types::{Payload, Priority};
//!
//! let bus = MessageBus::default();
//! let _handle = bus
//!     .subscribe_action("canvas", "brush_changed", |msg| async move {
//!         tracing::info!("brush now {:?}", msg.payload().get_str("name"));
//!         Ok(None)
//!     })
//!     .await;
//!
//! let msg = bus
//!     .publish("palette", "brush_changed", Payload::new().with("name", "ink"), Priority::Normal)
//!     .await;
//! assert_eq!(msg.sender(), "palette");
//! # }
//! ```

mod bus;
mod error;
mod stats;
mod subscription;

pub use bus::{BusConfig, MessageBus};
pub use error::{BusError, Result};
pub use stats::BusStatistics;
pub use subscription::{HandlerResult, SubscriptionHandle, SubscriptionId};
