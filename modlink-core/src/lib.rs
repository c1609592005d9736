//! The modlink communication core.
//!
//! Builds one instance of each component from a [`CoreConfig`] and wires
//! them together. There are no globals; create a core per process (or per
//! test) and pass it around.
//!
//! ```no_run
//! use modlink_core::{CommunicationCore, CoreConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> modlink_core::Result<()> {
//! let config = CoreConfig::load_from("modlink.toml")?;
//! let core = CommunicationCore::new(config).await?;
//! let stats = core.bus().statistics().await;
//! println!("{} messages delivered", stats.delivered);
//! core.shutdown();
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod sink;
mod wiring;

pub use config::{BusSettings, CoreConfig, SyncSettings};
pub use error::{CoreError, Result};
pub use sink::{BusSink, DATA_SYNCED};
pub use wiring::{conflict_action, CommunicationCore, CORE_MODULE_ID};

pub use modlink_bus as bus;
pub use modlink_conflict as conflict;
pub use modlink_router as router;
pub use modlink_sync as sync;
pub use modlink_types as types;
