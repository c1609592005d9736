//! Conflict resolution engine for modlink.
//!
//! A conflict is recorded when two or more modules contend over the same
//! resource. The engine picks the first registered [`ResolutionStrategy`]
//! (by priority) able to handle it and stores the terminal record the
//! strategy produces.
//!
//! # Lifecycle
//!
//! ```text
//! detected ──► resolving ──► resolved
//!                       ├──► failed
//!                       ├──► manual_intervention
//!                       └──► ignored
//! ```
//!
//! Conflicts of severity `high` or above are resolved before
//! [`ConflictEngine::detect_conflict`] returns; lower severities wait for an
//! explicit [`ConflictEngine::resolve_conflict`].
//!
//! ## Built-in strategies
//!
//! - [`PriorityStrategy`]: highest configured module priority wins
//! - [`TimestampStrategy`]: latest `metadata.timestamps` entry wins
//! - [`RandomStrategy`]: uniform choice, seedable for tests
//! - [`ManualInterventionStrategy`]: escalates instead of choosing

mod engine;
mod error;
mod metrics;
mod record;
mod strategy;
pub mod strategies;

pub use engine::{ConflictEngine, ConflictEngineConfig, NO_STRATEGY_REASON};
pub use error::{ConflictError, Result};
pub use record::{
    ConflictId, ConflictRecord, ConflictSpec, ConflictStatus, ConflictType, Severity,
};
pub use strategies::{
    ManualInterventionStrategy, PriorityStrategy, RandomStrategy, TimestampStrategy,
};
pub use strategy::{Resolution, ResolutionStrategy};
