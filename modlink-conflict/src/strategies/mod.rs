//! Built-in resolution strategies.

mod manual;
mod priority;
mod random;
mod timestamp;

pub use manual::ManualInterventionStrategy;
pub use priority::PriorityStrategy;
pub use random::RandomStrategy;
pub use timestamp::TimestampStrategy;
