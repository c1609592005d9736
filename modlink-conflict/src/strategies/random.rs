use crate::error::{ConflictError, Result};
use crate::record::{ConflictRecord, ConflictType};
use crate::strategy::{Resolution, ResolutionStrategy};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

/// Picks a winner uniformly at random. Handles every conflict type at the
/// lowest priority, so it acts as the fallback.
pub struct RandomStrategy {
    rng: Mutex<StdRng>,
    priority: i32,
}

impl RandomStrategy {
    pub const NAME: &'static str = "random";

    /// Seeds from the operating system.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Reproducible choices, for tests.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl Default for RandomStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResolutionStrategy for RandomStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supported_types(&self) -> &[ConflictType] {
        &ConflictType::ALL
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn resolve(&self, conflict: &ConflictRecord) -> Result<Resolution> {
        let modules = &conflict.involved_modules;
        if modules.is_empty() {
            return Err(ConflictError::Unresolvable("no involved modules".into()));
        }
        let index = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..modules.len());
        let winner = &modules[index];
        Ok(Resolution::winner(
            winner.clone(),
            format!("module {winner} chosen at random from {}", modules.len()),
        ))
    }
}
