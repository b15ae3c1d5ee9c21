//! Per-rank run context for simulation models.

use crate::types::Rank;
use rand::RngCore;

/// Everything a model step needs from its surroundings besides messaging.
///
/// # Determinism
///
/// Models draw all randomness from `derive_rng`, which combines the run's
/// master seed with the rank and a caller-chosen stream number. Replaying a
/// run with the same seed and rank count reproduces it exactly.
pub trait RunContext: Send + Sync + 'static {
    /// Random generator handed out by `derive_rng`.
    type Rng: RngCore + Send;

    /// Returns the rank this context belongs to.
    fn rank(&self) -> Rank;

    /// Returns the current tick.
    fn tick(&self) -> u64;

    /// Advances the tick counter by one and returns the new tick.
    fn advance_tick(&self) -> u64;

    /// Returns the master seed.
    fn seed(&self) -> u64;

    /// Returns a generator unique to (seed, rank, stream).
    fn derive_rng(&self, stream: u64) -> Self::Rng;
}
