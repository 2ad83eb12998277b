//! Weighted flow selection
//!
//! Every spawn picks one flow from the phase's eligible set with
//! probability proportional to its weight. The selector itself is
//! immutable; callers pass in the RNG, so a seeded generator makes a whole
//! run reproducible.

use std::sync::Arc;

use rand::Rng;

use crate::error::PhaseError;
use crate::suite::definition::FlowDefinition;

/// Picks flows from a fixed candidate set by weight.
#[derive(Debug, Clone)]
pub struct FlowSelector {
    candidates: Vec<Arc<FlowDefinition>>,
    total_weight: u64,
}

impl FlowSelector {
    /// Creates a selector over `candidates`.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::NoEligibleFlows` if `candidates` is empty, or
    /// `PhaseError::InvalidWeights` if their weights sum to zero.
    pub fn new(phase: &str, candidates: &[Arc<FlowDefinition>]) -> Result<Self, PhaseError> {
        if candidates.is_empty() {
            return Err(PhaseError::NoEligibleFlows {
                phase: phase.to_string(),
            });
        }

        let total_weight: u64 = candidates.iter().map(|f| u64::from(f.weight)).sum();
        if total_weight == 0 {
            return Err(PhaseError::InvalidWeights {
                phase: phase.to_string(),
            });
        }

        Ok(Self {
            candidates: candidates.to_vec(),
            total_weight,
        })
    }

    /// Picks one candidate.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> &Arc<FlowDefinition> {
        let index = select_weighted(
            self.candidates.iter().map(|f| u64::from(f.weight)),
            self.total_weight,
            rng,
        );
        &self.candidates[index]
    }
}

/// Index of a weighted pick among `weights`, whose sum is `total`.
///
/// Draws `n` uniformly from `1..=total` and subtracts weights in order
/// until `n` drops to zero, so item `i` is picked with probability
/// `weights[i] / total`. Zero-weight items are never picked.
///
/// `total` must be nonzero and equal to the sum of `weights`.
pub fn select_weighted<R, I>(weights: I, total: u64, rng: &mut R) -> usize
where
    R: Rng + ?Sized,
    I: IntoIterator<Item = u64>,
{
    let mut remaining = rng.random_range(1..=total);
    let mut last = 0;
    for (i, weight) in weights.into_iter().enumerate() {
        last = i;
        if remaining <= weight {
            return i;
        }
        remaining -= weight;
    }
    last
}
