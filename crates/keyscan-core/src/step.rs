//! Randomized step sizes

use num_bigint::{BigUint, RandBigInt};
use num_traits::Zero;
use rand::Rng;

use crate::error::ConfigError;

/// Inclusive step bound `[min, max]` with `0 < min <= max`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepBound {
    min: BigUint,
    max: BigUint,
}

impl StepBound {
    pub fn new(min: BigUint, max: BigUint) -> Result<Self, ConfigError> {
        if min.is_zero() || max.is_zero() {
            return Err(ConfigError::ZeroStep);
        }
        if min > max {
            return Err(ConfigError::StepOrder);
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> &BigUint {
        &self.min
    }

    pub fn max(&self) -> &BigUint {
        &self.max
    }
}

/// Draws step sizes uniformly from a [`StepBound`].
///
/// Sampling stays in big-integer arithmetic end to end, so bounds wider
/// than a machine word keep a uniform distribution. The generator holds no
/// RNG of its own; every worker passes in the one it owns.
#[derive(Debug, Clone)]
pub struct StepGenerator {
    min: BigUint,
    /// `max + 1`, the exclusive upper bound for sampling
    upper: BigUint,
}

impl StepGenerator {
    pub fn new(bound: &StepBound) -> Self {
        Self {
            min: bound.min.clone(),
            upper: &bound.max + 1u32,
        }
    }

    /// Next step, uniform over `[min, max]`
    pub fn next<R: Rng + ?Sized>(&self, rng: &mut R) -> BigUint {
        if self.is_fixed() {
            return self.min.clone();
        }
        rng.gen_biguint_range(&self.min, &self.upper)
    }

    /// `min == max`: every step is the same
    pub fn is_fixed(&self) -> bool {
        &self.min + 1u32 == self.upper
    }
}
