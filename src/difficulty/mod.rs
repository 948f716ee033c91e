//! Difficulty adjustment
//!
//! Difficulty is tracked as a hardness value `D >= 1`. Proof engines work
//! with a target ceiling instead, derived as `(2^256 - 1) / D`, so that
//! raising the difficulty lowers the ceiling.

pub mod adjuster;
pub mod metrics;

pub use adjuster::{
    DifficultyAdjuster, DifficultyConfig, MultiFactorConfig, DIFFICULTY_ADJUSTMENT_INTERVAL,
    FACTOR_SCALE, MAX_ADJUSTMENT_FACTOR, MIN_ADJUSTMENT_FACTOR, TARGET_BLOCK_TIME,
};
pub use metrics::{aggregate_window_metrics, BlockMetrics, WindowMetrics};

use crate::crypto::max_target;
use num_bigint::BigUint;
use num_traits::{One, Zero};
use thiserror::Error;

/// Metrics errors
#[derive(Error, Debug, PartialEq)]
pub enum MetricsError {
    #[error("Metric {field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: String },
}

/// Target ceiling for a difficulty. Zero is treated as one.
pub fn difficulty_to_target(difficulty: &BigUint) -> BigUint {
    if difficulty.is_zero() {
        return max_target();
    }
    max_target() / difficulty
}

/// Difficulty a target ceiling corresponds to, at least one
pub fn target_to_difficulty(target: &BigUint) -> BigUint {
    if target.is_zero() {
        return max_target();
    }
    (max_target() / target).max(BigUint::one())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_one_is_easiest() {
        assert_eq!(difficulty_to_target(&BigUint::one()), max_target());
        assert_eq!(difficulty_to_target(&BigUint::zero()), max_target());
    }

    #[test]
    fn test_higher_difficulty_lowers_target() {
        let easy = difficulty_to_target(&BigUint::from(2u8));
        let hard = difficulty_to_target(&BigUint::from(256u32));
        assert!(hard < easy);
        assert_eq!(hard, max_target() >> 8u32);
    }

    #[test]
    fn test_target_round_trips_to_difficulty() {
        let difficulty = BigUint::from(1000u32);
        assert_eq!(target_to_difficulty(&difficulty_to_target(&difficulty)), difficulty);
        assert_eq!(target_to_difficulty(&max_target()), BigUint::one());
        assert_eq!(target_to_difficulty(&BigUint::zero()), max_target());
    }
}
