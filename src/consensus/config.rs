//! Proof engine configuration
//!
//! Stage weights decide how much each stage's wall time counts towards the
//! reported energy figure, and the sizing parameters decide how expensive
//! each stage is per nonce attempt.

use super::ConsensusError;
use crate::crypto::HASH_SIZE;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Defaults
// =============================================================================

/// Stage weights must add up to exactly this
pub const WEIGHT_TOTAL: u32 = 100;

/// Default memory-phase buffer size (64 KiB)
pub const DEFAULT_MEMORY_SIZE: usize = 64 * 1024;

/// Default number of fill-and-mix rounds over the memory buffer
pub const DEFAULT_MEMORY_ITERATIONS: u32 = 2;

/// Default total delay imposed by the time-lock phase per attempt
pub const DEFAULT_TIME_LOCK_DURATION_MS: u64 = 10;

/// Default number of sequential re-hashes in the time-lock phase
pub const DEFAULT_TIME_LOCK_ITERATIONS: u32 = 16;

/// Ciphertext is truncated to this many bytes between cipher rounds
pub const DEFAULT_CRYPTO_KEY_SIZE: usize = 32;

/// Default number of encrypt-and-feed-forward rounds
pub const DEFAULT_CRYPTO_ITERATIONS: u32 = 32;

/// Default wall-clock ceiling for one `mine` call
pub const DEFAULT_MAX_MINING_TIME_MS: u64 = 60_000;

/// Largest truncation length the stream cipher key can back
pub const MAX_CRYPTO_KEY_SIZE: usize = 32;

/// Relative weight of each proof stage, in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageWeights {
    pub memory: u32,
    pub time_lock: u32,
    pub crypto: u32,
}

impl StageWeights {
    pub fn new(memory: u32, time_lock: u32, crypto: u32) -> Self {
        Self {
            memory,
            time_lock,
            crypto,
        }
    }

    pub fn total(&self) -> u32 {
        self.memory
            .saturating_add(self.time_lock)
            .saturating_add(self.crypto)
    }

    /// Weighted blend of per-stage costs, scaled back down by the weight total
    pub fn weigh(&self, memory: u64, time_lock: u64, crypto: u64) -> u64 {
        let sum = u128::from(memory) * u128::from(self.memory)
            + u128::from(time_lock) * u128::from(self.time_lock)
            + u128::from(crypto) * u128::from(self.crypto);
        u64::try_from(sum / u128::from(WEIGHT_TOTAL)).unwrap_or(u64::MAX)
    }
}

impl Default for StageWeights {
    fn default() -> Self {
        Self::new(40, 30, 30)
    }
}

/// Parameters for the three-stage proof engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProofConfig {
    pub weights: StageWeights,
    /// Memory-phase buffer size in bytes (multiple of 32)
    pub memory_size: usize,
    pub memory_iterations: u32,
    pub time_lock_duration_ms: u64,
    pub time_lock_iterations: u32,
    pub crypto_key_size: usize,
    pub crypto_iterations: u32,
    pub max_mining_time_ms: u64,
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            weights: StageWeights::default(),
            memory_size: DEFAULT_MEMORY_SIZE,
            memory_iterations: DEFAULT_MEMORY_ITERATIONS,
            time_lock_duration_ms: DEFAULT_TIME_LOCK_DURATION_MS,
            time_lock_iterations: DEFAULT_TIME_LOCK_ITERATIONS,
            crypto_key_size: DEFAULT_CRYPTO_KEY_SIZE,
            crypto_iterations: DEFAULT_CRYPTO_ITERATIONS,
            max_mining_time_ms: DEFAULT_MAX_MINING_TIME_MS,
        }
    }
}

impl ProofConfig {
    /// Small, fast parameters for tests and local experiments
    pub fn lightweight() -> Self {
        Self {
            memory_size: 1024,
            memory_iterations: 1,
            time_lock_duration_ms: 0,
            time_lock_iterations: 4,
            crypto_iterations: 4,
            max_mining_time_ms: 10_000,
            ..Self::default()
        }
    }

    pub fn time_lock_duration(&self) -> Duration {
        Duration::from_millis(self.time_lock_duration_ms)
    }

    pub fn max_mining_time(&self) -> Duration {
        Duration::from_millis(self.max_mining_time_ms)
    }

    /// Check the configuration. Weights are checked before anything else.
    pub fn validate(&self) -> Result<(), ConsensusError> {
        let total = self.weights.total();
        if total != WEIGHT_TOTAL {
            return Err(ConsensusError::Configuration(format!(
                "stage weights sum to {total}, expected {WEIGHT_TOTAL}"
            )));
        }

        if self.memory_size < HASH_SIZE || self.memory_size % HASH_SIZE != 0 {
            return Err(ConsensusError::Configuration(format!(
                "memory size {} must be a non-zero multiple of {HASH_SIZE}",
                self.memory_size
            )));
        }

        if self.memory_iterations == 0
            || self.time_lock_iterations == 0
            || self.crypto_iterations == 0
        {
            return Err(ConsensusError::Configuration(
                "stage iteration counts must be at least 1".to_string(),
            ));
        }

        if self.crypto_key_size == 0 || self.crypto_key_size > MAX_CRYPTO_KEY_SIZE {
            return Err(ConsensusError::Configuration(format!(
                "crypto key size {} outside 1..={MAX_CRYPTO_KEY_SIZE}",
                self.crypto_key_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ProofConfig::default().validate().is_ok());
        assert!(ProofConfig::lightweight().validate().is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_100() {
        let config = ProofConfig {
            weights: StageWeights::new(50, 30, 30),
            ..ProofConfig::lightweight()
        };
        assert!(matches!(
            config.validate(),
            Err(ConsensusError::Configuration(_))
        ));
    }

    #[test]
    fn test_memory_size_must_be_block_aligned() {
        let config = ProofConfig {
            memory_size: 100,
            ..ProofConfig::lightweight()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_key_size_bounds() {
        let mut config = ProofConfig::lightweight();
        config.crypto_key_size = 0;
        assert!(config.validate().is_err());
        config.crypto_key_size = 33;
        assert!(config.validate().is_err());
        config.crypto_key_size = 16;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_weigh_scales_by_percent() {
        let weights = StageWeights::new(50, 25, 25);
        assert_eq!(weights.weigh(100, 200, 400), 50 + 50 + 100);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ProofConfig = serde_json::from_str(r#"{"memory_size": 2048}"#).unwrap();
        assert_eq!(config.memory_size, 2048);
        assert_eq!(config.weights, StageWeights::default());
    }
}
