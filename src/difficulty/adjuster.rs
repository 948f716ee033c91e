//! Difficulty retargeting
//!
//! Difficulty here is a hardness value: larger means harder. Every
//! `adjustment_window` blocks the adjuster compares observed block metrics
//! with their targets, clamps the resulting factor, and scales the current
//! difficulty by it in fixed point.

use super::metrics::{aggregate_window_metrics, BlockMetrics, WindowMetrics};
use super::MetricsError;
use crate::config::ConfigError;
use log::{debug, info};
use num_bigint::BigUint;
use num_traits::One;
use serde::{Deserialize, Serialize};

/// Target block time in seconds
pub const TARGET_BLOCK_TIME: f64 = 10.0;

/// Number of blocks between difficulty adjustments
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;

/// Smallest allowed per-adjustment factor
pub const MIN_ADJUSTMENT_FACTOR: f64 = 0.25;

/// Largest allowed per-adjustment factor
pub const MAX_ADJUSTMENT_FACTOR: f64 = 4.0;

/// Factors are applied as `numerator / FACTOR_SCALE`
pub const FACTOR_SCALE: u64 = 1000;

/// Weights and targets for the multi-factor mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiFactorConfig {
    pub time_weight: f64,
    pub energy_weight: f64,
    pub network_weight: f64,
    /// Expected energy per block
    pub target_energy: f64,
    /// Expected attempts per second
    pub target_hashrate: f64,
    /// Factors within this distance of 1.0 count as 1.0
    pub tolerance: f64,
}

impl Default for MultiFactorConfig {
    fn default() -> Self {
        Self {
            time_weight: 0.5,
            energy_weight: 0.25,
            network_weight: 0.25,
            target_energy: 1_000_000.0,
            target_hashrate: 100.0,
            tolerance: 0.05,
        }
    }
}

/// Difficulty adjustment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyConfig {
    /// Seconds
    pub target_block_time: f64,
    pub adjustment_window: u64,
    pub min_adjustment_factor: f64,
    pub max_adjustment_factor: f64,
    /// Enables multi-factor mode when present
    pub multi_factor: Option<MultiFactorConfig>,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            target_block_time: TARGET_BLOCK_TIME,
            adjustment_window: DIFFICULTY_ADJUSTMENT_INTERVAL,
            min_adjustment_factor: MIN_ADJUSTMENT_FACTOR,
            max_adjustment_factor: MAX_ADJUSTMENT_FACTOR,
            multi_factor: None,
        }
    }
}

impl DifficultyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.adjustment_window == 0 {
            return Err(ConfigError::Invalid(
                "adjustment window must be at least 1".to_string(),
            ));
        }

        if !(self.target_block_time.is_finite() && self.target_block_time > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "target block time must be positive, got {}",
                self.target_block_time
            )));
        }

        let (min, max) = (self.min_adjustment_factor, self.max_adjustment_factor);
        if !(min > 0.0 && min <= 1.0 && max >= 1.0 && max.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "adjustment factors must satisfy 0 < min <= 1 <= max, got [{min}, {max}]"
            )));
        }

        if let Some(multi) = &self.multi_factor {
            let weights = [multi.time_weight, multi.energy_weight, multi.network_weight];
            if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().sum::<f64>() <= 0.0 {
                return Err(ConfigError::Invalid(
                    "multi-factor weights must be non-negative with a positive sum".to_string(),
                ));
            }
            if multi.target_energy <= 0.0 || multi.target_hashrate <= 0.0 || multi.tolerance < 0.0 {
                return Err(ConfigError::Invalid(
                    "multi-factor targets must be positive and tolerance non-negative"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Computes the next difficulty from recent block metrics
#[derive(Debug, Clone)]
pub struct DifficultyAdjuster {
    config: DifficultyConfig,
}

impl DifficultyAdjuster {
    pub fn new(config: DifficultyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DifficultyConfig {
        &self.config
    }

    /// True on every multiple of the adjustment window, including block 0
    pub fn should_adjust_difficulty(&self, block_number: u64) -> bool {
        block_number % self.config.adjustment_window == 0
    }

    pub fn validate_metrics(&self, metrics: &BlockMetrics) -> Result<(), MetricsError> {
        metrics.validate()
    }

    pub fn aggregate_window_metrics(&self, metrics: &[BlockMetrics]) -> WindowMetrics {
        aggregate_window_metrics(metrics)
    }

    /// Factor bounds over [`FACTOR_SCALE`], rounded inwards so an applied
    /// factor never leaves `[min, max]`
    fn scaled_bounds(&self) -> (u64, u64) {
        let scale = FACTOR_SCALE as f64;
        let low = (self.config.min_adjustment_factor * scale).ceil() as u64;
        let high = (self.config.max_adjustment_factor * scale).floor() as u64;
        (low, high)
    }

    /// Clamped adjustment factor as a fixed-point numerator over
    /// [`FACTOR_SCALE`], or `None` when the window gives nothing to go on.
    pub fn scaled_factor(&self, window: &WindowMetrics) -> Option<u64> {
        if window.is_empty() || window.avg_block_time <= 0.0 {
            return None;
        }

        let time_factor = self.config.target_block_time / window.avg_block_time;

        let raw = match &self.config.multi_factor {
            None => time_factor,
            Some(multi) => {
                let energy_factor = ratio(multi.target_energy, window.avg_energy_used);
                // More hashrate than expected calls for more work
                let network_factor = ratio(window.avg_network_hashrate, multi.target_hashrate);

                let parts = [
                    (dead_band(time_factor, multi.tolerance), multi.time_weight),
                    (dead_band(energy_factor, multi.tolerance), multi.energy_weight),
                    (dead_band(network_factor, multi.tolerance), multi.network_weight),
                ];
                let weight_sum: f64 = parts.iter().map(|(_, w)| w).sum();
                parts.iter().map(|(f, w)| f * w).sum::<f64>() / weight_sum
            }
        };

        if !raw.is_finite() {
            return None;
        }

        let scale = FACTOR_SCALE as f64;
        let (low, high) = self.scaled_bounds();
        let scaled = (raw.clamp(
            self.config.min_adjustment_factor,
            self.config.max_adjustment_factor,
        ) * scale)
            .round() as u64;

        Some(scaled.clamp(low, high))
    }

    /// Next difficulty for the given window; unchanged when the window is empty
    pub fn calculate_new_difficulty(&self, current: &BigUint, window: &WindowMetrics) -> BigUint {
        let Some(scaled) = self.scaled_factor(window) else {
            debug!("Empty or unusable metrics window, difficulty unchanged");
            return current.clone();
        };

        // Flooring a small difficulty can overshoot the bounds, so the result
        // is kept within [ceil(D * low), floor(D * high)]. D itself always
        // lies in that range since min <= 1 <= max.
        let scale = BigUint::from(FACTOR_SCALE);
        let (low, high) = self.scaled_bounds();
        let floor_bound = (current * BigUint::from(low) + &scale - BigUint::one()) / &scale;
        let ceil_bound = current * BigUint::from(high) / &scale;

        let next = current * BigUint::from(scaled) / &scale;
        let next = next.clamp(floor_bound, ceil_bound).max(BigUint::one());

        info!(
            "Difficulty adjusted from {} to {} (factor {}/{}, avg block time {:.3}s over {} blocks)",
            current, next, scaled, FACTOR_SCALE, window.avg_block_time, window.block_count
        );

        next
    }

    /// Validate the trailing window of `history` and compute the next
    /// difficulty from it. Any invalid metric rejects the whole window.
    pub fn adjust_from_history(
        &self,
        current: &BigUint,
        history: &[BlockMetrics],
    ) -> Result<BigUint, MetricsError> {
        let window_size = usize::try_from(self.config.adjustment_window).unwrap_or(usize::MAX);
        let window = &history[history.len().saturating_sub(window_size)..];

        for metrics in window {
            self.validate_metrics(metrics)?;
        }

        let aggregated = self.aggregate_window_metrics(window);
        Ok(self.calculate_new_difficulty(current, &aggregated))
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        1.0
    }
}

fn dead_band(factor: f64, tolerance: f64) -> f64 {
    if (factor - 1.0).abs() <= tolerance {
        1.0
    } else {
        factor
    }
}
