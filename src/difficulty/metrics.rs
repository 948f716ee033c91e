//! Per-block metrics and their window averages

use super::MetricsError;
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// Measurements recorded for one historical block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockMetrics {
    /// Seconds since the previous block
    pub block_time: f64,
    /// Energy proxy reported by the proof engine
    pub energy_used: f64,
    /// Estimated nonce attempts per second
    pub network_hashrate: f64,
    /// Difficulty the block was mined at
    #[serde(with = "crate::encoding::biguint_decimal")]
    pub difficulty: BigUint,
}

impl BlockMetrics {
    /// Reject non-positive or non-finite measurements
    pub fn validate(&self) -> Result<(), MetricsError> {
        check_positive("block_time", self.block_time)?;
        check_positive("energy_used", self.energy_used)?;
        check_positive("network_hashrate", self.network_hashrate)?;

        if self.difficulty.is_zero() {
            return Err(MetricsError::NonPositive {
                field: "difficulty",
                value: "0".to_string(),
            });
        }

        Ok(())
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), MetricsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(MetricsError::NonPositive {
            field,
            value: value.to_string(),
        })
    }
}

/// Arithmetic means over a window of blocks
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WindowMetrics {
    pub avg_block_time: f64,
    pub avg_energy_used: f64,
    pub avg_network_hashrate: f64,
    pub avg_difficulty: BigUint,
    /// Zero means the window was empty and every average is zero
    pub block_count: usize,
}

impl WindowMetrics {
    pub fn is_empty(&self) -> bool {
        self.block_count == 0
    }
}

/// Average each field. An empty slice yields the zero-valued window.
pub fn aggregate_window_metrics(metrics: &[BlockMetrics]) -> WindowMetrics {
    if metrics.is_empty() {
        return WindowMetrics::default();
    }

    let count = metrics.len();
    let n = count as f64;

    let total_difficulty: BigUint = metrics.iter().map(|m| &m.difficulty).sum();

    WindowMetrics {
        avg_block_time: metrics.iter().map(|m| m.block_time).sum::<f64>() / n,
        avg_energy_used: metrics.iter().map(|m| m.energy_used).sum::<f64>() / n,
        avg_network_hashrate: metrics.iter().map(|m| m.network_hashrate).sum::<f64>() / n,
        avg_difficulty: total_difficulty / BigUint::from(count),
        block_count: count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metric(block_time: f64, energy: f64, hashrate: f64, difficulty: u64) -> BlockMetrics {
        BlockMetrics {
            block_time,
            energy_used: energy,
            network_hashrate: hashrate,
            difficulty: BigUint::from(difficulty),
        }
    }

    #[test]
    fn test_empty_window_is_zero() {
        let window = aggregate_window_metrics(&[]);
        assert!(window.is_empty());
        assert_eq!(window.avg_block_time, 0.0);
        assert_eq!(window.avg_energy_used, 0.0);
        assert_eq!(window.avg_network_hashrate, 0.0);
        assert!(window.avg_difficulty.is_zero());
    }

    #[test]
    fn test_means() {
        let window = aggregate_window_metrics(&[
            metric(10.0, 100.0, 5.0, 10),
            metric(20.0, 300.0, 15.0, 30),
        ]);
        assert_eq!(window.block_count, 2);
        assert_eq!(window.avg_block_time, 15.0);
        assert_eq!(window.avg_energy_used, 200.0);
        assert_eq!(window.avg_network_hashrate, 10.0);
        assert_eq!(window.avg_difficulty, BigUint::from(20u32));
    }

    #[test]
    fn test_zero_energy_rejected() {
        let err = metric(10.0, 0.0, 5.0, 1).validate().unwrap_err();
        assert!(matches!(
            err,
            MetricsError::NonPositive {
                field: "energy_used",
                ..
            }
        ));
    }

    #[test]
    fn test_other_non_positive_fields_rejected() {
        assert!(metric(-1.0, 1.0, 1.0, 1).validate().is_err());
        assert!(metric(1.0, 1.0, 0.0, 1).validate().is_err());
        assert!(metric(1.0, 1.0, 1.0, 0).validate().is_err());
        assert!(metric(f64::NAN, 1.0, 1.0, 1).validate().is_err());
        assert!(metric(1.0, 1.0, 1.0, 1).validate().is_ok());
    }
}
