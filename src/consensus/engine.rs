//! Three-stage proof-of-work engine
//!
//! Every nonce attempt runs the memory, time-lock and crypto stages in
//! sequence, then hashes the header, nonce and all three stage outputs.
//! The attempt is accepted when that hash, read as an integer, is at or
//! below the target.

use super::config::ProofConfig;
use super::proof::{compute_final_hash, Proof};
use super::stages::{crypto_phase, memory_phase, time_lock_phase};
use super::{ConsensusError, ProofOfWork};
use crate::crypto::meets_target;
use chrono::Utc;
use log::{debug, info};
use num_bigint::BigUint;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Result of a single nonce attempt
struct Attempt {
    stage1: Vec<u8>,
    stage2: Vec<u8>,
    stage3: Vec<u8>,
    final_hash: Vec<u8>,
    energy: u64,
}

/// Multi-phase proof engine
#[derive(Debug)]
pub struct ProofEngine {
    config: ProofConfig,
    stage_runs: AtomicU64,
}

impl ProofEngine {
    pub fn new(config: ProofConfig) -> Self {
        Self {
            config,
            stage_runs: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ProofConfig {
        &self.config
    }

    /// Total number of stage executions performed by this engine
    pub fn stage_runs(&self) -> u64 {
        self.stage_runs.load(Ordering::Relaxed)
    }

    /// Search nonces from zero until the final hash meets `target`
    pub fn mine(&self, header: &[u8], target: &BigUint) -> Result<Proof, ConsensusError> {
        self.config.validate()?;

        let ceiling = self.config.max_mining_time();
        let start = Instant::now();
        let mut energy_used = 0u64;

        for nonce in 0..=u64::MAX {
            let attempt = self.attempt(header, nonce)?;
            energy_used = energy_used.saturating_add(attempt.energy);

            if meets_target(&attempt.final_hash, target) {
                info!(
                    "Proof found at nonce {} after {}ms (energy {})",
                    nonce,
                    start.elapsed().as_millis(),
                    energy_used
                );
                return Ok(Proof {
                    nonce,
                    timestamp: Utc::now(),
                    stage1: attempt.stage1,
                    stage2: attempt.stage2,
                    stage3: attempt.stage3,
                    final_hash: hex::encode(&attempt.final_hash),
                    target: target.clone(),
                    energy_used,
                });
            }

            let elapsed = start.elapsed();
            if elapsed > ceiling {
                return Err(ConsensusError::Timeout {
                    attempts: nonce + 1,
                    elapsed,
                });
            }
        }

        Err(ConsensusError::Timeout {
            attempts: u64::MAX,
            elapsed: start.elapsed(),
        })
    }

    /// Recompute the final hash from the stored stage outputs and check it
    /// against `target`.
    pub fn validate_proof(
        &self,
        proof: &Proof,
        header: &[u8],
        target: &BigUint,
    ) -> Result<(), ConsensusError> {
        proof.check(header, target)
    }

    /// Rerun the deterministic stages (memory and time-lock) for the proof's
    /// nonce and compare them with the stored outputs.
    ///
    /// The crypto stage uses an ephemeral key and cannot be replayed.
    /// The time-lock delay is skipped; only the hash chain is recomputed.
    pub fn verify_deterministic_stages(
        &self,
        proof: &Proof,
        header: &[u8],
    ) -> Result<(), ConsensusError> {
        self.config.validate()?;

        let stage1 = memory_phase(
            header,
            proof.nonce,
            self.config.memory_size,
            self.config.memory_iterations,
        );
        if stage1 != proof.stage1 {
            return Err(ConsensusError::Validation(
                "memory stage output does not match".to_string(),
            ));
        }

        let stage2 = time_lock_phase(
            &stage1,
            self.config.time_lock_iterations,
            std::time::Duration::ZERO,
        );
        if stage2 != proof.stage2 {
            return Err(ConsensusError::Validation(
                "time-lock stage output does not match".to_string(),
            ));
        }

        Ok(())
    }

    fn attempt(&self, header: &[u8], nonce: u64) -> Result<Attempt, ConsensusError> {
        let config = &self.config;

        let started = Instant::now();
        let stage1 = memory_phase(header, nonce, config.memory_size, config.memory_iterations);
        self.stage_runs.fetch_add(1, Ordering::Relaxed);
        let memory_us = started.elapsed().as_micros();

        let started = Instant::now();
        let stage2 = time_lock_phase(
            &stage1,
            config.time_lock_iterations,
            config.time_lock_duration(),
        );
        self.stage_runs.fetch_add(1, Ordering::Relaxed);
        let time_lock_us = started.elapsed().as_micros();

        let started = Instant::now();
        let stage3 = crypto_phase(&stage2, config.crypto_key_size, config.crypto_iterations)?;
        self.stage_runs.fetch_add(1, Ordering::Relaxed);
        let crypto_us = started.elapsed().as_micros();

        let final_hash = compute_final_hash(header, nonce, &stage1, &stage2, &stage3);
        let energy = config.weights.weigh(
            saturate(memory_us),
            saturate(time_lock_us),
            saturate(crypto_us),
        );

        debug!(
            "nonce {}: memory {}us, time-lock {}us, crypto {}us",
            nonce, memory_us, time_lock_us, crypto_us
        );

        Ok(Attempt {
            stage1,
            stage2,
            stage3,
            final_hash,
            energy,
        })
    }
}

fn saturate(micros: u128) -> u64 {
    u64::try_from(micros).unwrap_or(u64::MAX)
}

impl ProofOfWork for ProofEngine {
    fn name(&self) -> &'static str {
        "multi-phase"
    }

    fn mine(&self, header: &[u8], target: &BigUint) -> Result<Proof, ConsensusError> {
        ProofEngine::mine(self, header, target)
    }

    fn validate(
        &self,
        proof: &Proof,
        header: &[u8],
        target: &BigUint,
    ) -> Result<(), ConsensusError> {
        self.validate_proof(proof, header, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::config::StageWeights;
    use crate::crypto::{hash_to_biguint, max_target, target_for_leading_zeros};

    fn engine() -> ProofEngine {
        ProofEngine::new(ProofConfig::lightweight())
    }

    #[test]
    fn test_mine_at_max_target_validates() {
        let engine = engine();
        let proof = engine.mine(b"block header", &max_target()).unwrap();

        assert_eq!(proof.nonce, 0);
        assert_eq!(proof.stage1.len(), 32);
        assert_eq!(proof.stage2.len(), 32);
        assert_eq!(proof.stage3.len(), engine.config().crypto_key_size);
        assert!(engine
            .validate_proof(&proof, b"block header", &max_target())
            .is_ok());
    }

    #[test]
    fn test_final_hash_is_recomputable_and_under_target() {
        let engine = engine();
        let target = target_for_leading_zeros(2);
        let proof = engine.mine(b"header", &target).unwrap();

        let recomputed = compute_final_hash(
            b"header",
            proof.nonce,
            &proof.stage1,
            &proof.stage2,
            &proof.stage3,
        );
        assert_eq!(hex::encode(&recomputed), proof.final_hash);
        assert!(hash_to_biguint(&recomputed) <= target);
        assert_eq!(proof.target, target);
    }

    #[test]
    fn test_bad_weights_fail_before_any_stage() {
        let engine = ProofEngine::new(ProofConfig {
            weights: StageWeights::new(10, 10, 10),
            ..ProofConfig::lightweight()
        });

        let result = engine.mine(b"header", &max_target());
        assert!(matches!(result, Err(ConsensusError::Configuration(_))));
        assert_eq!(engine.stage_runs(), 0);
    }

    #[test]
    fn test_every_attempt_runs_three_stages() {
        let engine = engine();
        let proof = engine.mine(b"header", &max_target()).unwrap();
        assert_eq!(engine.stage_runs(), proof.attempts() * 3);
    }

    #[test]
    fn test_unreachable_target_times_out() {
        let engine = ProofEngine::new(ProofConfig {
            max_mining_time_ms: 20,
            ..ProofConfig::lightweight()
        });

        let result = engine.mine(b"header", &BigUint::from(0u8));
        match result {
            Err(err @ ConsensusError::Timeout { .. }) => assert!(err.is_retryable()),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_wrong_header() {
        let engine = engine();
        let proof = engine.mine(b"header", &max_target()).unwrap();
        assert!(engine
            .validate_proof(&proof, b"another header", &max_target())
            .is_err());
    }

    #[test]
    fn test_deterministic_stages_replay() {
        let engine = engine();
        let proof = engine.mine(b"header", &max_target()).unwrap();
        assert!(engine.verify_deterministic_stages(&proof, b"header").is_ok());

        // A forged stage blob can still satisfy the hash check on its own
        let mut forged = proof.clone();
        forged.stage1 = vec![0u8; 32];
        forged.final_hash = hex::encode(forged.recompute_hash(b"header"));
        assert!(engine
            .validate_proof(&forged, b"header", &max_target())
            .is_ok());
        assert!(engine
            .verify_deterministic_stages(&forged, b"header")
            .is_err());
    }

    #[test]
    fn test_weight_splits_mine_and_validate() {
        let target = target_for_leading_zeros(1);
        let baseline = engine().mine(b"header", &max_target()).unwrap();

        for (memory, time_lock, crypto) in [
            (100, 0, 0),
            (0, 100, 0),
            (0, 0, 100),
            (34, 33, 33),
            (40, 30, 30),
        ] {
            let engine = ProofEngine::new(ProofConfig {
                weights: StageWeights::new(memory, time_lock, crypto),
                ..ProofConfig::lightweight()
            });

            let proof = engine.mine(b"header", &target).unwrap();
            assert!(engine.validate_proof(&proof, b"header", &target).is_ok());

            // Weights only change the energy figure, never the stage outputs
            let first = engine.mine(b"header", &max_target()).unwrap();
            assert_eq!(first.stage1, baseline.stage1);
            assert_eq!(first.stage2, baseline.stage2);
        }
    }

    #[test]
    fn test_time_lock_only_weighting_reports_its_wall_time() {
        let engine = ProofEngine::new(ProofConfig {
            weights: StageWeights::new(0, 100, 0),
            time_lock_duration_ms: 2,
            ..ProofConfig::lightweight()
        });
        let proof = engine.mine(b"header", &max_target()).unwrap();
        assert_eq!(proof.nonce, 0);
        assert!(proof.energy_used >= 1_000);
    }

    #[test]
    fn test_energy_is_recorded() {
        let engine = ProofEngine::new(ProofConfig {
            time_lock_duration_ms: 2,
            ..ProofConfig::lightweight()
        });
        let proof = engine.mine(b"header", &max_target()).unwrap();
        assert!(proof.energy_used > 0);
    }
}
