//! Plain hash search
//!
//! Increments the nonce until `SHA-256(header || nonce)` falls at or below
//! the target. No stages run, so the proof's stage blobs are empty and
//! the same final-hash check applies.

use super::proof::{compute_final_hash, Proof};
use super::{ConsensusError, ProofOfWork};
use crate::crypto::meets_target;
use chrono::Utc;
use log::info;
use num_bigint::BigUint;
use std::time::{Duration, Instant};

/// Single-hash proof engine
#[derive(Debug, Clone)]
pub struct LeadingZeroEngine {
    max_mining_time: Duration,
}

impl LeadingZeroEngine {
    pub fn new(max_mining_time: Duration) -> Self {
        Self { max_mining_time }
    }
}

impl ProofOfWork for LeadingZeroEngine {
    fn name(&self) -> &'static str {
        "leading-zero"
    }

    fn mine(&self, header: &[u8], target: &BigUint) -> Result<Proof, ConsensusError> {
        let start = Instant::now();

        for nonce in 0..=u64::MAX {
            let hash = compute_final_hash(header, nonce, &[], &[], &[]);

            if meets_target(&hash, target) {
                let elapsed = start.elapsed();
                info!(
                    "Hash found at nonce {} after {}ms",
                    nonce,
                    elapsed.as_millis()
                );
                return Ok(Proof {
                    nonce,
                    timestamp: Utc::now(),
                    stage1: Vec::new(),
                    stage2: Vec::new(),
                    stage3: Vec::new(),
                    final_hash: hex::encode(&hash),
                    target: target.clone(),
                    // Wall time is the only cost signal for a plain search
                    energy_used: u64::try_from(elapsed.as_micros())
                        .unwrap_or(u64::MAX)
                        .max(1),
                });
            }

            let elapsed = start.elapsed();
            if elapsed > self.max_mining_time {
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

    fn validate(
        &self,
        proof: &Proof,
        header: &[u8],
        target: &BigUint,
    ) -> Result<(), ConsensusError> {
        if !(proof.stage1.is_empty() && proof.stage2.is_empty() && proof.stage3.is_empty()) {
            return Err(ConsensusError::Validation(
                "plain hash proofs carry no stage outputs".to_string(),
            ));
        }
        proof.check(header, target)
    }
}
