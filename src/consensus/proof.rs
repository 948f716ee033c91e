//! Proof of work produced by a mining engine
//!
//! A proof carries everything needed to recompute its final hash:
//! the nonce and the three stage outputs. Engines that skip a stage
//! store an empty blob for it.

use super::ConsensusError;
use crate::crypto::{meets_target, sha256_concat};
use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Hash binding a header to a nonce and the three stage outputs
pub fn compute_final_hash(
    header: &[u8],
    nonce: u64,
    stage1: &[u8],
    stage2: &[u8],
    stage3: &[u8],
) -> Vec<u8> {
    sha256_concat(&[header, &nonce.to_be_bytes(), stage1, stage2, stage3])
}

/// An accepted proof of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub nonce: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "hex")]
    pub stage1: Vec<u8>,
    #[serde(with = "hex")]
    pub stage2: Vec<u8>,
    #[serde(with = "hex")]
    pub stage3: Vec<u8>,
    /// Hex-encoded final hash
    pub final_hash: String,
    /// Target the proof was mined against
    #[serde(with = "crate::encoding::biguint_decimal")]
    pub target: BigUint,
    /// Weighted stage time in microseconds, summed over every attempt
    pub energy_used: u64,
}

impl Proof {
    /// Recompute the final hash from the header and the stored stage outputs
    pub fn recompute_hash(&self, header: &[u8]) -> Vec<u8> {
        compute_final_hash(header, self.nonce, &self.stage1, &self.stage2, &self.stage3)
    }

    /// Number of nonces tried before this one was accepted, inclusive
    pub fn attempts(&self) -> u64 {
        self.nonce.saturating_add(1)
    }

    /// Check the stored final hash against the header and a target.
    ///
    /// Stage outputs are taken as stored; nothing here reruns a stage.
    pub fn check(&self, header: &[u8], target: &BigUint) -> Result<(), ConsensusError> {
        let recomputed = self.recompute_hash(header);

        if hex::encode(&recomputed) != self.final_hash {
            return Err(ConsensusError::Validation(format!(
                "final hash mismatch at nonce {}",
                self.nonce
            )));
        }

        if !meets_target(&recomputed, target) {
            return Err(ConsensusError::Validation(format!(
                "hash {} is above the target",
                self.final_hash
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::max_target;

    fn sample(header: &[u8]) -> Proof {
        let (s1, s2, s3) = (vec![1u8; 32], vec![2u8; 32], vec![3u8; 16]);
        let hash = compute_final_hash(header, 7, &s1, &s2, &s3);
        Proof {
            nonce: 7,
            timestamp: Utc::now(),
            stage1: s1,
            stage2: s2,
            stage3: s3,
            final_hash: hex::encode(hash),
            target: max_target(),
            energy_used: 12,
        }
    }

    #[test]
    fn test_check_accepts_consistent_proof() {
        let proof = sample(b"header");
        assert!(proof.check(b"header", &max_target()).is_ok());
        assert_eq!(proof.attempts(), 8);
    }

    #[test]
    fn test_check_rejects_other_header() {
        let proof = sample(b"header");
        assert!(matches!(
            proof.check(b"other", &max_target()),
            Err(ConsensusError::Validation(_))
        ));
    }

    #[test]
    fn test_check_rejects_tampered_stage() {
        let mut proof = sample(b"header");
        proof.stage2[0] ^= 0xFF;
        assert!(proof.check(b"header", &max_target()).is_err());
    }

    #[test]
    fn test_check_rejects_target_miss() {
        let proof = sample(b"header");
        assert!(proof.check(b"header", &BigUint::from(0u8)).is_err());
    }

    #[test]
    fn test_stage_blobs_serialize_as_hex() {
        let proof = sample(b"header");
        let json = serde_json::to_value(&proof).unwrap();
        assert_eq!(json["stage1"], "01".repeat(32));

        let back: Proof = serde_json::from_value(json).unwrap();
        assert_eq!(back, proof);
    }
}
