//! Hashing utilities for the chain
//!
//! SHA-256 is used everywhere: block hashes, stage outputs, transaction
//! digests. Hashes are compared against difficulty targets by reading them
//! as big-endian unsigned integers.

use num_bigint::BigUint;
use num_traits::One;
use sha2::{Digest, Sha256};

/// Size of a SHA-256 digest in bytes
pub const HASH_SIZE: usize = 32;

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Computes SHA-256 over several parts as if they were concatenated
pub fn sha256_concat(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

/// Interpret a hash as an unsigned big-endian integer
pub fn hash_to_biguint(hash: &[u8]) -> BigUint {
    BigUint::from_bytes_be(hash)
}

/// The easiest possible target, `2^256 - 1`
pub fn max_target() -> BigUint {
    (BigUint::one() << (HASH_SIZE * 8)) - BigUint::one()
}

/// Checks if a hash, read as an integer, is at or below the target
pub fn meets_target(hash: &[u8], target: &BigUint) -> bool {
    hash_to_biguint(hash) <= *target
}

/// Target that requires `bits` leading zero bits in the hash
pub fn target_for_leading_zeros(bits: u32) -> BigUint {
    let bits = bits.min((HASH_SIZE * 8) as u32) as usize;
    max_target() >> bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let data = b"hello world";
        let hash = sha256(data);
        assert_eq!(hash.len(), HASH_SIZE);
        assert_eq!(
            sha256_hex(data),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_sha256_concat_matches_joined_input() {
        assert_eq!(sha256_concat(&[b"hello ", b"world"]), sha256(b"hello world"));
    }

    #[test]
    fn test_max_target_accepts_everything() {
        let target = max_target();
        assert_eq!(target.bits(), 256);
        assert!(meets_target(&[0xFF; 32], &target));
    }

    #[test]
    fn test_leading_zero_target() {
        let target = target_for_leading_zeros(16);

        let mut hash = vec![0x00, 0x00, 0x0F];
        hash.extend_from_slice(&[0xFF; 29]);
        assert!(meets_target(&hash, &target));

        let mut hash = vec![0x00, 0x01];
        hash.extend_from_slice(&[0x00; 30]);
        assert!(!meets_target(&hash, &target));
    }
}
