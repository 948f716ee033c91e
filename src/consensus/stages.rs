//! The three cost stages of a proof attempt
//!
//! 1. Memory: fill and mix a buffer, bound by memory bandwidth.
//! 2. Time-lock: a strictly sequential hash chain with enforced delays.
//! 3. Crypto: repeated authenticated encryption under an ephemeral key.

use super::ConsensusError;
use crate::crypto::{sha256, sha256_concat, HASH_SIZE};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::thread;
use std::time::Duration;

const CIPHER_KEY_SIZE: usize = 32;
const CIPHER_NONCE_SIZE: usize = 12;

/// Memory phase output for one nonce.
///
/// `memory_size` must be a non-zero multiple of [`HASH_SIZE`].
pub fn memory_phase(header: &[u8], nonce: u64, memory_size: usize, iterations: u32) -> Vec<u8> {
    let mut buffer = vec![0u8; memory_size];
    let blocks = memory_size / HASH_SIZE;

    let seed = sha256_concat(&[header, &nonce.to_be_bytes()]);
    buffer[..HASH_SIZE].copy_from_slice(&seed);

    for _ in 0..iterations {
        // Chain each window from its predecessor
        for i in 1..blocks {
            let (filled, rest) = buffer.split_at_mut(i * HASH_SIZE);
            let digest = Sha256::digest(&filled[(i - 1) * HASH_SIZE..]);
            rest[..HASH_SIZE].copy_from_slice(&digest);
        }

        if blocks < 2 {
            continue;
        }

        // XOR each block with its successor, wrapping at the end
        for i in 0..blocks {
            let j = (i + 1) % blocks;
            let mut neighbour = [0u8; HASH_SIZE];
            neighbour.copy_from_slice(&buffer[j * HASH_SIZE..(j + 1) * HASH_SIZE]);

            for (byte, other) in buffer[i * HASH_SIZE..(i + 1) * HASH_SIZE]
                .iter_mut()
                .zip(neighbour)
            {
                *byte ^= other;
            }
        }
    }

    sha256(&buffer)
}

/// Time-lock phase: `iterations` sequential re-hashes, each followed by
/// `duration / iterations` of sleep.
pub fn time_lock_phase(input: &[u8], iterations: u32, duration: Duration) -> Vec<u8> {
    let step = duration / iterations.max(1);
    let mut running = input.to_vec();

    for _ in 0..iterations {
        running = sha256(&running);
        if !step.is_zero() {
            thread::sleep(step);
        }
    }

    running
}

/// Crypto phase: encrypt, truncate to `key_size`, feed forward.
///
/// The key and base nonce are fresh per call, so the output is not
/// reproducible.
pub fn crypto_phase(
    input: &[u8],
    key_size: usize,
    iterations: u32,
) -> Result<Vec<u8>, ConsensusError> {
    let mut key = [0u8; CIPHER_KEY_SIZE];
    let mut base_nonce = [0u8; CIPHER_NONCE_SIZE];
    OsRng.fill_bytes(&mut key);
    OsRng.fill_bytes(&mut base_nonce);

    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let mut running = input.to_vec();

    for round in 0..iterations {
        // Distinct nonce per round under the same key
        let mut nonce = base_nonce;
        for (byte, counter) in nonce[4..].iter_mut().zip(u64::from(round).to_be_bytes()) {
            *byte ^= counter;
        }

        let mut ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), running.as_slice())
            .map_err(|e| ConsensusError::Crypto(format!("round {round}: {e}")))?;
        ciphertext.truncate(key_size);
        running = ciphertext;
    }

    Ok(running)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_memory_phase_is_deterministic() {
        let a = memory_phase(b"header", 3, 1024, 2);
        let b = memory_phase(b"header", 3, 1024, 2);
        assert_eq!(a, b);
        assert_eq!(a.len(), HASH_SIZE);
    }

    #[test]
    fn test_memory_phase_depends_on_nonce_and_iterations() {
        let base = memory_phase(b"header", 0, 1024, 1);
        assert_ne!(base, memory_phase(b"header", 1, 1024, 1));
        assert_ne!(base, memory_phase(b"header", 0, 1024, 2));
    }

    #[test]
    fn test_memory_phase_single_block_skips_mixing() {
        let seed = sha256_concat(&[b"header", &5u64.to_be_bytes()]);
        assert_eq!(memory_phase(b"header", 5, HASH_SIZE, 3), sha256(&seed));
    }

    #[test]
    fn test_time_lock_is_hash_chain() {
        let out = time_lock_phase(b"seed", 3, Duration::ZERO);
        assert_eq!(out, sha256(&sha256(&sha256(b"seed"))));
    }

    #[test]
    fn test_time_lock_enforces_delay() {
        let start = Instant::now();
        time_lock_phase(b"seed", 4, Duration::from_millis(40));
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_crypto_phase_truncates_to_key_size() {
        let out = crypto_phase(&[9u8; 32], 20, 3).unwrap();
        assert_eq!(out.len(), 20);
    }

    #[test]
    fn test_crypto_phase_uses_ephemeral_key() {
        let a = crypto_phase(&[1u8; 32], 32, 2).unwrap();
        let b = crypto_phase(&[1u8; 32], 32, 2).unwrap();
        assert_ne!(a, b);
    }
}
