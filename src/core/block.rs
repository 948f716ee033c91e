//! Block implementation for the chain
//!
//! A block is built from a [`BlockCandidate`] once a proof of work has been
//! found for the candidate's header bytes. The block hash is the proof's
//! final hash, so it can always be recomputed from the header fields, the
//! nonce and the stored stage outputs.

use crate::consensus::Proof;
use crate::core::transaction::Transaction;
use crate::crypto::calculate_merkle_root_hex;
use crate::difficulty::{difficulty_to_target, BlockMetrics};
use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Previous-hash value of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Serialize the fields a proof commits to.
///
/// The timestamp is encoded in milliseconds; candidates truncate their
/// timestamps to match so a reloaded block hashes identically.
fn encode_header(
    index: u64,
    timestamp: &DateTime<Utc>,
    previous_hash: &str,
    merkle_root: &str,
    difficulty: &BigUint,
) -> Vec<u8> {
    format!(
        "{}|{}|{}|{}|{}",
        index,
        timestamp.timestamp_millis(),
        previous_hash,
        merkle_root,
        difficulty
    )
    .into_bytes()
}

fn merkle_root(transactions: &[Transaction]) -> String {
    let hashes: Vec<Vec<u8>> = transactions.iter().map(Transaction::hash).collect();
    calculate_merkle_root_hex(&hashes)
}

/// An unmined block
#[derive(Debug, Clone)]
pub struct BlockCandidate {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub difficulty: BigUint,
}

impl BlockCandidate {
    pub fn new(
        index: u64,
        timestamp: DateTime<Utc>,
        transactions: Vec<Transaction>,
        previous_hash: String,
        difficulty: BigUint,
    ) -> Self {
        let millis = timestamp.timestamp_millis();
        let timestamp = DateTime::from_timestamp_millis(millis).unwrap_or(timestamp);

        Self {
            index,
            timestamp,
            transactions,
            previous_hash,
            difficulty,
        }
    }

    pub fn header_bytes(&self) -> Vec<u8> {
        encode_header(
            self.index,
            &self.timestamp,
            &self.previous_hash,
            &merkle_root(&self.transactions),
            &self.difficulty,
        )
    }

    /// Target ceiling the proof must meet
    pub fn target(&self) -> BigUint {
        difficulty_to_target(&self.difficulty)
    }

    /// Attach a proof and produce the final block
    pub fn seal(self, proof: Proof) -> Block {
        Block {
            index: self.index,
            timestamp: self.timestamp,
            transactions: self.transactions,
            nonce: proof.nonce,
            hash: proof.final_hash.clone(),
            previous_hash: self.previous_hash,
            difficulty: self.difficulty,
            proof,
        }
    }
}

/// A block in the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block index/height
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
    pub nonce: u64,
    pub hash: String,
    pub previous_hash: String,
    /// Difficulty the block was mined at
    #[serde(with = "crate::encoding::biguint_decimal")]
    pub difficulty: BigUint,
    /// Proof of work, kept so the hash can be recomputed
    pub proof: Proof,
}

impl Block {
    pub fn header_bytes(&self) -> Vec<u8> {
        encode_header(
            self.index,
            &self.timestamp,
            &self.previous_hash,
            &self.merkle_root(),
            &self.difficulty,
        )
    }

    pub fn merkle_root(&self) -> String {
        merkle_root(&self.transactions)
    }

    pub fn target(&self) -> BigUint {
        difficulty_to_target(&self.difficulty)
    }

    /// Hash recomputed from header fields, nonce and stage outputs
    pub fn recompute_hash(&self) -> String {
        hex::encode(crate::consensus::compute_final_hash(
            &self.header_bytes(),
            self.nonce,
            &self.proof.stage1,
            &self.proof.stage2,
            &self.proof.stage3,
        ))
    }

    /// Verify the stored hash and its agreement with the proof
    pub fn verify_hash(&self) -> bool {
        self.nonce == self.proof.nonce
            && self.hash == self.proof.final_hash
            && self.hash == self.recompute_hash()
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// Get number of transactions in this block
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Metrics for this block relative to its predecessor
    pub fn metrics_since(&self, previous: &Block) -> BlockMetrics {
        let millis = self
            .timestamp
            .signed_duration_since(previous.timestamp)
            .num_milliseconds();
        let block_time = millis as f64 / 1000.0;

        let network_hashrate = if block_time > 0.0 {
            self.proof.attempts() as f64 / block_time
        } else {
            0.0
        };

        BlockMetrics {
            block_time,
            energy_used: self.proof.energy_used as f64,
            network_hashrate,
            difficulty: self.difficulty.clone(),
        }
    }
}
