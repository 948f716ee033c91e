//! Cryptographic utilities for the chain
//!
//! This module provides:
//! - SHA-256 hashing
//! - Hash-as-integer comparison against difficulty targets
//! - Merkle roots over transaction digests

pub mod hash;
pub mod merkle;

pub use hash::{
    hash_to_biguint, max_target, meets_target, sha256, sha256_concat, sha256_hex,
    target_for_leading_zeros, HASH_SIZE,
};
pub use merkle::{calculate_merkle_root, calculate_merkle_root_hex};
