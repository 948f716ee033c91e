//! Proof-of-work consensus
//!
//! Mining strategies implement [`ProofOfWork`] so the ledger can run any of
//! them. Two are provided:
//! - [`ProofEngine`]: memory, time-lock and crypto stages per nonce
//! - [`LeadingZeroEngine`]: a single hash per nonce

pub mod config;
pub mod engine;
pub mod proof;
pub mod simple;
pub mod stages;

pub use config::{ProofConfig, StageWeights, WEIGHT_TOTAL};
pub use engine::ProofEngine;
pub use proof::{compute_final_hash, Proof};
pub use simple::LeadingZeroEngine;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Consensus errors, typed by how the caller should react
#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Invalid proof configuration: {0}")]
    Configuration(String),
    #[error("Mining timed out after {attempts} attempts ({}ms)", .elapsed.as_millis())]
    Timeout { attempts: u64, elapsed: Duration },
    #[error("Proof validation failed: {0}")]
    Validation(String),
    #[error("Cipher failure: {0}")]
    Crypto(String),
}

impl ConsensusError {
    /// Whether retrying the same work may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConsensusError::Timeout { .. })
    }
}

/// A mining strategy
pub trait ProofOfWork: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Find a proof for `header` whose final hash is at or below `target`
    fn mine(&self, header: &[u8], target: &BigUint) -> Result<Proof, ConsensusError>;

    /// Check a proof against the header and target it claims to satisfy
    fn validate(&self, proof: &Proof, header: &[u8], target: &BigUint)
        -> Result<(), ConsensusError>;
}

/// Which mining strategy to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    #[default]
    MultiPhase,
    LeadingZero,
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "multi-phase" => Ok(EngineKind::MultiPhase),
            "leading-zero" => Ok(EngineKind::LeadingZero),
            other => Err(format!("unknown engine: {other}")),
        }
    }
}

/// Build the configured mining strategy
pub fn build_engine(kind: EngineKind, config: &ProofConfig) -> Box<dyn ProofOfWork> {
    match kind {
        EngineKind::MultiPhase => Box::new(ProofEngine::new(config.clone())),
        EngineKind::LeadingZero => Box::new(LeadingZeroEngine::new(config.max_mining_time())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::max_target;

    #[test]
    fn test_build_engine_selects_strategy() {
        let config = ProofConfig::lightweight();
        assert_eq!(build_engine(EngineKind::MultiPhase, &config).name(), "multi-phase");
        assert_eq!(build_engine(EngineKind::LeadingZero, &config).name(), "leading-zero");
    }

    #[test]
    fn test_engines_agree_on_interface() {
        let config = ProofConfig::lightweight();
        for kind in [EngineKind::MultiPhase, EngineKind::LeadingZero] {
            let engine = build_engine(kind, &config);
            let proof = engine.mine(b"header", &max_target()).unwrap();
            assert!(engine.validate(&proof, b"header", &max_target()).is_ok());
        }
    }

    #[test]
    fn test_engine_kind_parsing() {
        assert_eq!("leading-zero".parse::<EngineKind>(), Ok(EngineKind::LeadingZero));
        assert!("sha3".parse::<EngineKind>().is_err());
    }

    #[test]
    fn test_only_timeouts_are_retryable() {
        let timeout = ConsensusError::Timeout {
            attempts: 1,
            elapsed: Duration::from_millis(5),
        };
        assert!(timeout.is_retryable());
        assert!(!ConsensusError::Validation("x".into()).is_retryable());
        assert!(!ConsensusError::Configuration("x".into()).is_retryable());
    }
}
