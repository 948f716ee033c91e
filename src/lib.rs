//! phase-chain: a proof-of-work chain engine in Rust
//!
//! This crate provides:
//! - A three-stage proof of work (memory-hard, time-lock and cipher stages)
//!   alongside a plain leading-zero search, behind one [`ProofOfWork`] trait
//! - Windowed difficulty retargeting, by block time alone or by a weighted
//!   mix of block time, energy and hashrate
//! - A ledger with a bounded pending queue and a dedicated mining thread
//! - Durable one-file-per-block JSON persistence
//!
//! # Example
//!
//! ```rust
//! use phase_chain::consensus::{ProofConfig, ProofEngine};
//! use phase_chain::core::{Ledger, LedgerConfig, Transaction};
//! use phase_chain::difficulty::{DifficultyAdjuster, DifficultyConfig};
//! use phase_chain::storage::MemoryBlockStore;
//!
//! let ledger = Ledger::open(
//!     LedgerConfig::default(),
//!     Box::new(ProofEngine::new(ProofConfig::lightweight())),
//!     DifficultyAdjuster::new(DifficultyConfig::default()).unwrap(),
//!     Box::new(MemoryBlockStore::new()),
//! )
//! .unwrap();
//!
//! // Queue a transaction and mine it
//! ledger.submit(Transaction::message("alice", "hello")).unwrap();
//! ledger.run_one_cycle().unwrap();
//!
//! assert_eq!(ledger.height(), 1);
//! println!("Genesis hash: {}", ledger.block(0).unwrap().hash);
//! ```

pub mod cli;
pub mod config;
pub mod consensus;
pub mod core;
pub mod crypto;
pub mod difficulty;
pub mod encoding;
pub mod storage;

// Re-export commonly used types
pub use config::{ConfigError, NodeConfig};
pub use consensus::{
    build_engine, ConsensusError, EngineKind, LeadingZeroEngine, Proof, ProofConfig, ProofEngine,
    ProofOfWork,
};
pub use core::{Block, Ledger, LedgerConfig, LedgerError, Transaction};
pub use difficulty::{BlockMetrics, DifficultyAdjuster, DifficultyConfig, WindowMetrics};
pub use storage::{BlockStore, FileBlockStore, MemoryBlockStore, StorageConfig};
