//! Core chain components
//!
//! This module contains the fundamental building blocks:
//! - Transactions and the account state they update
//! - Blocks (candidates, sealed blocks and their metrics)
//! - The ledger (chain, pending queue and mining cycle)
//! - A pluggable clock for block timestamps

pub mod block;
pub mod clock;
pub mod ledger;
pub mod state;
pub mod transaction;

pub use block::{Block, BlockCandidate, GENESIS_PREVIOUS_HASH};
pub use clock::{Clock, ManualClock, SystemClock};
pub use ledger::{
    CycleOutcome, Ledger, LedgerConfig, LedgerError, LedgerSnapshot, MinerHandle, BLOCK_REWARD,
    DEFAULT_MAX_PENDING, MAX_BLOCK_TXS,
};
pub use state::ChainState;
pub use transaction::{Transaction, TransactionError, MAX_PAYLOAD_SIZE};
