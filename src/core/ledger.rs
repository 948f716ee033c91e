//! The ledger: chain, pending queue and the mining cycle
//!
//! Chain, queue, difficulty and metrics history live behind one mutex.
//! A second mutex serializes mining cycles so only one candidate block is
//! ever in flight. The state lock is released while the proof engine runs;
//! transactions submitted meanwhile queue up behind the candidate's
//! snapshot and go into the next block.

use crate::config::ConfigError;
use crate::consensus::{ConsensusError, ProofOfWork};
use crate::core::block::{Block, BlockCandidate, GENESIS_PREVIOUS_HASH};
use crate::core::clock::{Clock, SystemClock};
use crate::core::state::ChainState;
use crate::core::transaction::{Transaction, TransactionError};
use crate::difficulty::{BlockMetrics, DifficultyAdjuster};
use crate::storage::{BlockStore, StorageError};
use log::{debug, error, info, warn};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Configuration
// =============================================================================

/// Block reward in coins
pub const BLOCK_REWARD: u64 = 50;

/// Default maximum number of queued transactions
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Maximum number of queued transactions taken into one block
pub const MAX_BLOCK_TXS: usize = 10_000;

/// Ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Transaction rejected: {0}")]
    InvalidTransaction(#[from] TransactionError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid chain: {0}")]
    InvalidChain(String),
    #[error("Pending queue full ({0} transactions)")]
    QueueFull(usize),
}

impl LedgerError {
    /// Timeouts and I/O failures may succeed on the next cycle
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Consensus(e) => e.is_retryable(),
            LedgerError::Storage(StorageError::IoError(_)) => true,
            _ => false,
        }
    }
}

/// Ledger settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Difficulty used until the first retarget
    #[serde(with = "crate::encoding::biguint_decimal")]
    pub initial_difficulty: BigUint,
    pub max_pending: usize,
    pub max_block_transactions: usize,
    /// When set, each block starts with a reward to this address
    pub miner_address: Option<String>,
    pub block_reward: u64,
    /// Minimum pause between committed blocks in the mining thread
    pub min_block_interval_ms: u64,
    /// Upper bound on how long the idle miner sleeps between checks
    pub idle_poll_ms: u64,
    /// Consecutive retryable failures logged quietly before warning
    pub max_silent_retries: u32,
    /// Accept stored blocks whose difficulty differs from the replayed one.
    /// Needed once after changing the initial difficulty or retarget window.
    pub allow_difficulty_override: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            initial_difficulty: BigUint::one(),
            max_pending: DEFAULT_MAX_PENDING,
            max_block_transactions: MAX_BLOCK_TXS,
            miner_address: None,
            block_reward: BLOCK_REWARD,
            min_block_interval_ms: 0,
            idle_poll_ms: 1000,
            max_silent_retries: 3,
            allow_difficulty_override: false,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_difficulty.is_zero() {
            return Err(ConfigError::Invalid(
                "initial difficulty must be at least 1".to_string(),
            ));
        }
        if self.max_pending == 0 || self.max_block_transactions == 0 {
            return Err(ConfigError::Invalid(
                "queue and block capacities must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// State
// =============================================================================

/// Read-only view for status reporting
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    pub height: usize,
    pub pending: usize,
    pub difficulty: BigUint,
    pub latest_block: Option<Block>,
}

/// What a mining cycle did
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Nothing was queued
    Idle,
    Committed(Block),
}

struct LedgerState {
    chain: Vec<Block>,
    queue: VecDeque<Transaction>,
    difficulty: BigUint,
    metrics: Vec<BlockMetrics>,
    /// State after every committed block
    committed: ChainState,
    /// Committed state with the queue applied on top
    pending: ChainState,
    consecutive_failures: u32,
}

/// Chain plus pending transactions
pub struct Ledger {
    state: Mutex<LedgerState>,
    changed: Condvar,
    cycle: Mutex<()>,
    shutdown: AtomicBool,
    engine: Box<dyn ProofOfWork>,
    adjuster: DifficultyAdjuster,
    store: Box<dyn BlockStore>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl Ledger {
    /// Load persisted blocks and verify them before accepting the chain
    pub fn open(
        config: LedgerConfig,
        engine: Box<dyn ProofOfWork>,
        adjuster: DifficultyAdjuster,
        store: Box<dyn BlockStore>,
    ) -> Result<Self, LedgerError> {
        config.validate()?;

        let blocks = store.read_all()?;
        let mut state = LedgerState {
            chain: Vec::with_capacity(blocks.len()),
            queue: VecDeque::new(),
            difficulty: config.initial_difficulty.clone(),
            metrics: Vec::new(),
            committed: ChainState::default(),
            pending: ChainState::default(),
            consecutive_failures: 0,
        };

        for block in blocks {
            verify_link(state.chain.last(), &block)?;
            expect_difficulty(&config, &block, &mut state.difficulty)?;
            verify_block(engine.as_ref(), &block)?;

            let mut next = state.committed.clone();
            apply_all(&block.transactions, &mut next).map_err(|e| {
                LedgerError::InvalidChain(format!("block {}: {}", block.index, e))
            })?;
            state.committed = next;

            absorb(&adjuster, &mut state, block);
        }
        state.pending = state.committed.clone();

        info!(
            "Ledger loaded: {} blocks, difficulty {}",
            state.chain.len(),
            state.difficulty
        );

        Ok(Self {
            state: Mutex::new(state),
            changed: Condvar::new(),
            cycle: Mutex::new(()),
            shutdown: AtomicBool::new(false),
            engine,
            adjuster,
            store,
            clock: Arc::new(SystemClock),
            config,
        })
    }

    /// Replace the time source used for block timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn engine(&self) -> &dyn ProofOfWork {
        self.engine.as_ref()
    }

    fn lock_state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a transaction for the next block; returns the queue length
    pub fn submit(&self, tx: Transaction) -> Result<usize, LedgerError> {
        tx.validate()?;

        let pending = {
            let mut state = self.lock_state();
            if state.queue.len() >= self.config.max_pending {
                return Err(LedgerError::QueueFull(state.queue.len()));
            }

            tx.apply(&mut state.pending)?;
            debug!("Queued {} transaction {}", tx.kind(), &tx.id()[..16]);
            state.queue.push_back(tx);
            state.queue.len()
        };

        self.changed.notify_all();
        Ok(pending)
    }

    /// Assemble, mine, persist and commit one block from the queue
    pub fn run_one_cycle(&self) -> Result<CycleOutcome, LedgerError> {
        let _cycle = self.cycle.lock().unwrap_or_else(|e| e.into_inner());

        // Assembling
        let (candidate, taken, next_state) = {
            let state = self.lock_state();
            if state.queue.is_empty() {
                return Ok(CycleOutcome::Idle);
            }

            let taken = state.queue.len().min(self.config.max_block_transactions);
            let mut transactions = Vec::with_capacity(taken + 1);
            if let Some(address) = &self.config.miner_address {
                transactions.push(Transaction::reward(address, self.config.block_reward));
            }
            transactions.extend(state.queue.iter().take(taken).cloned());

            let mut next_state = state.committed.clone();
            if let Err(e) = apply_all(&transactions, &mut next_state) {
                drop(state);
                return Err(self.record_failure(e.into()));
            }

            let previous_hash = state
                .chain
                .last()
                .map(|b| b.hash.clone())
                .unwrap_or_else(|| GENESIS_PREVIOUS_HASH.to_string());

            let candidate = BlockCandidate::new(
                state.chain.len() as u64,
                self.clock.now(),
                transactions,
                previous_hash,
                state.difficulty.clone(),
            );
            (candidate, taken, next_state)
        };

        info!(
            "Mining block {} with {} transactions at difficulty {} ({} engine)",
            candidate.index,
            candidate.transactions.len(),
            candidate.difficulty,
            self.engine.name()
        );

        // Mining
        let header = candidate.header_bytes();
        let target = candidate.target();
        let proof = self
            .engine
            .mine(&header, &target)
            .map_err(|e| self.record_failure(e.into()))?;
        self.engine
            .validate(&proof, &header, &target)
            .map_err(|e| self.record_failure(e.into()))?;
        let block = candidate.seal(proof);

        // Persisting
        self.store
            .write_block(&block)
            .map_err(|e| self.record_failure(e.into()))?;

        // Committed
        {
            let mut state = self.lock_state();
            state.queue.drain(..taken);
            state.committed = next_state;
            state.pending = rebuild_pending(&state.committed, &state.queue);
            state.consecutive_failures = 0;
            absorb(&self.adjuster, &mut state, block.clone());
        }
        self.changed.notify_all();

        info!(
            "Block {} committed: hash {}, nonce {}",
            block.index,
            &block.hash[..16],
            block.nonce
        );
        Ok(CycleOutcome::Committed(block))
    }

    fn record_failure(&self, err: LedgerError) -> LedgerError {
        let failures = {
            let mut state = self.lock_state();
            state.consecutive_failures += 1;
            state.consecutive_failures
        };

        if !err.is_retryable() {
            error!("Mining cycle failed: {}", err);
        } else if failures <= self.config.max_silent_retries {
            debug!("Mining cycle failed (attempt {}), will retry: {}", failures, err);
        } else {
            warn!("Mining cycle failed {} times in a row: {}", failures, err);
        }

        err
    }

    /// Current status for reporting
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.lock_state();
        LedgerSnapshot {
            height: state.chain.len(),
            pending: state.queue.len(),
            difficulty: state.difficulty.clone(),
            latest_block: state.chain.last().cloned(),
        }
    }

    pub fn height(&self) -> usize {
        self.lock_state().chain.len()
    }

    pub fn pending(&self) -> usize {
        self.lock_state().queue.len()
    }

    pub fn difficulty(&self) -> BigUint {
        self.lock_state().difficulty.clone()
    }

    pub fn blocks(&self) -> Vec<Block> {
        self.lock_state().chain.clone()
    }

    pub fn block(&self, index: u64) -> Option<Block> {
        let state = self.lock_state();
        usize::try_from(index)
            .ok()
            .and_then(|i| state.chain.get(i).cloned())
    }

    /// Committed balance of an address
    pub fn balance(&self, address: &str) -> u64 {
        self.lock_state().committed.balance(address)
    }

    /// Copy of the committed chain state
    pub fn chain_state(&self) -> ChainState {
        self.lock_state().committed.clone()
    }

    /// Metrics recorded for each block after genesis
    pub fn metrics_history(&self) -> Vec<BlockMetrics> {
        self.lock_state().metrics.clone()
    }

    /// Re-verify links, difficulties, hashes and proofs of the whole chain
    pub fn verify_chain(&self) -> Result<(), LedgerError> {
        let blocks = self.blocks();
        let mut difficulty = self.config.initial_difficulty.clone();
        let mut metrics = Vec::new();
        let mut previous: Option<&Block> = None;
        for block in &blocks {
            verify_link(previous, block)?;
            expect_difficulty(&self.config, block, &mut difficulty)?;
            verify_block(self.engine.as_ref(), block)?;

            if let Some(prev) = previous {
                metrics.push(block.metrics_since(prev));
            }
            retarget(&self.adjuster, &mut difficulty, &metrics, block.index + 1);
            previous = Some(block);
        }
        Ok(())
    }

    pub fn is_valid_chain(&self) -> bool {
        match self.verify_chain() {
            Ok(()) => true,
            Err(e) => {
                warn!("Chain verification failed: {}", e);
                false
            }
        }
    }

    /// Block until the chain reaches `height` blocks or `timeout` passes
    pub fn wait_for_height(&self, height: usize, timeout: Duration) -> bool {
        let state = self.lock_state();
        let (state, _) = self
            .changed
            .wait_timeout_while(state, timeout, |s| s.chain.len() < height)
            .unwrap_or_else(|e| e.into_inner());
        state.chain.len() >= height
    }

    /// Start the dedicated mining thread
    pub fn spawn_miner(self: &Arc<Self>) -> io::Result<MinerHandle> {
        self.shutdown.store(false, Ordering::SeqCst);

        let ledger = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("miner".to_string())
            .spawn(move || ledger.mining_loop())?;

        Ok(MinerHandle {
            ledger: Arc::clone(self),
            handle: Some(handle),
        })
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn mining_loop(&self) {
        info!("Miner started ({} engine)", self.engine.name());
        let idle = Duration::from_millis(self.config.idle_poll_ms.max(1));
        let interval = Duration::from_millis(self.config.min_block_interval_ms);

        while !self.is_shutting_down() {
            self.wait_for_work(idle);
            if self.is_shutting_down() {
                break;
            }

            match self.run_one_cycle() {
                Ok(CycleOutcome::Committed(_)) => {
                    if !interval.is_zero() {
                        self.pause(interval);
                    }
                }
                Ok(CycleOutcome::Idle) => {}
                // Already logged; the queue is intact for the next cycle
                Err(_) => self.pause(idle),
            }
        }

        info!("Miner stopped");
    }

    fn wait_for_work(&self, poll: Duration) {
        let state = self.lock_state();
        let _state = self
            .changed
            .wait_timeout_while(state, poll, |s| {
                s.queue.is_empty() && !self.is_shutting_down()
            })
            .unwrap_or_else(|e| e.into_inner());
    }

    /// Sleep for `duration` unless shutdown is requested first
    fn pause(&self, duration: Duration) {
        let state = self.lock_state();
        let _state = self
            .changed
            .wait_timeout_while(state, duration, |_| !self.is_shutting_down())
            .unwrap_or_else(|e| e.into_inner());
    }

    fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Take the lock so a waiter cannot miss the flag between check and wait
        drop(self.lock_state());
        self.changed.notify_all();
    }
}

/// Owns the mining thread; stops and joins it on drop
pub struct MinerHandle {
    ledger: Arc<Ledger>,
    handle: Option<JoinHandle<()>>,
}

impl MinerHandle {
    /// Stop the miner after its current cycle and wait for it
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.ledger.request_shutdown();
            if handle.join().is_err() {
                error!("Mining thread panicked");
            }
        }
    }
}

impl Drop for MinerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn apply_all(transactions: &[Transaction], state: &mut ChainState) -> Result<(), TransactionError> {
    for tx in transactions {
        let description = tx.apply(state)?;
        debug!("Applied: {}", description);
    }
    Ok(())
}

/// Committed state with the remaining queue replayed on top
fn rebuild_pending(committed: &ChainState, queue: &VecDeque<Transaction>) -> ChainState {
    let mut pending = committed.clone();
    for tx in queue {
        if let Err(e) = tx.apply(&mut pending) {
            warn!("Queued transaction {} no longer applies: {}", tx.id(), e);
        }
    }
    pending
}

fn verify_link(previous: Option<&Block>, block: &Block) -> Result<(), LedgerError> {
    let (expected_index, expected_previous) = match previous {
        Some(prev) => (prev.index + 1, prev.hash.as_str()),
        None => (0, GENESIS_PREVIOUS_HASH),
    };

    if block.index != expected_index {
        return Err(LedgerError::InvalidChain(format!(
            "expected index {}, got {}",
            expected_index, block.index
        )));
    }

    if block.previous_hash != expected_previous {
        return Err(LedgerError::InvalidChain(format!(
            "block {} does not link to its predecessor",
            block.index
        )));
    }

    Ok(())
}

/// Check a stored block carries the difficulty replayed from its history.
/// With the override set, the stored value replaces the replayed one.
fn expect_difficulty(
    config: &LedgerConfig,
    block: &Block,
    expected: &mut BigUint,
) -> Result<(), LedgerError> {
    if block.difficulty == *expected {
        return Ok(());
    }

    if !config.allow_difficulty_override {
        return Err(LedgerError::InvalidChain(format!(
            "block {} declares difficulty {}, expected {}",
            block.index, block.difficulty, expected
        )));
    }

    warn!(
        "Block {} was mined at difficulty {}, replay expected {}; accepting stored value",
        block.index, block.difficulty, expected
    );
    *expected = block.difficulty.clone();
    Ok(())
}

/// Hash and proof check; the block's difficulty must already be vetted
fn verify_block(engine: &dyn ProofOfWork, block: &Block) -> Result<(), LedgerError> {
    if !block.verify_hash() {
        return Err(LedgerError::InvalidChain(format!(
            "block {} hash does not match its contents",
            block.index
        )));
    }

    engine.validate(&block.proof, &block.header_bytes(), &block.target())?;
    Ok(())
}

/// Append a verified block, record its metrics and retarget when due
fn absorb(adjuster: &DifficultyAdjuster, state: &mut LedgerState, block: Block) {
    if let Some(previous) = state.chain.last() {
        state.metrics.push(block.metrics_since(previous));
    }
    state.chain.push(block);

    let next_index = state.chain.len() as u64;
    retarget(adjuster, &mut state.difficulty, &state.metrics, next_index);
}

/// Retarget from the trailing metrics when `next_index` closes a window
fn retarget(
    adjuster: &DifficultyAdjuster,
    difficulty: &mut BigUint,
    metrics: &[BlockMetrics],
    next_index: u64,
) {
    if !adjuster.should_adjust_difficulty(next_index) {
        return;
    }

    match adjuster.adjust_from_history(difficulty, metrics) {
        Ok(next) => *difficulty = next,
        Err(e) => warn!(
            "Metrics window rejected at block {}, difficulty unchanged: {}",
            next_index, e
        ),
    }
}
