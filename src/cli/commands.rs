//! CLI commands for the chain
//!
//! Implements all command handlers for the CLI interface.

use crate::config::NodeConfig;
use crate::consensus::{EngineKind, ProofEngine};
use crate::core::{CycleOutcome, Ledger, Transaction};
use crate::storage::{BlockStore, FileBlockStore};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
pub struct AppState {
    pub config: NodeConfig,
    pub ledger: Arc<Ledger>,
}

impl AppState {
    /// Open the ledger described by `config`
    pub fn new(config: NodeConfig) -> CliResult<Self> {
        if FileBlockStore::new(config.storage.clone())?.record_count()? > 0 {
            println!("📂 Loading existing chain...");
        }
        let ledger = Arc::new(config.open_ledger()?);

        Ok(Self { config, ledger })
    }

    /// Mine until the queue is empty, retrying failed cycles
    fn drain_queue(&self) -> CliResult<Vec<crate::core::Block>> {
        let mut mined = Vec::new();
        let mut failures = 0u32;
        let retries = self.config.ledger.max_silent_retries;

        while self.ledger.pending() > 0 {
            match self.ledger.run_one_cycle() {
                Ok(CycleOutcome::Committed(block)) => {
                    failures = 0;
                    mined.push(block);
                }
                Ok(CycleOutcome::Idle) => break,
                Err(e) if e.is_retryable() && failures < retries => {
                    failures += 1;
                    println!("⚠️  {}; retrying ({}/{})", e, failures, retries);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(mined)
    }
}

/// Transaction to queue from the command line
pub enum SubmitKind {
    Message { sender: String, content: String },
    Transfer { from: String, to: String, amount: u64 },
    Record { owner: String, key: String, data: String },
}

impl SubmitKind {
    fn into_transaction(self) -> Transaction {
        match self {
            SubmitKind::Message { sender, content } => Transaction::message(&sender, &content),
            SubmitKind::Transfer { from, to, amount } => Transaction::transfer(&from, &to, amount),
            SubmitKind::Record { owner, key, data } => Transaction::record(&owner, &key, &data),
        }
    }
}

/// Write a config file and report the chain location
pub fn cmd_init(config: &NodeConfig, config_path: &Path) -> CliResult<()> {
    if config_path.exists() {
        println!("⚠️  Configuration already exists at {:?}", config_path);
        return Ok(());
    }

    config.validate()?;
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    config.save(config_path)?;
    FileBlockStore::new(config.storage.clone())?;

    println!("✅ Chain initialized!");
    println!("   📁 Data directory: {:?}", config.storage.data_dir);
    println!("   📝 Config: {:?}", config_path);
    println!("   ⚙️  Engine: {:?}", config.engine);
    println!("   🔧 Initial difficulty: {}", config.ledger.initial_difficulty);
    println!("   ⏱️  Target block time: {}s", config.difficulty.target_block_time);

    Ok(())
}

/// Queue one transaction and mine it into a block
pub fn cmd_submit(state: &AppState, kind: SubmitKind) -> CliResult<()> {
    println!("⛏️  Submitting to the {} engine", state.ledger.engine().name());

    let tx = kind.into_transaction();
    let id = tx.id();
    state.ledger.submit(tx)?;
    println!("📤 Transaction {} queued", &id[..16]);

    for block in state.drain_queue()? {
        print_block(&block);
    }

    Ok(())
}

/// Run the miner thread against synthetic producers
pub fn cmd_run(
    state: &AppState,
    producers: usize,
    per_producer: usize,
    timeout: Duration,
) -> CliResult<()> {
    let start_height = state.ledger.height();
    println!(
        "🚀 Starting miner with {} producer(s) x {} transaction(s)",
        producers, per_producer
    );

    let miner = state.ledger.spawn_miner()?;

    let handles: Vec<_> = (0..producers)
        .map(|p| {
            let ledger = Arc::clone(&state.ledger);
            thread::Builder::new()
                .name(format!("producer-{p}"))
                .spawn(move || {
                    let sender = format!("producer-{p}");
                    let mut accepted = 0usize;
                    for i in 0..per_producer {
                        let tx = Transaction::message(&sender, &format!("message {i}"));
                        match ledger.submit(tx) {
                            Ok(_) => accepted += 1,
                            Err(e) => log::warn!("{} dropped message {}: {}", sender, i, e),
                        }
                    }
                    accepted
                })
        })
        .collect::<Result<_, _>>()?;

    let mut accepted = 0;
    for handle in handles {
        accepted += handle.join().map_err(|_| "producer thread panicked")?;
    }
    println!("📬 {} transaction(s) queued", accepted);

    let deadline = Instant::now() + timeout;
    while state.ledger.pending() > 0 && Instant::now() < deadline {
        let next = state.ledger.height() + 1;
        state.ledger.wait_for_height(next, Duration::from_millis(500));
    }
    miner.shutdown();

    let snapshot = state.ledger.snapshot();
    println!("\n⛓️  Run finished");
    println!("   ├─ Blocks mined: {}", snapshot.height - start_height);
    println!("   ├─ Height: {}", snapshot.height);
    println!("   ├─ Still pending: {}", snapshot.pending);
    println!("   └─ Difficulty: {}", snapshot.difficulty);

    if snapshot.pending > 0 {
        println!("\n⚠️  Timed out with transactions still queued; they are not persisted.");
    }

    Ok(())
}

/// Display chain info
pub fn cmd_chain_info(state: &AppState) -> CliResult<()> {
    let snapshot = state.ledger.snapshot();
    let chain_state = state.ledger.chain_state();

    println!("⛓️  Chain Info");
    println!("   ├─ Height: {}", snapshot.height);
    println!("   ├─ Difficulty: {}", snapshot.difficulty);
    println!("   ├─ Engine: {}", state.ledger.engine().name());
    println!("   ├─ Messages: {}", chain_state.message_count());
    println!("   ├─ Funded accounts: {}", chain_state.funded_accounts());
    match snapshot.latest_block {
        Some(block) => println!("   └─ Latest hash: {}...", &block.hash[..32]),
        None => println!("   └─ Latest hash: (empty chain)"),
    }

    Ok(())
}

/// List recent blocks
pub fn cmd_chain_blocks(state: &AppState, count: usize) -> CliResult<()> {
    let blocks = state.ledger.blocks();
    if blocks.is_empty() {
        println!("📭 No blocks yet. Mine one with: phase-chain submit message ...");
        return Ok(());
    }

    println!("🧱 Recent blocks:");
    for block in blocks.iter().rev().take(count) {
        println!(
            "   #{} | {} | {} tx | difficulty {} | {}",
            block.index,
            &block.hash[..16],
            block.tx_count(),
            block.difficulty,
            block.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

/// Show an address balance
pub fn cmd_balance(state: &AppState, address: &str) -> CliResult<()> {
    println!("💰 Balance for {}", address);
    println!("   Total: {} coins", state.ledger.balance(address));
    Ok(())
}

/// Validate the stored chain
pub fn cmd_validate(config: &NodeConfig, strict: bool) -> CliResult<()> {
    println!("🔍 Validating chain...");

    let ledger = match config.open_ledger() {
        Ok(ledger) => ledger,
        Err(e) => {
            println!("❌ Chain validation FAILED!");
            println!("   {}", e);
            return Err(e.into());
        }
    };
    println!("✅ Chain is valid!");
    println!("   {} blocks verified", ledger.height());

    if strict {
        if config.engine != EngineKind::MultiPhase {
            println!("ℹ️  Stage replay only applies to the multi-phase engine");
            return Ok(());
        }

        let engine = ProofEngine::new(config.proof.clone());
        let store = FileBlockStore::new(config.storage.clone())?;
        let mut replayed = 0;
        for block in store.read_all()? {
            let header = block.header_bytes();
            if let Err(e) = engine.verify_deterministic_stages(&block.proof, &header) {
                println!("❌ Block {} failed stage replay: {}", block.index, e);
                return Err(format!("block {} failed stage replay: {}", block.index, e).into());
            }
            replayed += 1;
        }
        println!("   {} blocks passed memory and time-lock replay", replayed);
    }

    Ok(())
}

fn print_block(block: &crate::core::Block) {
    println!("\n   Block {} mined!", block.index);
    println!("   ├─ Hash: {}", &block.hash[..16]);
    println!("   ├─ Transactions: {}", block.tx_count());
    println!("   ├─ Nonce: {}", block.nonce);
    println!("   ├─ Difficulty: {}", block.difficulty);
    println!("   └─ Energy: {}", block.proof.energy_used);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::ProofConfig;
    use crate::storage::StorageConfig;
    use std::fs;

    fn config(dir: &Path) -> NodeConfig {
        NodeConfig {
            proof: ProofConfig::lightweight(),
            storage: StorageConfig {
                data_dir: dir.to_path_buf(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_submit_mines_block() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state = AppState::new(config(temp_dir.path())).unwrap();

        cmd_submit(
            &state,
            SubmitKind::Message {
                sender: "alice".to_string(),
                content: "hello".to_string(),
            },
        )
        .unwrap();

        assert_eq!(state.ledger.height(), 1);
        assert_eq!(state.ledger.pending(), 0);
    }

    #[test]
    fn test_run_with_producers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let state = AppState::new(config(temp_dir.path())).unwrap();

        cmd_run(&state, 2, 3, Duration::from_secs(30)).unwrap();

        let included: usize = state.ledger.blocks().iter().map(|b| b.tx_count()).sum();
        assert_eq!(included, 6);
    }

    #[test]
    fn test_init_writes_config_once() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("node.json");
        let config = config(temp_dir.path());

        cmd_init(&config, &path).unwrap();
        assert!(path.exists());
        assert!(temp_dir.path().join("blocks").is_dir());

        // Second init leaves the file alone
        cmd_init(&NodeConfig::default(), &path).unwrap();
        let loaded = NodeConfig::load(&path).unwrap();
        assert_eq!(loaded.proof, ProofConfig::lightweight());
    }

    #[test]
    fn test_strict_validate() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = config(temp_dir.path());
        let state = AppState::new(config.clone()).unwrap();
        cmd_submit(
            &state,
            SubmitKind::Record {
                owner: "alice".to_string(),
                key: "k".to_string(),
                data: "v".to_string(),
            },
        )
        .unwrap();

        assert!(cmd_validate(&config, true).is_ok());
    }

    #[test]
    fn test_validate_fails_on_tampered_chain() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = config(temp_dir.path());
        let state = AppState::new(config.clone()).unwrap();
        cmd_submit(
            &state,
            SubmitKind::Message {
                sender: "alice".to_string(),
                content: "original".to_string(),
            },
        )
        .unwrap();
        drop(state);

        let record = temp_dir.path().join("blocks").join("block_0000000000.json");
        let tampered = fs::read_to_string(&record)
            .unwrap()
            .replace("original", "forged");
        fs::write(&record, tampered).unwrap();

        assert!(cmd_validate(&config, false).is_err());
        assert!(cmd_validate(&config, true).is_err());
    }

    #[test]
    fn test_validate_rejects_changed_difficulty_unless_overridden() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = config(temp_dir.path());
        let state = AppState::new(config.clone()).unwrap();
        cmd_submit(
            &state,
            SubmitKind::Message {
                sender: "alice".to_string(),
                content: "hi".to_string(),
            },
        )
        .unwrap();
        drop(state);

        config.ledger.initial_difficulty = config.ledger.initial_difficulty.clone() + 1u32;
        assert!(cmd_validate(&config, false).is_err());

        config.ledger.allow_difficulty_override = true;
        assert!(cmd_validate(&config, false).is_ok());
    }
}
