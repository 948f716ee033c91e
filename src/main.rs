//! phase-chain CLI Application
//!
//! A command-line interface for mining and inspecting the chain.

use clap::{Parser, Subcommand};
use num_bigint::BigUint;
use phase_chain::cli::{self, AppState, SubmitKind};
use phase_chain::config::NodeConfig;
use phase_chain::consensus::EngineKind;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "phase-chain")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "A proof-of-work chain with a three-stage proof", long_about = None)]
struct Cli {
    /// Data directory for chain storage
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// JSON configuration file (defaults to <data-dir>/node.json when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mining strategy: multi-phase or leading-zero
    #[arg(short, long)]
    engine: Option<EngineKind>,

    /// Accept stored blocks whose difficulty differs from the replayed
    /// history, e.g. after changing the initial difficulty
    #[arg(long, global = true)]
    allow_difficulty_override: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a configuration file for a new chain
    Init {
        /// Difficulty for the first blocks
        #[arg(long)]
        difficulty: Option<BigUint>,

        /// Address credited with a reward in every block
        #[arg(long)]
        miner: Option<String>,

        /// Use small proof parameters for fast local runs
        #[arg(long)]
        lightweight: bool,
    },

    /// Queue a transaction and mine it
    Submit {
        #[command(subcommand)]
        kind: SubmitCommands,
    },

    /// Run the mining thread with synthetic transaction producers
    Run {
        /// Number of producer threads
        #[arg(short, long, default_value = "2")]
        producers: usize,

        /// Transactions per producer
        #[arg(short, long, default_value = "5")]
        count: usize,

        /// Seconds to wait for the queue to drain
        #[arg(short, long, default_value = "120")]
        timeout: u64,
    },

    /// Display chain information
    Chain {
        #[command(subcommand)]
        action: Option<ChainCommands>,
    },

    /// Show an address balance
    Balance {
        #[arg(short, long)]
        address: String,
    },

    /// Validate the stored chain
    Validate {
        /// Also replay the memory and time-lock stages of every proof
        #[arg(long)]
        strict: bool,
    },
}

#[derive(Subcommand)]
enum SubmitCommands {
    /// Post a message
    Message {
        #[arg(short, long)]
        sender: String,
        #[arg(short, long)]
        content: String,
    },

    /// Send coins to an address
    Transfer {
        #[arg(short, long)]
        from: String,
        #[arg(short, long)]
        to: String,
        #[arg(short, long)]
        amount: u64,
    },

    /// Store a keyed record
    Record {
        #[arg(short, long)]
        owner: String,
        #[arg(short, long)]
        key: String,
        #[arg(long)]
        data: String,
    },
}

#[derive(Subcommand)]
enum ChainCommands {
    /// Show detailed info
    Info,

    /// List recent blocks
    Blocks {
        /// Number of blocks to show
        #[arg(short, long, default_value = "10")]
        count: usize,
    },
}

const CONFIG_FILE: &str = "node.json";
const DEFAULT_DATA_DIR: &str = ".blockchain_data";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join(CONFIG_FILE));

    let mut config = if config_path.exists() {
        NodeConfig::load(&config_path)?
    } else {
        NodeConfig::default()
    };

    // Command-line flags override the file
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    } else if !config_path.exists() {
        config.storage.data_dir = data_dir;
    }
    if let Some(engine) = cli.engine {
        config.engine = engine;
    }
    if cli.allow_difficulty_override {
        config.ledger.allow_difficulty_override = true;
    }

    // Handle init command separately (doesn't need the ledger)
    if let Commands::Init {
        difficulty,
        miner,
        lightweight,
    } = cli.command
    {
        if lightweight {
            config.proof = phase_chain::consensus::ProofConfig::lightweight();
        }
        if let Some(difficulty) = difficulty {
            config.ledger.initial_difficulty = difficulty;
        }
        if miner.is_some() {
            config.ledger.miner_address = miner;
        }
        return cli::cmd_init(&config, &config_path);
    }

    if let Commands::Validate { strict } = cli.command {
        return cli::cmd_validate(&config, strict);
    }

    // Initialize application state
    let state = AppState::new(config)?;

    // Process commands
    match cli.command {
        Commands::Init { .. } => unreachable!(),
        Commands::Validate { .. } => unreachable!(),

        Commands::Submit { kind } => {
            let kind = match kind {
                SubmitCommands::Message { sender, content } => {
                    SubmitKind::Message { sender, content }
                }
                SubmitCommands::Transfer { from, to, amount } => {
                    SubmitKind::Transfer { from, to, amount }
                }
                SubmitCommands::Record { owner, key, data } => {
                    SubmitKind::Record { owner, key, data }
                }
            };
            cli::cmd_submit(&state, kind)?;
        }

        Commands::Run {
            producers,
            count,
            timeout,
        } => {
            cli::cmd_run(&state, producers, count, Duration::from_secs(timeout))?;
        }

        Commands::Chain { action } => match action {
            None | Some(ChainCommands::Info) => {
                cli::cmd_chain_info(&state)?;
            }
            Some(ChainCommands::Blocks { count }) => {
                cli::cmd_chain_blocks(&state, count)?;
            }
        },

        Commands::Balance { address } => {
            cli::cmd_balance(&state, &address)?;
        }
    }

    Ok(())
}
