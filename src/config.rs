//! Node configuration
//!
//! Every section has working defaults, so a config file only needs the
//! fields it wants to change.

use crate::consensus::{build_engine, EngineKind, ProofConfig};
use crate::core::{Ledger, LedgerConfig, LedgerError};
use crate::difficulty::{DifficultyAdjuster, DifficultyConfig};
use crate::storage::{FileBlockStore, StorageConfig};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Full node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub engine: EngineKind,
    pub proof: ProofConfig,
    pub difficulty: DifficultyConfig,
    pub ledger: LedgerConfig,
    pub storage: StorageConfig,
}

impl NodeConfig {
    /// Load from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        let config: NodeConfig = serde_json::from_str(&data)?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Write as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.proof
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.difficulty.validate()?;
        self.ledger.validate()
    }

    /// Open the ledger stored under `storage.data_dir`
    pub fn open_ledger(&self) -> Result<Ledger, LedgerError> {
        self.validate()?;

        let engine = build_engine(self.engine, &self.proof);
        let adjuster = DifficultyAdjuster::new(self.difficulty.clone())?;
        let store = FileBlockStore::new(self.storage.clone())?;

        Ledger::open(self.ledger.clone(), engine, adjuster, Box::new(store))
    }
}
