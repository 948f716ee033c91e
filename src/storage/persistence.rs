//! Block persistence layer
//!
//! One JSON record per block, keyed by the zero-padded block index so that
//! lexical and numeric order agree. Writes are durable before they return.

use crate::core::Block;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Digits in a block key
pub const BLOCK_KEY_WIDTH: usize = 10;

const RECORD_PREFIX: &str = "block_";
const RECORD_SUFFIX: &str = ".json";

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Duplicate block index: {0}")]
    DuplicateIndex(u64),
    #[error("Record key {key} holds block {index}")]
    IndexMismatch { key: u64, index: u64 },
    #[error("Missing block: expected index {expected}, found {found}")]
    IndexGap { expected: u64, found: u64 },
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Zero-padded key for a block index
pub fn block_key(index: u64) -> String {
    format!("{:0width$}", index, width = BLOCK_KEY_WIDTH)
}

/// Read-all / write-one access to persisted blocks
pub trait BlockStore: Send + Sync {
    /// Durably write one block, replacing any record left at its index by
    /// a write that failed. The ledger only writes past its committed chain.
    fn write_block(&self, block: &Block) -> Result<(), StorageError>;

    /// Every stored block, ordered by index
    fn read_all(&self) -> Result<Vec<Block>, StorageError>;
}

/// Sort keyed records and check they form a contiguous chain from zero
pub fn order_records(mut records: Vec<(u64, Block)>) -> Result<Vec<Block>, StorageError> {
    records.sort_by_key(|(_, block)| block.index);

    let mut blocks = Vec::with_capacity(records.len());
    for (expected, (key, block)) in (0u64..).zip(records) {
        if key != block.index {
            return Err(StorageError::IndexMismatch {
                key,
                index: block.index,
            });
        }
        if block.index < expected {
            return Err(StorageError::DuplicateIndex(block.index));
        }
        if block.index > expected {
            return Err(StorageError::IndexGap {
                expected,
                found: block.index,
            });
        }
        blocks.push(block);
    }

    Ok(blocks)
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub block_dir: String,
    /// Also sync the directory after renaming a record into place
    pub sync_directory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".blockchain_data"),
            block_dir: "blocks".to_string(),
            sync_directory: true,
        }
    }
}

/// File-per-block storage
pub struct FileBlockStore {
    config: StorageConfig,
}

impl FileBlockStore {
    /// Create a new store, creating its directory if needed
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(config.data_dir.join(&config.block_dir))?;
        Ok(Self { config })
    }

    fn block_dir(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.block_dir)
    }

    fn record_path(&self, index: u64) -> PathBuf {
        self.block_dir()
            .join(format!("{RECORD_PREFIX}{}{RECORD_SUFFIX}", block_key(index)))
    }

    /// Number of records on disk
    pub fn record_count(&self) -> Result<usize, StorageError> {
        Ok(self.record_paths()?.len())
    }

    fn record_paths(&self) -> Result<Vec<(u64, PathBuf)>, StorageError> {
        let mut paths = Vec::new();

        for entry in fs::read_dir(self.block_dir())? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(key) = name
                .strip_prefix(RECORD_PREFIX)
                .and_then(|rest| rest.strip_suffix(RECORD_SUFFIX))
            else {
                continue;
            };

            let index = key
                .parse::<u64>()
                .map_err(|_| StorageError::InvalidData(format!("bad record name: {name}")))?;
            paths.push((index, path));
        }

        Ok(paths)
    }

    #[cfg(unix)]
    fn sync_dir(dir: &Path) -> io::Result<()> {
        fs::File::open(dir)?.sync_all()
    }

    #[cfg(not(unix))]
    fn sync_dir(_dir: &Path) -> io::Result<()> {
        Ok(())
    }
}

impl BlockStore for FileBlockStore {
    fn write_block(&self, block: &Block) -> Result<(), StorageError> {
        let path = self.record_path(block.index);
        if path.exists() {
            debug!("Replacing uncommitted record for block {}", block.index);
        }

        // Write to temporary file first
        let temp_path = path.with_extension("json.tmp");
        let file = fs::File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, block)?;
        writer.flush()?;

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        // Atomic rename
        fs::rename(&temp_path, &path)?;
        if self.config.sync_directory {
            if let Err(e) = Self::sync_dir(&self.block_dir()) {
                // An unsynced record must not be loaded as committed
                let _ = fs::remove_file(&path);
                return Err(e.into());
            }
        }

        debug!("Persisted block {} to {:?}", block.index, path);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<Block>, StorageError> {
        let mut records = Vec::new();

        for (key, path) in self.record_paths()? {
            let file = fs::File::open(&path)?;
            let block: Block = serde_json::from_reader(BufReader::new(file))?;
            records.push((key, block));
        }

        order_records(records)
    }
}

/// In-memory storage holding serialized records
#[derive(Default)]
pub struct MemoryBlockStore {
    records: Mutex<BTreeMap<u64, String>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlockStore for MemoryBlockStore {
    fn write_block(&self, block: &Block) -> Result<(), StorageError> {
        let json = serde_json::to_string(block)?;
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(block.index, json);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<Block>, StorageError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let parsed = records
            .iter()
            .map(|(key, json)| -> Result<(u64, Block), StorageError> {
                Ok((*key, serde_json::from_str(json)?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        order_records(parsed)
    }
}
