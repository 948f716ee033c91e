//! Storage module for block persistence

pub mod persistence;

pub use persistence::{
    block_key, order_records, BlockStore, FileBlockStore, MemoryBlockStore, StorageConfig,
    StorageError, BLOCK_KEY_WIDTH,
};
