//! Storage backends for the consent ledger.
//!
//! - [`json_file::JsonFileStore`]: the whole chain as one JSON document, rewritten
//!   atomically on every append. This is the format auditors read directly.
//! - [`sled_store::SledStore`]: an append log keyed by block index; appends write
//!   only the new block.
//! - [`mem::MemoryStore`]: in-process store with write-failure injection.

pub mod json_file;
pub mod mem;
pub mod sled_store;

use std::path::PathBuf;
use std::sync::Arc;

use consent_core::{ChainStore, StorageError};

pub use json_file::JsonFileStore;
pub use mem::MemoryStore;
pub use sled_store::SledStore;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    JsonFile,
    Sled,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: Backend,
    /// File path for `JsonFile`, directory for `Sled`.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::JsonFile,
            path: PathBuf::from("./data/ledger.json"),
        }
    }
}

pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn ChainStore>, StorageError> {
    Ok(match config.backend {
        Backend::JsonFile => Arc::new(JsonFileStore::new(&config.path)),
        Backend::Sled => Arc::new(SledStore::open(&config.path)?),
    })
}
