use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use consent_core::{Block, ChainStore, StorageError};

/// Keeps the chain in process memory. Writes can be switched to fail, which is
/// how callers exercise the rollback path without a real disk fault.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: Mutex<Option<Vec<Block>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing chain, e.g. one read from an audit export.
    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        Self {
            blocks: Mutex::new(Some(blocks)),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Copy of what has been persisted so far.
    pub fn snapshot(&self) -> Option<Vec<Block>> {
        self.guard().ok().and_then(|g| g.clone())
    }

    fn guard(&self) -> Result<MutexGuard<'_, Option<Vec<Block>>>, StorageError> {
        self.blocks
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".into()))
    }
}

impl ChainStore for MemoryStore {
    fn load(&self) -> Result<Option<Vec<Block>>, StorageError> {
        Ok(self.guard()?.clone())
    }

    fn persist(&self, blocks: &[Block]) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                location: self.location(),
                source: io::Error::new(io::ErrorKind::Other, "writes disabled"),
            });
        }
        *self.guard()? = Some(blocks.to_vec());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
