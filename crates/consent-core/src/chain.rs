use std::sync::Arc;

use tracing::{info, warn};

use crate::constants::{GENESIS_HASH, GENESIS_MESSAGE, GENESIS_PREVIOUS_HASH};
use crate::{Block, BlockData, GenesisData, Result, StorageError, TransactionType};

/// Trait the storage backends implement for the chain to operate.
/// This lives in `consent-core` to avoid a circular dependency.
pub trait ChainStore: Send + Sync {
    /// Read the persisted chain. `Ok(None)` means nothing has been stored yet.
    fn load(&self) -> Result<Option<Vec<Block>>, StorageError>;

    /// Durably store `blocks`. Everything but the tail may already be stored;
    /// backends are free to rewrite the whole chain or only what is missing.
    /// On error nothing of this call may remain visible.
    fn persist(&self, blocks: &[Block]) -> Result<(), StorageError>;

    /// Discard everything stored so the next `persist` starts a new chain.
    /// Stores whose `persist` rewrites the whole chain have nothing to drop.
    fn reset(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Human readable location, used in logs.
    fn location(&self) -> String;
}

/// What to do when storage exists but cannot be parsed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CorruptPolicy {
    /// Refuse to start; history is never silently discarded.
    #[default]
    Fail,
    /// Replace the corrupt store with a fresh genesis chain.
    Recreate,
}

/// In-memory chain mirrored to a `ChainStore`.
pub struct Chain<S: ChainStore + ?Sized> {
    store: Arc<S>,
    blocks: Vec<Block>,
}

impl<S: ChainStore + ?Sized> Chain<S> {
    /// Load the chain from `store`, writing a genesis chain if the store is empty.
    pub fn load(store: Arc<S>, policy: CorruptPolicy) -> Result<Self> {
        let loaded = match store.load() {
            Ok(Some(blocks)) if blocks.is_empty() => Err(StorageError::Corrupt {
                location: store.location(),
                reason: "stored chain holds no blocks".to_string(),
            }),
            other => other,
        };
        match loaded {
            Ok(Some(blocks)) => {
                info!(location = %store.location(), blocks = blocks.len(), "ledger loaded");
                return Ok(Self { store, blocks });
            }
            Ok(None) => {
                info!(location = %store.location(), "no ledger found, creating genesis block");
            }
            Err(StorageError::Corrupt { location, reason }) if policy == CorruptPolicy::Recreate => {
                warn!(%location, %reason, "ledger storage is corrupt, recreating from genesis");
                store.reset()?;
            }
            Err(e) => return Err(e.into()),
        }
        let blocks = vec![genesis_block(crate::timestamp_now())];
        store.persist(&blocks)?;
        Ok(Self { store, blocks })
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Most recently appended block. A loaded chain always holds genesis.
    pub fn tail(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    /// Push `block` and persist. If persisting fails the push is undone, so memory
    /// never runs ahead of storage.
    pub fn append(&mut self, block: Block) -> Result<()> {
        self.blocks.push(block);
        if let Err(e) = self.store.persist(&self.blocks) {
            self.blocks.pop();
            return Err(e.into());
        }
        Ok(())
    }
}

/// The chain origin: sentinel hash and previous-hash, not computed from content.
pub fn genesis_block(timestamp: String) -> Block {
    Block {
        timestamp,
        transaction_type: TransactionType::DonorConsent,
        data: BlockData::Origin(GenesisData {
            message: GENESIS_MESSAGE.to_string(),
        }),
        hash: GENESIS_HASH.to_string(),
        previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
    }
}
