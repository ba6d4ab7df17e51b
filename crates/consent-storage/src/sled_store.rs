use consent_core::{Block, ChainStore, StorageError};
use sled::{Db, IVec, Tree};
use std::path::Path;
use tracing::{info, warn};

const TREE_BLOCKS: &str = "blocks";
const KEY_LENGTH: &[u8] = b"length";
const KEY_TIP_HASH: &[u8] = b"tip_hash";

/// Append log on sled. Blocks are keyed by big-endian index, so iteration order
/// is chain order; a persist writes only blocks past the stored length.
#[derive(Clone)]
pub struct SledStore {
    db: Db,
    blocks: Tree,
    location: String,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let location = path.as_ref().display().to_string();
        let db = sled::open(path).map_err(|e| storage_error(&location, e))?;
        let blocks = db
            .open_tree(TREE_BLOCKS)
            .map_err(|e| storage_error(&location, e))?;
        info!(%location, "sled store opened");
        Ok(Self {
            db,
            blocks,
            location,
        })
    }

    /// Number of blocks durably stored.
    pub fn stored_len(&self) -> Result<usize, StorageError> {
        let raw = self.db.get(KEY_LENGTH).map_err(|e| self.error(e))?;
        match raw {
            None => Ok(0),
            Some(v) => decode_index(&v)
                .map(|n| n as usize)
                .ok_or_else(|| self.corrupt("length key is not a u64")),
        }
    }

    /// Hash of the last stored block, if any.
    pub fn tip_hash(&self) -> Result<Option<String>, StorageError> {
        let raw = self.db.get(KEY_TIP_HASH).map_err(|e| self.error(e))?;
        Ok(raw.map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    /// Drop every stored block.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.blocks.clear().map_err(|e| self.error(e))?;
        self.db.remove(KEY_LENGTH).map_err(|e| self.error(e))?;
        self.db.remove(KEY_TIP_HASH).map_err(|e| self.error(e))?;
        self.db.flush().map_err(|e| self.error(e))?;
        Ok(())
    }

    fn write_from(
        &self,
        blocks: &[Block],
        start: usize,
        written: &mut Vec<IVec>,
    ) -> Result<(), StorageError> {
        for (index, block) in blocks.iter().enumerate().skip(start) {
            let key = IVec::from(&(index as u64).to_be_bytes()[..]);
            let bytes =
                serde_json::to_vec(block).map_err(|e| StorageError::Backend(e.to_string()))?;
            self.blocks
                .insert(key.clone(), bytes)
                .map_err(|e| self.error(e))?;
            written.push(key);
        }
        let tail = &blocks[blocks.len() - 1];
        self.db
            .insert(KEY_LENGTH, &(blocks.len() as u64).to_be_bytes()[..])
            .map_err(|e| self.error(e))?;
        self.db
            .insert(KEY_TIP_HASH, tail.hash.as_bytes())
            .map_err(|e| self.error(e))?;
        self.db.flush().map_err(|e| self.error(e))?;
        Ok(())
    }

    fn undo(&self, written: &[IVec], stored: usize, tip_hash: Option<&str>) {
        for key in written {
            if let Err(e) = self.blocks.remove(key) {
                warn!(location = %self.location, error = %e, "failed to undo partial append");
            }
        }
        let restored = if stored == 0 {
            self.db.remove(KEY_LENGTH).map(|_| ())
        } else {
            self.db
                .insert(KEY_LENGTH, &(stored as u64).to_be_bytes()[..])
                .map(|_| ())
        };
        let restored = restored.and_then(|_| match tip_hash {
            Some(hash) => self.db.insert(KEY_TIP_HASH, hash.as_bytes()).map(|_| ()),
            None => self.db.remove(KEY_TIP_HASH).map(|_| ()),
        });
        if let Err(e) = restored.and_then(|_| self.db.flush().map(|_| ())) {
            warn!(location = %self.location, error = %e, "failed to restore stored length and tip");
        }
    }

    fn error(&self, e: sled::Error) -> StorageError {
        storage_error(&self.location, e)
    }

    fn corrupt(&self, reason: impl ToString) -> StorageError {
        StorageError::Corrupt {
            location: self.location.clone(),
            reason: reason.to_string(),
        }
    }
}

impl ChainStore for SledStore {
    fn load(&self) -> Result<Option<Vec<Block>>, StorageError> {
        let expected = self.stored_len()?;
        if expected == 0 && self.blocks.is_empty() {
            return Ok(None);
        }
        let mut out = Vec::with_capacity(expected);
        for (position, item) in self.blocks.iter().enumerate() {
            let (key, value) = item.map_err(|e| self.error(e))?;
            match decode_index(&key) {
                Some(index) if index as usize == position => {}
                _ => return Err(self.corrupt(format!("missing block at index {position}"))),
            }
            let block: Block = serde_json::from_slice(&value)
                .map_err(|e| self.corrupt(format!("block {position}: {e}")))?;
            out.push(block);
        }
        if out.len() != expected {
            return Err(self.corrupt(format!(
                "length key says {expected} blocks, log holds {}",
                out.len()
            )));
        }
        Ok(Some(out))
    }

    fn persist(&self, blocks: &[Block]) -> Result<(), StorageError> {
        if blocks.is_empty() {
            return Err(StorageError::Backend("refusing to persist an empty chain".into()));
        }
        let stored = self.stored_len()?;
        if blocks.len() < stored {
            return Err(StorageError::Backend(format!(
                "chain of {} blocks is shorter than the {stored} already stored",
                blocks.len()
            )));
        }
        let tip_hash = self.tip_hash()?;
        let mut written = Vec::new();
        if let Err(e) = self.write_from(blocks, stored, &mut written) {
            self.undo(&written, stored, tip_hash.as_deref());
            return Err(e);
        }
        Ok(())
    }

    fn reset(&self) -> Result<(), StorageError> {
        warn!(location = %self.location, "clearing sled ledger");
        self.clear()
    }

    fn location(&self) -> String {
        self.location.clone()
    }
}

fn decode_index(bytes: &[u8]) -> Option<u64> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(arr))
}

fn storage_error(location: &str, e: sled::Error) -> StorageError {
    match e {
        sled::Error::Io(source) => StorageError::Unavailable {
            location: location.to_string(),
            source,
        },
        corrupt @ sled::Error::Corruption { .. } => StorageError::Corrupt {
            location: location.to_string(),
            reason: corrupt.to_string(),
        },
        other => StorageError::Backend(other.to_string()),
    }
}
