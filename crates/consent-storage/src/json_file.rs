use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use consent_core::{Block, ChainStore, StorageError};
use tracing::debug;

/// Whole-chain JSON document. Every persist writes a temp file next to the
/// ledger, fsyncs it and renames it over the old one, so readers only ever see
/// a complete chain.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn unavailable(&self, source: io::Error) -> StorageError {
        StorageError::Unavailable {
            location: self.location(),
            source,
        }
    }

    fn corrupt(&self, reason: impl ToString) -> StorageError {
        StorageError::Corrupt {
            location: self.location(),
            reason: reason.to_string(),
        }
    }

    fn write_atomically(&self, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.tmp_path();
        let result = (|| -> io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)?;
            sync_parent(&self.path)
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }
}

impl ChainStore for JsonFileStore {
    fn load(&self) -> Result<Option<Vec<Block>>, StorageError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => return Err(self.corrupt(e)),
            Err(e) => return Err(self.unavailable(e)),
        };
        let blocks: Vec<Block> = serde_json::from_str(&text).map_err(|e| self.corrupt(e))?;
        if blocks.is_empty() {
            return Err(self.corrupt("ledger holds no blocks"));
        }
        Ok(Some(blocks))
    }

    fn persist(&self, blocks: &[Block]) -> Result<(), StorageError> {
        let bytes =
            serde_json::to_vec_pretty(blocks).map_err(|e| StorageError::Backend(e.to_string()))?;
        self.write_atomically(&bytes)
            .map_err(|e| self.unavailable(e))?;
        debug!(path = %self.path.display(), blocks = blocks.len(), "ledger file written");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => File::open(parent)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}
