use thiserror::Error;

use crate::verify::Violation;

/// Failures raised by a [`crate::chain::ChainStore`] backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing medium could not be read or written.
    #[error("ledger storage unavailable at {location}: {source}")]
    Unavailable {
        location: String,
        #[source]
        source: std::io::Error,
    },
    /// Storage exists but does not hold a parseable, non-empty chain.
    #[error("ledger storage at {location} is corrupt: {reason}")]
    Corrupt { location: String, reason: String },
    #[error("ledger storage backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("cannot serialize payload for hashing: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("chain verification failed at block {}: {}", .0.index, .0.reason)]
    Verification(Violation),
    #[error("ledger lock poisoned by a panicked writer")]
    Poisoned,
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
