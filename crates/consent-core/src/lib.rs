pub mod chain;
pub mod constants;
pub mod error;
pub mod hash;
pub mod ledger;
pub mod verify;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub use chain::{Chain, ChainStore, CorruptPolicy};
pub use error::{LedgerError, Result, StorageError};
pub use hash::{canonical_json, compute_hash, profile_hash};
pub use ledger::{Head, Ledger, Order};
pub use verify::{verify, violations, InvalidReason, Verification, Violation};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    #[default]
    #[serde(rename = "DONOR_CONSENT")]
    DonorConsent,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::DonorConsent => f.write_str("DONOR_CONSENT"),
        }
    }
}

/// Payload of a consent block. Field order is part of the hash input and must not change.
/// Only these fields are hashed, so any other key in a stored payload is rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransactionData {
    pub user_id: String,
    pub consent_given: bool,
    pub profile_hash: String,
    pub recorded_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockData {
    Consent(TransactionData),
    Origin(GenesisData),
}

/// Marker carried by the genesis block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenesisData {
    pub message: String,
}

impl From<TransactionData> for BlockData {
    fn from(data: TransactionData) -> Self {
        BlockData::Consent(data)
    }
}

impl BlockData {
    pub fn as_consent(&self) -> Option<&TransactionData> {
        match self {
            BlockData::Consent(data) => Some(data),
            BlockData::Origin(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Block {
    pub timestamp: String,
    pub transaction_type: TransactionType,
    pub data: BlockData,
    pub hash: String,
    pub previous_hash: String,
}

impl Block {
    /// Build a consent block on top of `previous_hash`, computing its hash.
    pub fn consent(
        timestamp: String,
        data: TransactionData,
        previous_hash: String,
    ) -> Result<Self> {
        let data = BlockData::from(data);
        let hash = compute_hash(&timestamp, &data, &previous_hash)?;
        Ok(Self {
            timestamp,
            transaction_type: TransactionType::DonorConsent,
            data,
            hash,
            previous_hash,
        })
    }

    pub fn is_genesis(&self) -> bool {
        matches!(self.data, BlockData::Origin(_))
    }
}

/// Current UTC time as ISO-8601 with millisecond precision, e.g. `2024-05-01T09:30:00.123Z`.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
