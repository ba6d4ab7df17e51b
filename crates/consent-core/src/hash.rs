//! Content digests for blocks and attested profiles.
//!
//! Block hashes are SHA-256 over `timestamp ‖ data ‖ previous_hash`, where `data`
//! is the compact JSON of the block payload in its declared field order. Profile
//! payloads are arbitrary JSON, so they go through [`canonical_json`] first.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{BlockData, Result};

/// Hex SHA-256 of a block's content and lineage. Pure: no clock, no randomness.
pub fn compute_hash(timestamp: &str, data: &BlockData, previous_hash: &str) -> Result<String> {
    let data_bytes = serde_json::to_vec(data)?;
    let mut hasher = Sha256::new();
    hasher.update(timestamp.as_bytes());
    hasher.update(&data_bytes);
    hasher.update(previous_hash.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Compact JSON with object keys sorted recursively, independent of how the
/// caller's map type orders its entries.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&sorted(value))?)
}

/// Fingerprint of a profile payload; the only trace of the profile kept on chain.
pub fn profile_hash<T: Serialize + ?Sized>(profile: &T) -> Result<String> {
    let bytes = canonical_json(profile)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}
