#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use consent_core::{Block, CorruptPolicy, Ledger};
use consent_storage::json_file::JsonFileStore;
use consent_storage::sled_store::SledStore;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};

pub fn create_temp_dir() -> (TempDir, PathBuf) {
    // Create a temporary directory for the ledger files
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let path = temp_dir.path().to_path_buf();
    (temp_dir, path)
}

pub fn remove_temp_dir(temp_dir: TempDir) {
    let path = temp_dir.path().to_path_buf();
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&path);
    assert!(!path.exists(), "Ledger directory should be removed");
}

pub fn json_ledger(path: &Path) -> (Arc<JsonFileStore>, Ledger<JsonFileStore>) {
    let store = Arc::new(JsonFileStore::new(path));
    (store.clone(), Ledger::new(store, CorruptPolicy::Fail))
}

pub fn sled_ledger(path: &Path) -> (Arc<SledStore>, Ledger<SledStore>) {
    let store = Arc::new(SledStore::open(path).expect("Failed to open SledStore"));
    (store.clone(), Ledger::new(store, CorruptPolicy::Fail))
}

pub fn donor_profile() -> Value {
    json!({"bloodType": "O+", "address": "x", "organsToDonate": ["Kidney"]})
}

/// Read the ledger file as raw JSON, the way an external auditor would.
pub fn read_raw(path: &Path) -> Vec<Value> {
    let text = fs::read_to_string(path).expect("ledger file should exist");
    serde_json::from_str(&text).expect("ledger file should be a JSON array")
}

pub fn write_raw(path: &Path, blocks: &[Value]) {
    fs::write(path, serde_json::to_string_pretty(blocks).unwrap()).expect("rewrite ledger");
}

pub fn flip_hex_char(s: &str, at: usize) -> String {
    s.char_indices()
        .map(|(i, c)| {
            if i == at {
                if c == '0' {
                    '1'
                } else {
                    '0'
                }
            } else {
                c
            }
        })
        .collect()
}

pub fn hashes(blocks: &[Block]) -> Vec<&str> {
    blocks.iter().map(|b| b.hash.as_str()).collect()
}
