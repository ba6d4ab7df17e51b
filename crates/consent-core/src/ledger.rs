//! The consent ledger service.
//!
//! `Ledger` owns the only `Chain` for a store and serializes every append
//! behind one lock: reading the tail, hashing, appending and persisting happen
//! as a single critical section, so two writers can never build on the same tail.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::chain::{Chain, ChainStore, CorruptPolicy};
use crate::{profile_hash, timestamp_now, verify, Block, LedgerError, Result, TransactionData, Verification};

/// Listing order for [`Ledger::blocks`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Oldest,
    Newest,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Head {
    pub length: usize,
    pub tip_hash: String,
}

pub struct Ledger<S: ChainStore + ?Sized> {
    store: Arc<S>,
    policy: CorruptPolicy,
    chain: Mutex<Option<Chain<S>>>,
}

impl<S: ChainStore + ?Sized> Ledger<S> {
    /// Create the service. Storage is not touched until first use.
    pub fn new(store: Arc<S>, policy: CorruptPolicy) -> Self {
        Self {
            store,
            policy,
            chain: Mutex::new(None),
        }
    }

    /// Load the chain now instead of on first use. Idempotent; returns the chain length.
    pub fn init(&self) -> Result<usize> {
        self.with_chain(|chain| Ok(chain.len()))
    }

    /// Attest that `user_id` gave (or withdrew) consent for `profile_data`.
    ///
    /// Only a digest of `profile_data` is stored. On a storage failure the chain
    /// is left exactly as it was and the error is returned; nothing is retried.
    pub fn record_consent<P: Serialize + ?Sized>(
        &self,
        user_id: &str,
        consent_given: bool,
        profile_data: &P,
    ) -> Result<Block> {
        let profile_hash = profile_hash(profile_data)?;
        self.with_chain(|chain| {
            let timestamp = timestamp_now();
            let data = TransactionData {
                user_id: user_id.to_string(),
                consent_given,
                profile_hash,
                recorded_at: timestamp.clone(),
            };
            let previous_hash = chain.tail().hash.clone();
            let block = Block::consent(timestamp, data, previous_hash)?;
            match chain.append(block.clone()) {
                Ok(()) => {
                    info!(user_id, index = chain.len() - 1, hash = %block.hash, "consent recorded");
                    Ok(block)
                }
                Err(e) => {
                    error!(user_id, error = %e, "failed to persist consent block, rolled back");
                    Err(e)
                }
            }
        })
    }

    /// Snapshot of every block in the requested order.
    pub fn blocks(&self, order: Order) -> Result<Vec<Block>> {
        self.with_chain(|chain| {
            let mut blocks = chain.blocks().to_vec();
            if order == Order::Newest {
                blocks.reverse();
            }
            Ok(blocks)
        })
    }

    pub fn head(&self) -> Result<Head> {
        self.with_chain(|chain| {
            Ok(Head {
                length: chain.len(),
                tip_hash: chain.tail().hash.clone(),
            })
        })
    }

    /// Verify the chain as it is held in memory; runs under the writer lock, so
    /// it never observes a half-finished append.
    pub fn verify(&self) -> Result<Verification> {
        self.with_chain(|chain| Ok(verify(chain.blocks())))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Chain<S>>>> {
        self.chain.lock().map_err(|_| LedgerError::Poisoned)
    }

    fn with_chain<R>(&self, f: impl FnOnce(&mut Chain<S>) -> Result<R>) -> Result<R> {
        let mut guard = self.lock()?;
        let chain = match &mut *guard {
            Some(chain) => chain,
            slot => slot.insert(Chain::load(self.store.clone(), self.policy)?),
        };
        f(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::tests::TestStore;
    use crate::{BlockData, InvalidReason, StorageError, Violation};
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::thread;

    fn ledger() -> (Arc<TestStore>, Ledger<TestStore>) {
        let store = Arc::new(TestStore::default());
        (store.clone(), Ledger::new(store, CorruptPolicy::Fail))
    }

    fn profile() -> serde_json::Value {
        json!({"bloodType": "O+", "address": "x", "organsToDonate": ["Kidney"]})
    }

    #[test]
    fn storage_is_loaded_lazily() -> anyhow::Result<()> {
        let (store, ledger) = ledger();
        assert!(store.snapshot().is_none());
        assert_eq!(ledger.init()?, 1);
        assert_eq!(ledger.init()?, 1);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn fresh_ledger_is_valid() -> anyhow::Result<()> {
        let (_store, ledger) = ledger();
        assert_eq!(ledger.head()?.length, 1);
        assert_eq!(ledger.verify()?, Verification::Valid);
        Ok(())
    }

    #[test]
    fn two_records_link_in_order() -> anyhow::Result<()> {
        let (store, ledger) = ledger();
        let first = ledger.record_consent("u1", true, &profile())?;
        let second = ledger.record_consent("u1", true, &profile())?;

        let blocks = ledger.blocks(Order::Oldest)?;
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1], first);
        assert_eq!(blocks[2], second);
        assert_eq!(blocks[1].previous_hash, blocks[0].hash);
        assert_eq!(blocks[2].previous_hash, blocks[1].hash);
        assert_eq!(ledger.verify()?, Verification::Valid);
        assert_eq!(store.snapshot().unwrap(), blocks);
        Ok(())
    }

    #[test]
    fn recorded_at_equals_block_timestamp() -> anyhow::Result<()> {
        let (_store, ledger) = ledger();
        let block = ledger.record_consent("u7", false, &profile())?;
        let data = block.data.as_consent().unwrap();
        assert_eq!(data.recorded_at, block.timestamp);
        assert_eq!(data.user_id, "u7");
        assert!(!data.consent_given);
        Ok(())
    }

    #[test]
    fn earlier_blocks_never_change() -> anyhow::Result<()> {
        let (_store, ledger) = ledger();
        let mut seen: Vec<Block> = ledger.blocks(Order::Oldest)?;
        for i in 0..10 {
            let block = ledger.record_consent(&format!("user-{i}"), i % 3 != 0, &json!({"i": i}))?;
            seen.push(block);
            let now = ledger.blocks(Order::Oldest)?;
            assert_eq!(now.len(), i + 2);
            assert_eq!(now, seen);
        }
        assert_eq!(ledger.verify()?, Verification::Valid);
        Ok(())
    }

    #[test]
    fn persist_failure_leaves_chain_unchanged() -> anyhow::Result<()> {
        let (store, ledger) = ledger();
        ledger.record_consent("u1", true, &profile())?;
        let before = ledger.blocks(Order::Oldest)?;

        store.fail_writes.store(true, Ordering::SeqCst);
        let err = ledger.record_consent("u2", true, &profile()).unwrap_err();
        assert!(matches!(err, LedgerError::Storage(StorageError::Unavailable { .. })));
        assert_eq!(ledger.blocks(Order::Oldest)?, before);

        store.fail_writes.store(false, Ordering::SeqCst);
        let retried = ledger.record_consent("u2", true, &profile())?;
        assert_eq!(retried.previous_hash, before[1].hash);
        assert_eq!(ledger.verify()?, Verification::Valid);
        Ok(())
    }

    #[test]
    fn serialization_failure_appends_nothing() -> anyhow::Result<()> {
        let (_store, ledger) = ledger();
        let mut bad = std::collections::BTreeMap::new();
        bad.insert(vec![1u8], 1u8);
        let err = ledger.record_consent("u1", true, &bad).unwrap_err();
        assert!(matches!(err, LedgerError::Serialization(_)));
        assert_eq!(ledger.head()?.length, 1);
        Ok(())
    }

    #[test]
    fn profile_fields_are_never_stored() -> anyhow::Result<()> {
        let (store, ledger) = ledger();
        let secret = json!({
            "bloodType": "AB-",
            "address": "221B Baker Street",
            "organsToDonate": ["Pancreas", "Cornea"]
        });
        let a = ledger.record_consent("u1", true, &secret)?;
        let b = ledger.record_consent("u1", true, &secret)?;
        assert_eq!(
            a.data.as_consent().unwrap().profile_hash,
            b.data.as_consent().unwrap().profile_hash
        );

        let persisted = serde_json::to_string(&store.snapshot().unwrap())?;
        for raw in ["AB-", "221B Baker Street", "Pancreas", "Cornea", "bloodType", "address"] {
            assert!(!persisted.contains(raw), "{raw} leaked into storage");
        }
        Ok(())
    }

    #[test]
    fn newest_order_reverses_listing() -> anyhow::Result<()> {
        let (_store, ledger) = ledger();
        ledger.record_consent("u1", true, &profile())?;
        ledger.record_consent("u2", true, &profile())?;
        let oldest = ledger.blocks(Order::Oldest)?;
        let mut newest = ledger.blocks(Order::Newest)?;
        newest.reverse();
        assert_eq!(oldest, newest);
        assert!(matches!(ledger.blocks(Order::Newest)?[2].data, BlockData::Origin(_)));
        Ok(())
    }

    #[test]
    fn concurrent_writers_never_fork() -> anyhow::Result<()> {
        let (store, ledger) = ledger();
        let ledger = Arc::new(ledger);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for i in 0..25 {
                        ledger
                            .record_consent(&format!("user-{t}-{i}"), true, &json!({"t": t, "i": i}))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let blocks = ledger.blocks(Order::Oldest)?;
        assert_eq!(blocks.len(), 8 * 25 + 1);
        assert_eq!(ledger.verify()?, Verification::Valid);
        let mut parents: Vec<&str> = blocks.iter().skip(1).map(|b| b.previous_hash.as_str()).collect();
        parents.sort_unstable();
        parents.dedup();
        assert_eq!(parents.len(), 8 * 25);
        assert_eq!(store.snapshot().unwrap(), blocks);
        Ok(())
    }

    #[test]
    fn verify_reports_tampered_storage_after_reload() -> anyhow::Result<()> {
        let (store, ledger) = ledger();
        ledger.record_consent("u1", true, &profile())?;
        ledger.record_consent("u2", true, &profile())?;
        drop(ledger);

        {
            let mut persisted = store.persisted.lock().unwrap();
            let blocks = persisted.as_mut().unwrap();
            if let BlockData::Consent(d) = &mut blocks[1].data {
                d.consent_given = false;
            }
        }
        let reloaded = Ledger::new(store, CorruptPolicy::Fail);
        assert_eq!(
            reloaded.verify()?,
            Verification::Invalid(Violation {
                index: 1,
                reason: InvalidReason::HashMismatch
            })
        );
        Ok(())
    }
}
