//! Durable storage of key records.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::path::Path;
use uuid::Uuid;

use crate::chain::types::Address;
use crate::keys::types::{AccountKey, KeyError, KeyResult};
use crate::storage::Snapshot;

/// Record storage for managed keys.
pub trait KeyStore: Send + Sync {
    /// Insert or replace a key record. A stored sequence number never moves backwards.
    fn save(&self, key: AccountKey) -> KeyResult<()>;

    fn get(&self, id: Uuid) -> KeyResult<AccountKey>;

    /// Keys bound to `address`, ordered by key index.
    fn keys_for(&self, address: &Address) -> Vec<AccountKey>;

    /// Record that `used` was consumed by an accepted transaction.
    fn advance_sequence(&self, id: Uuid, used: u64) -> KeyResult<AccountKey>;

    /// Raise the stored sequence number to `on_chain` if it is behind.
    fn sync_sequence(&self, id: Uuid, on_chain: u64) -> KeyResult<AccountKey>;
}

/// `DashMap`-backed key store with an optional JSON snapshot file.
#[derive(Default)]
pub struct MemoryKeyStore {
    keys: DashMap<Uuid, AccountKey>,
    snapshot: Snapshot,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by `path`, loading it if present.
    pub fn open(path: impl AsRef<Path>) -> KeyResult<Self> {
        let store = Self {
            keys: DashMap::new(),
            snapshot: Snapshot::at(path),
        };
        for key in store.snapshot.load::<AccountKey>()? {
            store.keys.insert(key.id, key);
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn persist(&self) -> KeyResult<()> {
        if self.snapshot.path().is_none() {
            return Ok(());
        }
        self.snapshot.write_with(|| {
            let mut keys: Vec<AccountKey> = self.keys.iter().map(|r| r.value().clone()).collect();
            keys.sort_by_key(|k| k.created_at);
            keys
        })?;
        Ok(())
    }
}

impl KeyStore for MemoryKeyStore {
    fn save(&self, mut key: AccountKey) -> KeyResult<()> {
        match self.keys.entry(key.id) {
            Entry::Occupied(mut existing) => {
                key.sequence_number = key.sequence_number.max(existing.get().sequence_number);
                existing.insert(key);
            }
            Entry::Vacant(slot) => {
                slot.insert(key);
            }
        }
        self.persist()
    }

    fn get(&self, id: Uuid) -> KeyResult<AccountKey> {
        self.keys
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(KeyError::KeyNotFound(id))
    }

    fn keys_for(&self, address: &Address) -> Vec<AccountKey> {
        let mut keys: Vec<AccountKey> = self
            .keys
            .iter()
            .filter(|r| r.value().address.as_ref() == Some(address))
            .map(|r| r.value().clone())
            .collect();
        keys.sort_by_key(|k| k.index);
        keys
    }

    fn advance_sequence(&self, id: Uuid, used: u64) -> KeyResult<AccountKey> {
        let updated = {
            let mut entry = self.keys.get_mut(&id).ok_or(KeyError::KeyNotFound(id))?;
            if entry.sequence_number != used {
                return Err(KeyError::SequenceConflict {
                    id,
                    used,
                    stored: entry.sequence_number,
                });
            }
            entry.sequence_number += 1;
            entry.updated_at = chrono::Utc::now();
            entry.clone()
        };
        self.persist()?;
        Ok(updated)
    }

    fn sync_sequence(&self, id: Uuid, on_chain: u64) -> KeyResult<AccountKey> {
        let (updated, moved) = {
            let mut entry = self.keys.get_mut(&id).ok_or(KeyError::KeyNotFound(id))?;
            let moved = on_chain > entry.sequence_number;
            if moved {
                entry.sequence_number = on_chain;
                entry.updated_at = chrono::Utc::now();
            }
            (entry.clone(), moved)
        };
        if moved {
            self.persist()?;
        }
        Ok(updated)
    }
}
