//! In-memory record set persisted through a [`Snapshot`].

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::hash::Hash;
use std::io;

use crate::storage::Snapshot;

/// Keyed records owned by one service.
pub struct RecordSet<K, V> {
    records: DashMap<K, V>,
    snapshot: Snapshot,
}

impl<K, V> RecordSet<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Serialize + DeserializeOwned,
{
    /// Load whatever `snapshot` holds, indexing each record by `key`.
    pub fn open(snapshot: Snapshot, key: impl Fn(&V) -> K) -> io::Result<Self> {
        let records = DashMap::new();
        for record in snapshot.load::<V>()? {
            records.insert(key(&record), record);
        }
        Ok(Self { records, snapshot })
    }

    pub fn in_memory() -> Self {
        Self {
            records: DashMap::new(),
            snapshot: Snapshot::in_memory(),
        }
    }

    pub fn insert(&self, key: K, value: V) -> io::Result<()> {
        self.records.insert(key, value);
        if self.snapshot.path().is_some() {
            self.snapshot.write_with(|| self.values())?;
        }
        Ok(())
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.records.get(key).map(|r| r.value().clone())
    }

    pub fn values(&self) -> Vec<V> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
