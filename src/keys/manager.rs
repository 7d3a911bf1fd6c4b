//! Key manager: provisions signing capability under per-key serialization.
//!
//! The ledger rejects a proposal key whose sequence number is not exactly
//! the on-chain value, so two signers must never race on one key. Every
//! [`Authorizer`] holds the key's lease for as long as it lives; the
//! sequence number is re-read after the lease is taken and only advanced
//! through [`Authorizer::commit`].

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::chain::transaction::{ProposalKey, Transaction};
use crate::chain::types::{Address, KeyDescriptor, FULL_WEIGHT};
use crate::keys::custody::{KeyCustody, TxSigner};
use crate::keys::store::KeyStore;
use crate::keys::types::{AccountKey, KeyError, KeyMaterial, KeyResult, NewKey};

/// The administrative account that funds new accounts and pays fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminAccount {
    pub address: Address,
    pub key_index: u32,
}

/// Produces [`Authorizer`]s for the service account and managed accounts.
pub struct KeyManager {
    store: Arc<dyn KeyStore>,
    custody: Arc<dyn KeyCustody>,
    admin: AdminAccount,
    leases: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl KeyManager {
    pub fn new(store: Arc<dyn KeyStore>, custody: Arc<dyn KeyCustody>, admin: AdminAccount) -> Self {
        Self {
            store,
            custody,
            admin,
            leases: DashMap::new(),
        }
    }

    pub fn admin(&self) -> AdminAccount {
        self.admin
    }

    /// Create and persist a key not yet bound to an account.
    pub async fn generate(&self, index: u32, weight: u32) -> KeyResult<NewKey> {
        let generated = self.custody.generate().await?;
        let record = AccountKey::new(index, weight, generated.public_key, generated.material);
        self.store.save(record.clone())?;
        tracing::debug!(key_id = %record.id, index, weight, "Generated account key");
        Ok(NewKey {
            descriptor: record.descriptor(),
            record,
        })
    }

    /// Register the service account key if it is not stored yet.
    pub fn register_admin_key(&self, signer: &dyn TxSigner, material: KeyMaterial) -> KeyResult<()> {
        let existing = self
            .store
            .keys_for(&self.admin.address)
            .into_iter()
            .find(|k| k.index == self.admin.key_index);
        if let Some(key) = existing {
            if key.public_key != signer.public_key() {
                return Err(KeyError::Custody(format!(
                    "stored key {} of {} does not match the configured admin key",
                    key.index, self.admin.address
                )));
            }
            return Ok(());
        }

        let record = AccountKey::new(self.admin.key_index, FULL_WEIGHT, signer.public_key(), material)
            .bind(self.admin.address);
        tracing::info!(address = %self.admin.address, key_index = self.admin.key_index, "Registered admin key");
        self.store.save(record)
    }

    /// Persist an already constructed key record.
    pub fn save(&self, key: AccountKey) -> KeyResult<()> {
        self.store.save(key)
    }

    /// Whether signing on behalf of `address` is possible.
    pub fn is_managed(&self, address: &Address) -> bool {
        *address == self.admin.address || !self.store.keys_for(address).is_empty()
    }

    /// Lease the service account key.
    pub async fn service_authorizer(&self) -> KeyResult<Authorizer> {
        let key = self
            .store
            .keys_for(&self.admin.address)
            .into_iter()
            .find(|k| k.index == self.admin.key_index)
            .ok_or(KeyError::AccountNotFound(self.admin.address))?;
        self.lease(self.admin.address, key.id).await
    }

    /// Lease the signing key of a managed account.
    pub async fn account_authorizer(&self, address: Address) -> KeyResult<Authorizer> {
        if address == self.admin.address {
            return self.service_authorizer().await;
        }
        let key = self
            .store
            .keys_for(&address)
            .into_iter()
            .max_by_key(|k| (k.weight, std::cmp::Reverse(k.index)))
            .ok_or(KeyError::AccountNotFound(address))?;
        self.lease(address, key.id).await
    }

    /// Lease one key per distinct address.
    ///
    /// Leases are taken in address order so concurrent callers asking for
    /// overlapping sets cannot deadlock.
    pub async fn authorizers(&self, addresses: &[Address]) -> KeyResult<Vec<Authorizer>> {
        let mut ordered = addresses.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut leased = Vec::with_capacity(ordered.len());
        for address in ordered {
            leased.push(self.account_authorizer(address).await?);
        }
        Ok(leased)
    }

    async fn lease(&self, address: Address, id: Uuid) -> KeyResult<Authorizer> {
        let lock = self.leases.entry(id).or_default().clone();
        let guard = lock.lock_owned().await;

        // Re-read under the lease: the previous holder may have advanced it.
        let key = self.store.get(id)?;
        let signer = self.custody.signer(&key.material).await?;
        tracing::trace!(key_id = %id, address = %address, sequence_number = key.sequence_number, "Key leased");

        Ok(Authorizer {
            address,
            key,
            signer,
            store: self.store.clone(),
            _lease: guard,
        })
    }
}

/// Exclusive, short-lived signing capability over one managed key.
pub struct Authorizer {
    address: Address,
    key: AccountKey,
    signer: Arc<dyn TxSigner>,
    store: Arc<dyn KeyStore>,
    _lease: OwnedMutexGuard<()>,
}

impl Authorizer {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn descriptor(&self) -> KeyDescriptor {
        self.key.descriptor()
    }

    /// Proposal key carrying the current sequence number.
    pub fn proposal_key(&self) -> ProposalKey {
        ProposalKey {
            address: self.address,
            key_index: self.key.index,
            sequence_number: self.key.sequence_number,
        }
    }

    pub fn sign_payload(&self, tx: &mut Transaction) -> KeyResult<()> {
        let hash = tx.payload_hash().map_err(|e| KeyError::Signing(e.to_string()))?;
        let signature = self.signer.sign_digest(&hash)?;
        tx.add_payload_signature(self.address, self.key.index, signature);
        Ok(())
    }

    pub fn sign_envelope(&self, tx: &mut Transaction) -> KeyResult<()> {
        let hash = tx.envelope_hash().map_err(|e| KeyError::Signing(e.to_string()))?;
        let signature = self.signer.sign_digest(&hash)?;
        tx.add_envelope_signature(self.address, self.key.index, signature);
        Ok(())
    }

    /// Consume the proposal sequence number and release the lease.
    pub fn commit(self) -> KeyResult<u64> {
        let used = self.key.sequence_number;
        self.store.advance_sequence(self.key.id, used)?;
        Ok(used)
    }

    /// Catch the stored sequence number up with `on_chain` and release the
    /// lease. Returns the sequence number now stored.
    pub fn sync_to(self, on_chain: u64) -> KeyResult<u64> {
        Ok(self.store.sync_sequence(self.key.id, on_chain)?.sequence_number)
    }
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("address", &self.address)
            .field("key_index", &self.key.index)
            .field("sequence_number", &self.key.sequence_number)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::Network;
    use crate::keys::custody::{LocalCustody, LocalKey};
    use crate::keys::store::MemoryKeyStore;
    use std::time::Duration;

    fn manager() -> (KeyManager, Arc<MemoryKeyStore>) {
        let store = Arc::new(MemoryKeyStore::new());
        let admin_key = LocalKey::random();
        let admin = AdminAccount {
            address: Network::Emulator.service_address(),
            key_index: 0,
        };
        let manager = KeyManager::new(store.clone(), Arc::new(LocalCustody), admin);
        manager
            .register_admin_key(&admin_key, admin_key.material())
            .unwrap();
        (manager, store)
    }

    #[tokio::test]
    async fn test_register_admin_key_is_idempotent() {
        let (manager, store) = manager();
        let admin = manager.admin().address;
        let stored = store.keys_for(&admin);
        assert_eq!(stored.len(), 1);

        let other = LocalKey::random();
        assert!(matches!(
            manager.register_admin_key(&other, other.material()),
            Err(KeyError::Custody(_))
        ));
        assert_eq!(store.keys_for(&admin).len(), 1);
    }

    #[tokio::test]
    async fn test_generate_persists_unbound_key() {
        let (manager, store) = manager();
        let new_key = manager.generate(0, FULL_WEIGHT).await.unwrap();
        assert_eq!(new_key.descriptor.weight, FULL_WEIGHT);
        assert!(store.get(new_key.record.id).unwrap().address.is_none());
    }

    #[tokio::test]
    async fn test_unknown_account_not_found() {
        let (manager, _) = manager();
        let unknown = Network::Emulator.address_at(42);
        assert!(!manager.is_managed(&unknown));
        let err = manager.account_authorizer(unknown).await.unwrap_err();
        assert!(matches!(err, KeyError::AccountNotFound(a) if a == unknown));
    }

    #[tokio::test]
    async fn test_commit_advances_sequence() {
        let (manager, _) = manager();
        let first = manager.service_authorizer().await.unwrap();
        assert_eq!(first.proposal_key().sequence_number, 0);
        assert_eq!(first.commit().unwrap(), 0);

        let second = manager.service_authorizer().await.unwrap();
        assert_eq!(second.proposal_key().sequence_number, 1);
        drop(second);

        // Dropped without commit: nothing consumed.
        let third = manager.service_authorizer().await.unwrap();
        assert_eq!(third.proposal_key().sequence_number, 1);
    }

    #[tokio::test]
    async fn test_sync_to_catches_up_with_ledger() {
        let (manager, _) = manager();
        let behind = manager.service_authorizer().await.unwrap();
        assert_eq!(behind.sync_to(3).unwrap(), 3);

        let next = manager.service_authorizer().await.unwrap();
        assert_eq!(next.proposal_key().sequence_number, 3);
        assert_eq!(next.sync_to(1).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_lease_is_exclusive() {
        let (manager, _) = manager();
        let manager = Arc::new(manager);
        let held = manager.service_authorizer().await.unwrap();

        let contender = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.service_authorizer().await.map(|a| a.proposal_key()) })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        held.commit().unwrap();
        let key = contender.await.unwrap().unwrap();
        assert_eq!(key.sequence_number, 1);
    }

    #[tokio::test]
    async fn test_concurrent_leases_get_distinct_sequence_numbers() {
        let (manager, _) = manager();
        let manager = Arc::new(manager);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                let authorizer = manager.service_authorizer().await.unwrap();
                tokio::task::yield_now().await;
                authorizer.commit().unwrap()
            }));
        }

        let mut used = Vec::new();
        for handle in handles {
            used.push(handle.await.unwrap());
        }
        used.sort();
        assert_eq!(used, (0..16).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_authorizers_deduplicated_and_ordered() {
        let (manager, _) = manager();
        let admin = manager.admin().address;
        let user_key = manager.generate(0, FULL_WEIGHT).await.unwrap();
        let user = Network::Emulator.address_at(2);
        manager.save(user_key.record.bind(user)).unwrap();

        let leased = manager.authorizers(&[user, admin, user]).await.unwrap();
        let addresses: Vec<Address> = leased.iter().map(|a| a.address()).collect();
        let mut expected = vec![admin, user];
        expected.sort();
        assert_eq!(addresses, expected);
    }

    #[tokio::test]
    async fn test_signatures_attached() {
        let (manager, _) = manager();
        let authorizer = manager.service_authorizer().await.unwrap();
        let mut tx = Transaction::new("transaction {}").with_payer(authorizer.address());
        authorizer.sign_payload(&mut tx).unwrap();
        authorizer.sign_envelope(&mut tx).unwrap();
        assert_eq!(tx.payload_signatures.len(), 1);
        assert_eq!(tx.envelope_signatures.len(), 1);
        assert_eq!(tx.envelope_signatures[0].signature.len(), 65);
    }
}
