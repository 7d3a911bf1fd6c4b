//! Key records and error definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::chain::types::{Address, KeyDescriptor, PublicKey};

/// Opaque reference to private key material, interpreted only by the
/// custody backend that produced it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMaterial(String);

impl KeyMaterial {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMaterial(<redacted>)")
    }
}

/// A managed signing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountKey {
    pub id: Uuid,
    /// Owning account; unset until the ledger assigns the address.
    pub address: Option<Address>,
    pub index: u32,
    pub weight: u32,
    pub public_key: PublicKey,
    pub material: KeyMaterial,
    pub sequence_number: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountKey {
    pub fn new(index: u32, weight: u32, public_key: PublicKey, material: KeyMaterial) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            address: None,
            index,
            weight,
            public_key,
            material,
            sequence_number: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bind the key to the account the ledger created for it.
    pub fn bind(mut self, address: Address) -> Self {
        self.address = Some(address);
        self.updated_at = Utc::now();
        self
    }

    /// Ledger-facing view of the key.
    pub fn descriptor(&self) -> KeyDescriptor {
        KeyDescriptor {
            index: self.index,
            public_key: self.public_key,
            weight: self.weight,
            sequence_number: self.sequence_number,
        }
    }
}

/// Output of key generation.
#[derive(Debug, Clone)]
pub struct NewKey {
    /// What goes into the account creation transaction.
    pub descriptor: KeyDescriptor,
    /// What gets persisted.
    pub record: AccountKey,
}

/// Errors that can occur in the key subsystem.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("account not found")]
    AccountNotFound(Address),

    #[error("key {0} not found")]
    KeyNotFound(Uuid),

    #[error("Custody error: {0}")]
    Custody(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    /// The stored sequence number moved under a lease holder.
    #[error("Sequence conflict on key {id}: used {used}, stored {stored}")]
    SequenceConflict { id: Uuid, used: u64, stored: u64 },

    #[error("Key store persistence failed: {0}")]
    Persistence(#[from] std::io::Error),
}

/// Result type for key operations.
pub type KeyResult<T> = Result<T, KeyError>;
