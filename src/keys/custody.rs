//! Key custody: generation and signing capability.
//!
//! # Security
//! - The service key is loaded from an environment variable
//! - Private keys are never logged
//! - Backends only hand out signers; callers never see raw key bytes

use alloy::primitives::{Bytes, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use std::sync::Arc;

use crate::chain::types::PublicKey;
use crate::keys::types::{KeyError, KeyMaterial, KeyResult};

/// Default environment variable holding the service account private key.
pub const ADMIN_KEY_ENV_VAR: &str = "CUSTODY_ADMIN_PRIVATE_KEY";

/// Something that can sign a transaction digest.
pub trait TxSigner: Send + Sync {
    fn public_key(&self) -> PublicKey;

    /// Sign a 32-byte digest, returning the 65-byte signature.
    fn sign_digest(&self, digest: &B256) -> KeyResult<Bytes>;
}

/// A freshly generated key pair as held by the backend.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub public_key: PublicKey,
    pub material: KeyMaterial,
}

/// Storage backend for private key material: local, encrypted or remote.
#[async_trait]
pub trait KeyCustody: Send + Sync {
    async fn generate(&self) -> KeyResult<GeneratedKey>;

    async fn signer(&self, material: &KeyMaterial) -> KeyResult<Arc<dyn TxSigner>>;
}

/// A secp256k1 key held in process memory.
#[derive(Clone)]
pub struct LocalKey {
    signer: PrivateKeySigner,
}

impl LocalKey {
    /// Create a key from a hex-encoded private key string (with or without 0x).
    pub fn from_private_key(private_key_hex: &str) -> KeyResult<Self> {
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);
        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| KeyError::Custody(format!("Invalid private key format: {}", e)))?;
        Ok(Self { signer })
    }

    /// Load a key from the named environment variable.
    pub fn from_env(var: &str) -> KeyResult<Self> {
        let private_key = std::env::var(var)
            .map_err(|_| KeyError::Custody(format!("Environment variable {} not set", var)))?;
        Self::from_private_key(&private_key)
    }

    pub fn random() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    /// Material reference understood by [`LocalCustody`].
    pub fn material(&self) -> KeyMaterial {
        KeyMaterial::new(self.signer.to_bytes().to_string())
    }
}

impl TxSigner for LocalKey {
    fn public_key(&self) -> PublicKey {
        PublicKey(self.signer.address())
    }

    fn sign_digest(&self, digest: &B256) -> KeyResult<Bytes> {
        let signature = self
            .signer
            .sign_hash_sync(digest)
            .map_err(|e| KeyError::Signing(e.to_string()))?;
        Ok(Bytes::copy_from_slice(&signature.as_bytes()))
    }
}

impl std::fmt::Debug for LocalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKey")
            .field("public_key", &self.signer.address())
            .finish()
    }
}

/// Custody backend keeping private keys alongside the key records.
#[derive(Debug, Default, Clone)]
pub struct LocalCustody;

#[async_trait]
impl KeyCustody for LocalCustody {
    async fn generate(&self) -> KeyResult<GeneratedKey> {
        let key = LocalKey::random();
        Ok(GeneratedKey {
            public_key: key.public_key(),
            material: key.material(),
        })
    }

    async fn signer(&self, material: &KeyMaterial) -> KeyResult<Arc<dyn TxSigner>> {
        Ok(Arc::new(LocalKey::from_private_key(material.expose())?))
    }
}
