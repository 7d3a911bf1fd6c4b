//! Key management: custody backends, key records and per-key signing leases.

pub mod custody;
pub mod manager;
pub mod store;
pub mod types;

pub use custody::{KeyCustody, LocalCustody, LocalKey, TxSigner, ADMIN_KEY_ENV_VAR};
pub use manager::{AdminAccount, Authorizer, KeyManager};
pub use store::{KeyStore, MemoryKeyStore};
pub use types::{AccountKey, KeyError, KeyMaterial, KeyResult, NewKey};
