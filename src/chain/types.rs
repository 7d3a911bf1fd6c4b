//! Ledger-facing types and error definitions.

use alloy::primitives::{keccak256, B256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Block and transaction identifier.
pub type Identifier = B256;

/// Weight a set of signatures must reach for an account to count as signed.
pub const FULL_WEIGHT: u32 = 1000;

/// Target ledger network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Emulator,
    Testnet,
    Mainnet,
}

impl Network {
    /// Chain identifier string used in logs and the address check byte.
    pub fn chain_id(&self) -> &'static str {
        match self {
            Network::Emulator => "flow-emulator",
            Network::Testnet => "flow-testnet",
            Network::Mainnet => "flow-mainnet",
        }
    }

    /// Address the ledger assigns to the account created at `index`.
    pub fn address_at(&self, index: u64) -> Address {
        Address::from_u64((index << 8) | u64::from(self.check_byte(index)))
    }

    /// The network's service account (first generated address).
    pub fn service_address(&self) -> Address {
        self.address_at(1)
    }

    /// Whether `address` could have been generated on this network.
    pub fn is_valid_address(&self, address: &Address) -> bool {
        let raw = address.to_u64();
        let index = raw >> 8;
        index != 0 && (raw & 0xff) as u8 == self.check_byte(index)
    }

    /// Parse and validate an address for this network.
    pub fn parse_address(&self, input: &str) -> Result<Address, AddressError> {
        let address: Address = input.parse()?;
        if !self.is_valid_address(&address) {
            return Err(AddressError::WrongNetwork(self.chain_id()));
        }
        Ok(address)
    }

    fn check_byte(&self, index: u64) -> u8 {
        let mut preimage = Vec::with_capacity(32);
        preimage.extend_from_slice(self.chain_id().as_bytes());
        preimage.extend_from_slice(&index.to_be_bytes());
        keccak256(&preimage)[0]
    }
}

/// Errors raised while parsing an address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("not a valid address")]
    Malformed,

    #[error("not a valid address for {0}")]
    WrongNetwork(&'static str),
}

/// An 8-byte ledger account address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 8]);

impl Address {
    pub const ZERO: Address = Address([0; 8]);

    pub fn from_u64(value: u64) -> Self {
        Self(value.to_be_bytes())
    }

    pub fn to_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Lowercase hex without the `0x` prefix.
    pub fn hex(&self) -> String {
        format!("{:016x}", self.to_u64())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.hex())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 16 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AddressError::Malformed);
        }
        u64::from_str_radix(digits, 16)
            .map(Address::from_u64)
            .map_err(|_| AddressError::Malformed)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Public half of a secp256k1 key, carried as the 20-byte keccak
/// fingerprint that signature recovery yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub alloy::primitives::Address);

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PublicKey {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(PublicKey).map_err(|_| AddressError::Malformed)
    }
}

/// A key as the ledger knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDescriptor {
    pub index: u32,
    pub public_key: PublicKey,
    pub weight: u32,
    pub sequence_number: u64,
}

/// A block reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub id: Identifier,
    pub height: u64,
}

/// Transaction status as reported by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Unknown,
    Pending,
    Finalized,
    Executed,
    Sealed,
    Expired,
}

/// Event emitted by an executed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
}

/// Event type emitted on account creation.
pub const ACCOUNT_CREATED_EVENT: &str = "flow.AccountCreated";

/// Result of a transaction status poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub status: TransactionStatus,
    pub error: Option<String>,
    pub events: Vec<Event>,
}

impl TransactionResult {
    /// Address carried by the first `flow.AccountCreated` event, if any.
    pub fn created_address(&self) -> Option<Address> {
        self.events
            .iter()
            .find(|e| e.event_type == ACCOUNT_CREATED_EVENT)
            .and_then(|e| e.payload.get("address"))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }
}

/// Errors that can occur during chain operations.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// The node refused the submission.
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// The ledger accepted the transaction but execution failed.
    #[error("Transaction execution failed: {0}")]
    Execution(String),

    /// The reference block fell out of the validity window.
    #[error("Transaction {0} expired")]
    Expired(Identifier),

    /// Seal polling gave up.
    #[error("Transaction not sealed after {polls} polls")]
    SealTimeout { polls: u32 },

    /// The wait was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Transaction {0} not found")]
    NotFound(Identifier),

    #[error("Key {index} of account {address} not found")]
    KeyNotFound { address: Address, index: u32 },

    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
