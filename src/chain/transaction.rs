//! Signable transaction envelope.
//!
//! # Signing
//! - Proposer and authorizers that are not the payer sign the payload
//! - The payer signs the envelope (payload + payload signatures)
//! - Both messages are prefixed with a fixed domain tag and hashed with
//!   keccak-256 before signing

use alloy::primitives::{keccak256, Bytes, B256};
use serde::{Deserialize, Serialize};

use crate::chain::types::{Address, ChainError, ChainResult, Identifier};

/// Domain separation tag for transaction signatures.
pub const TRANSACTION_DOMAIN_TAG: &[u8] = b"FLOW-V0.0-transaction";

/// Default computation limit.
pub const DEFAULT_GAS_LIMIT: u64 = 9999;

/// Number of decimal places of a UFix64 amount.
const UFIX64_DECIMALS: usize = 8;

/// JSON-Cadence style script argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: serde_json::Value,
}

impl Argument {
    pub fn new(kind: &str, value: serde_json::Value) -> Self {
        Self {
            kind: kind.to_string(),
            value,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new("String", serde_json::Value::String(value.into()))
    }

    pub fn address(address: Address) -> Self {
        Self::new("Address", serde_json::Value::String(address.to_string()))
    }

    pub fn ufix64(value: impl Into<String>) -> Self {
        Self::new("UFix64", serde_json::Value::String(value.into()))
    }

    pub fn int(value: i64) -> Self {
        Self::new("Int", serde_json::Value::String(value.to_string()))
    }

    pub fn bool(value: bool) -> Self {
        Self::new("Bool", serde_json::Value::Bool(value))
    }

    pub fn array(items: Vec<Argument>) -> Self {
        let values = items
            .into_iter()
            .map(|a| serde_json::json!({ "type": a.kind, "value": a.value }))
            .collect();
        Self::new("Array", serde_json::Value::Array(values))
    }

    pub fn as_address(&self) -> Option<Address> {
        (self.kind == "Address")
            .then(|| self.value.as_str())
            .flatten()
            .and_then(|s| s.parse().ok())
    }

    /// Amount in the smallest unit (10^-8).
    pub fn as_ufix64(&self) -> Option<u64> {
        (self.kind == "UFix64")
            .then(|| self.value.as_str())
            .flatten()
            .and_then(parse_ufix64)
    }

    pub fn as_array(&self) -> Option<Vec<Argument>> {
        if self.kind != "Array" {
            return None;
        }
        self.value
            .as_array()?
            .iter()
            .map(|v| serde_json::from_value(v.clone()).ok())
            .collect()
    }
}

/// Parse a decimal UFix64 literal ("1.0", "0.001") into 10^-8 units.
pub fn parse_ufix64(input: &str) -> Option<u64> {
    let (whole, fraction) = match input.split_once('.') {
        Some((w, f)) => (w, f),
        None => (input, ""),
    };
    if whole.is_empty()
        || fraction.len() > UFIX64_DECIMALS
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let whole: u64 = whole.parse().ok()?;
    let padded = format!("{:0<width$}", fraction, width = UFIX64_DECIMALS);
    let fraction: u64 = padded.parse().ok()?;
    whole.checked_mul(100_000_000)?.checked_add(fraction)
}

/// Render 10^-8 units as a UFix64 literal with all eight decimals.
pub fn format_ufix64(units: u64) -> String {
    format!("{}.{:08}", units / 100_000_000, units % 100_000_000)
}

/// The key whose sequence number orders the transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalKey {
    pub address: Address,
    pub key_index: u32,
    pub sequence_number: u64,
}

/// A signature attached to a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSignature {
    pub address: Address,
    pub key_index: u32,
    pub signature: Bytes,
}

/// A ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub script: String,
    pub arguments: Vec<Argument>,
    pub reference_block_id: Identifier,
    pub gas_limit: u64,
    pub proposal_key: ProposalKey,
    pub payer: Address,
    pub authorizers: Vec<Address>,
    pub payload_signatures: Vec<TransactionSignature>,
    pub envelope_signatures: Vec<TransactionSignature>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Payload<'a> {
    script: &'a str,
    arguments: &'a [Argument],
    reference_block_id: &'a Identifier,
    gas_limit: u64,
    proposal_key: &'a ProposalKey,
    payer: &'a Address,
    authorizers: &'a [Address],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    payload: Payload<'a>,
    payload_signatures: &'a [TransactionSignature],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Signed<'a> {
    envelope: Envelope<'a>,
    envelope_signatures: &'a [TransactionSignature],
}

impl Transaction {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            arguments: Vec::new(),
            reference_block_id: Identifier::ZERO,
            gas_limit: DEFAULT_GAS_LIMIT,
            proposal_key: ProposalKey::default(),
            payer: Address::ZERO,
            authorizers: Vec::new(),
            payload_signatures: Vec::new(),
            envelope_signatures: Vec::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<Argument>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_reference_block(mut self, id: Identifier) -> Self {
        self.reference_block_id = id;
        self
    }

    pub fn with_payer(mut self, payer: Address) -> Self {
        self.payer = payer;
        self
    }

    pub fn with_authorizer(mut self, authorizer: Address) -> Self {
        self.authorizers.push(authorizer);
        self
    }

    pub fn with_proposal_key(mut self, key: ProposalKey) -> Self {
        self.proposal_key = key;
        self
    }

    /// Accounts that must sign: proposer, payer, then authorizers, deduplicated.
    pub fn signers(&self) -> Vec<Address> {
        let mut signers = vec![self.proposal_key.address];
        for address in std::iter::once(self.payer).chain(self.authorizers.iter().copied()) {
            if !signers.contains(&address) {
                signers.push(address);
            }
        }
        signers
    }

    fn payload(&self) -> Payload<'_> {
        Payload {
            script: &self.script,
            arguments: &self.arguments,
            reference_block_id: &self.reference_block_id,
            gas_limit: self.gas_limit,
            proposal_key: &self.proposal_key,
            payer: &self.payer,
            authorizers: &self.authorizers,
        }
    }

    fn envelope(&self) -> Envelope<'_> {
        Envelope {
            payload: self.payload(),
            payload_signatures: &self.payload_signatures,
        }
    }

    /// Digest signed by payload signers.
    pub fn payload_hash(&self) -> ChainResult<B256> {
        tagged_hash(&self.payload())
    }

    /// Digest signed by the payer.
    pub fn envelope_hash(&self) -> ChainResult<B256> {
        tagged_hash(&self.envelope())
    }

    /// Transaction identifier, covering every signature.
    pub fn id(&self) -> ChainResult<Identifier> {
        let signed = Signed {
            envelope: self.envelope(),
            envelope_signatures: &self.envelope_signatures,
        };
        let bytes = serde_json::to_vec(&signed).map_err(|e| ChainError::Encoding(e.to_string()))?;
        Ok(keccak256(bytes))
    }

    pub fn add_payload_signature(&mut self, address: Address, key_index: u32, signature: Bytes) {
        self.payload_signatures.push(TransactionSignature {
            address,
            key_index,
            signature,
        });
    }

    pub fn add_envelope_signature(&mut self, address: Address, key_index: u32, signature: Bytes) {
        self.envelope_signatures.push(TransactionSignature {
            address,
            key_index,
            signature,
        });
    }
}

fn tagged_hash<T: Serialize>(value: &T) -> ChainResult<B256> {
    let mut message = TRANSACTION_DOMAIN_TAG.to_vec();
    serde_json::to_writer(&mut message, value).map_err(|e| ChainError::Encoding(e.to_string()))?;
    Ok(keccak256(message))
}
