//! In-process ledger implementing [`ChainClient`].
//!
//! # Behaviour
//! - Every accepted submission seals a new block
//! - Submissions are checked for a known reference block, valid signatures
//!   with full weight per signer, and an exact proposal key sequence number;
//!   acceptance consumes that sequence number even if the transaction expires
//! - Results move Pending → Finalized → Executed → Sealed as they are polled
//! - Execution errors become visible once the transaction reaches Executed
//! - Read-only scripts answer the balance template and literal returns

use alloy::primitives::{keccak256, Signature};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::chain::client::ChainClient;
use crate::chain::script::{self, BALANCE_OF, CREATE_ACCOUNT, TRANSFER_TOKENS};
use crate::chain::transaction::{format_ufix64, Argument, Transaction};
use crate::chain::types::{
    Address, Block, ChainError, ChainResult, Event, Identifier, KeyDescriptor, Network, PublicKey,
    TransactionResult, TransactionStatus, ACCOUNT_CREATED_EVENT, FULL_WEIGHT,
};

/// One token in UFix64 units.
const TOKEN: u64 = 100_000_000;

/// Emulator settings.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    pub network: Network,
    pub service_address: Address,
    pub service_key: PublicKey,
    pub service_key_index: u32,
    /// Initial service account balance in UFix64 units.
    pub service_balance: u64,
    /// Polls spent in each status before advancing (0 = sealed immediately).
    pub polls_per_status: u32,
    /// Blocks after which a reference block is too old.
    pub expiry_window: u64,
}

impl EmulatorConfig {
    pub fn new(network: Network, service_key: PublicKey) -> Self {
        Self {
            network,
            service_address: network.service_address(),
            service_key,
            service_key_index: 0,
            service_balance: 1_000_000_000 * TOKEN,
            polls_per_status: 1,
            expiry_window: 600,
        }
    }
}

struct LedgerAccount {
    balance: u64,
    keys: Vec<KeyDescriptor>,
}

struct Tracked {
    transaction: Transaction,
    error: Option<String>,
    events: Vec<Event>,
    expired: bool,
    polls: u32,
}

struct Ledger {
    blocks: Vec<Identifier>,
    accounts: HashMap<Address, LedgerAccount>,
    next_index: u64,
    transactions: HashMap<Identifier, Tracked>,
}

/// In-process ledger.
pub struct Emulator {
    config: EmulatorConfig,
    ledger: Mutex<Ledger>,
}

impl Emulator {
    pub fn new(config: EmulatorConfig) -> Self {
        let mut accounts = HashMap::new();
        accounts.insert(
            config.service_address,
            LedgerAccount {
                balance: config.service_balance,
                keys: vec![KeyDescriptor {
                    index: config.service_key_index,
                    public_key: config.service_key,
                    weight: FULL_WEIGHT,
                    sequence_number: 0,
                }],
            },
        );

        tracing::info!(
            chain_id = config.network.chain_id(),
            service_address = %config.service_address,
            "Emulator started"
        );

        Self {
            ledger: Mutex::new(Ledger {
                blocks: vec![keccak256(b"genesis")],
                accounts,
                next_index: 2,
                transactions: HashMap::new(),
            }),
            config,
        }
    }

    pub fn service_address(&self) -> Address {
        self.config.service_address
    }

    /// Balance in UFix64 units.
    pub fn balance(&self, address: &Address) -> Option<u64> {
        self.lock().ok()?.accounts.get(address).map(|a| a.balance)
    }

    /// Keys registered on-chain for `address`.
    pub fn account_keys(&self, address: &Address) -> Option<Vec<KeyDescriptor>> {
        self.lock().ok()?.accounts.get(address).map(|a| a.keys.clone())
    }

    /// A submitted transaction as the ledger received it.
    pub fn transaction(&self, id: &Identifier) -> Option<Transaction> {
        self.lock()
            .ok()?
            .transactions
            .get(id)
            .map(|t| t.transaction.clone())
    }

    /// Append empty blocks, ageing every outstanding reference block.
    pub fn advance_blocks(&self, count: u64) -> ChainResult<()> {
        let mut ledger = self.lock()?;
        for _ in 0..count {
            let next = keccak256(ledger.latest().id);
            ledger.blocks.push(next);
        }
        Ok(())
    }

    fn lock(&self) -> ChainResult<MutexGuard<'_, Ledger>> {
        self.ledger
            .lock()
            .map_err(|_| ChainError::Rpc("emulator state poisoned".to_string()))
    }

    fn execute(&self, ledger: &mut Ledger, tx: &Transaction) -> (Option<String>, Vec<Event>) {
        if let Err(e) = script::parse(&tx.script) {
            return (Some(e.to_string()), Vec::new());
        }

        if tx.script == CREATE_ACCOUNT {
            match self.create_account(ledger, &tx.arguments) {
                Ok(address) => (
                    None,
                    vec![Event {
                        event_type: ACCOUNT_CREATED_EVENT.to_string(),
                        payload: serde_json::json!({ "address": address.to_string() }),
                    }],
                ),
                Err(e) => (Some(e), Vec::new()),
            }
        } else if tx.script == TRANSFER_TOKENS {
            match transfer(ledger, tx) {
                Ok(events) => (None, events),
                Err(e) => (Some(e), Vec::new()),
            }
        } else {
            (None, Vec::new())
        }
    }

    fn create_account(&self, ledger: &mut Ledger, arguments: &[Argument]) -> Result<Address, String> {
        let invalid = || "invalid account creation arguments".to_string();
        let public_keys = arguments.first().and_then(Argument::as_array).ok_or_else(invalid)?;
        let weights = arguments.get(1).and_then(Argument::as_array).ok_or_else(invalid)?;
        if public_keys.len() != weights.len() {
            return Err(invalid());
        }

        let mut keys = Vec::with_capacity(public_keys.len());
        for (index, (key, weight)) in public_keys.iter().zip(&weights).enumerate() {
            let public_key: PublicKey = key
                .value
                .as_str()
                .and_then(|s| s.parse().ok())
                .ok_or_else(invalid)?;
            let weight = weight.as_ufix64().ok_or_else(invalid)? / TOKEN;
            keys.push(KeyDescriptor {
                index: index as u32,
                public_key,
                weight: weight as u32,
                sequence_number: 0,
            });
        }

        let address = self.config.network.address_at(ledger.next_index);
        ledger.next_index += 1;
        ledger.accounts.insert(address, LedgerAccount { balance: 0, keys });
        Ok(address)
    }
}

impl Ledger {
    fn latest(&self) -> Block {
        let height = self.blocks.len() as u64 - 1;
        Block {
            id: self.blocks[height as usize],
            height,
        }
    }

    fn verify_signatures(&self, tx: &Transaction) -> ChainResult<()> {
        let payload_hash = tx.payload_hash()?;
        let envelope_hash = tx.envelope_hash()?;

        let mut weights: HashMap<Address, u32> = HashMap::new();
        let mut proposer_signed = false;
        let signatures = tx
            .payload_signatures
            .iter()
            .map(|s| (s, payload_hash))
            .chain(tx.envelope_signatures.iter().map(|s| (s, envelope_hash)));

        for (sig, hash) in signatures {
            let key = self
                .accounts
                .get(&sig.address)
                .and_then(|a| a.keys.iter().find(|k| k.index == sig.key_index))
                .ok_or_else(|| {
                    ChainError::Rejected(format!(
                        "key {} of account {} not found",
                        sig.key_index, sig.address
                    ))
                })?;

            let recovered = Signature::try_from(sig.signature.as_ref())
                .ok()
                .and_then(|s| s.recover_address_from_prehash(&hash).ok());
            if recovered != Some(key.public_key.0) {
                return Err(ChainError::Rejected(format!(
                    "invalid signature for key {} of account {}",
                    sig.key_index, sig.address
                )));
            }

            *weights.entry(sig.address).or_default() += key.weight;
            if sig.address == tx.proposal_key.address && sig.key_index == tx.proposal_key.key_index {
                proposer_signed = true;
            }
        }

        if !tx.envelope_signatures.iter().any(|s| s.address == tx.payer) {
            return Err(ChainError::Rejected("missing payer envelope signature".to_string()));
        }
        if !proposer_signed {
            return Err(ChainError::Rejected("missing proposal key signature".to_string()));
        }
        for signer in tx.signers() {
            if weights.get(&signer).copied().unwrap_or(0) < FULL_WEIGHT {
                return Err(ChainError::Rejected(format!(
                    "insufficient signature weight for account {}",
                    signer
                )));
            }
        }
        Ok(())
    }

    fn proposal_key_mut(&mut self, tx: &Transaction) -> ChainResult<&mut KeyDescriptor> {
        let proposal = tx.proposal_key;
        self.accounts
            .get_mut(&proposal.address)
            .and_then(|a| a.keys.iter_mut().find(|k| k.index == proposal.key_index))
            .ok_or_else(|| {
                ChainError::Rejected(format!(
                    "proposal key {} of account {} not found",
                    proposal.key_index, proposal.address
                ))
            })
    }
}

fn transfer(ledger: &mut Ledger, tx: &Transaction) -> Result<Vec<Event>, String> {
    let amount = tx
        .arguments
        .first()
        .and_then(Argument::as_ufix64)
        .ok_or_else(|| "invalid amount argument".to_string())?;
    let recipient = tx
        .arguments
        .get(1)
        .and_then(Argument::as_address)
        .ok_or_else(|| "invalid recipient argument".to_string())?;
    let sender = *tx
        .authorizers
        .first()
        .ok_or_else(|| "transfer requires an authorizer".to_string())?;

    if !ledger.accounts.contains_key(&recipient) {
        return Err(format!("Could not borrow receiver reference: account {} not found", recipient));
    }
    let source = ledger
        .accounts
        .get_mut(&sender)
        .ok_or_else(|| format!("account {} not found", sender))?;
    if source.balance < amount {
        return Err(format!(
            "Amount withdrawn must be less than or equal than the balance of the Vault: insufficient balance in {}",
            sender
        ));
    }
    source.balance -= amount;
    if let Some(target) = ledger.accounts.get_mut(&recipient) {
        target.balance += amount;
    }

    Ok(vec![
        Event {
            event_type: "FlowToken.TokensWithdrawn".to_string(),
            payload: serde_json::json!({ "amount": amount, "from": sender.to_string() }),
        },
        Event {
            event_type: "FlowToken.TokensDeposited".to_string(),
            payload: serde_json::json!({ "amount": amount, "to": recipient.to_string() }),
        },
    ])
}

fn evaluate(ledger: &Ledger, code: &str, arguments: &[Argument]) -> ChainResult<Argument> {
    script::parse_script(code).map_err(|e| ChainError::Execution(e.to_string()))?;

    if code == BALANCE_OF {
        let account = arguments
            .first()
            .and_then(Argument::as_address)
            .ok_or_else(|| ChainError::Execution("invalid account argument".to_string()))?;
        let balance = ledger.accounts.get(&account).map(|a| a.balance).ok_or_else(|| {
            ChainError::Execution(format!(
                "Could not borrow Balance reference to the Vault: account {} not found",
                account
            ))
        })?;
        return Ok(Argument::ufix64(format_ufix64(balance)));
    }

    return_expression(code)
        .and_then(literal)
        .ok_or_else(|| ChainError::Execution("unsupported script".to_string()))
}

fn return_expression(code: &str) -> Option<&str> {
    let start = code.rfind("return ")? + "return ".len();
    let rest = &code[start..];
    let end = rest.find(['\n', '}']).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn literal(expression: &str) -> Option<Argument> {
    match expression {
        "true" => Some(Argument::bool(true)),
        "false" => Some(Argument::bool(false)),
        quoted if quoted.len() >= 2 && quoted.starts_with('"') && quoted.ends_with('"') => {
            Some(Argument::string(&quoted[1..quoted.len() - 1]))
        }
        number => number.parse().ok().map(Argument::int),
    }
}

#[async_trait]
impl ChainClient for Emulator {
    async fn get_latest_block(&self, _sealed_only: bool) -> ChainResult<Block> {
        // Every block seals on creation.
        Ok(self.lock()?.latest())
    }

    async fn send_transaction(&self, tx: &Transaction) -> ChainResult<Identifier> {
        let id = tx.id()?;
        let mut ledger = self.lock()?;

        if ledger.transactions.contains_key(&id) {
            return Err(ChainError::Rejected(format!("duplicate transaction {}", id)));
        }
        let reference_height = ledger
            .blocks
            .iter()
            .position(|b| *b == tx.reference_block_id)
            .ok_or_else(|| ChainError::Rejected("unknown reference block".to_string()))?
            as u64;
        let expired = ledger.latest().height - reference_height > self.config.expiry_window;

        ledger.verify_signatures(tx)?;

        let key = ledger.proposal_key_mut(tx)?;
        if key.sequence_number != tx.proposal_key.sequence_number {
            return Err(ChainError::Rejected(format!(
                "invalid proposal key: sequence number {} does not match expected {}",
                tx.proposal_key.sequence_number, key.sequence_number
            )));
        }

        key.sequence_number += 1;

        let (error, events) = if expired {
            (None, Vec::new())
        } else {
            self.execute(&mut ledger, tx)
        };

        let mut preimage = ledger.latest().id.to_vec();
        preimage.extend_from_slice(id.as_slice());
        ledger.blocks.push(keccak256(preimage));
        ledger.transactions.insert(
            id,
            Tracked {
                transaction: tx.clone(),
                error,
                events,
                expired,
                polls: 0,
            },
        );

        tracing::debug!(tx_id = %id, expired, "Transaction accepted");
        Ok(id)
    }

    async fn get_transaction_result(&self, id: Identifier) -> ChainResult<TransactionResult> {
        let polls_per_status = self.config.polls_per_status;
        let mut ledger = self.lock()?;
        let tracked = ledger
            .transactions
            .get_mut(&id)
            .ok_or(ChainError::NotFound(id))?;
        tracked.polls += 1;

        if tracked.expired {
            return Ok(TransactionResult {
                status: TransactionStatus::Expired,
                error: None,
                events: Vec::new(),
            });
        }

        let stage = match polls_per_status {
            0 => 3,
            n => tracked.polls / n,
        };
        let status = match stage {
            0 => TransactionStatus::Pending,
            1 => TransactionStatus::Finalized,
            2 => TransactionStatus::Executed,
            _ => TransactionStatus::Sealed,
        };
        let executed = stage >= 2;

        Ok(TransactionResult {
            status,
            error: if executed { tracked.error.clone() } else { None },
            events: if status == TransactionStatus::Sealed {
                tracked.events.clone()
            } else {
                Vec::new()
            },
        })
    }

    async fn get_account_key(&self, address: Address, index: u32) -> ChainResult<KeyDescriptor> {
        self.lock()?
            .accounts
            .get(&address)
            .and_then(|a| a.keys.iter().find(|k| k.index == index).copied())
            .ok_or(ChainError::KeyNotFound { address, index })
    }

    async fn execute_script(&self, code: &str, arguments: &[Argument]) -> ChainResult<Argument> {
        let ledger = self.lock()?;
        evaluate(&ledger, code, arguments)
    }
}
