//! Submission: Building → Signed → Submitted.

use serde::Serialize;

use crate::chain::client::BlockchainClient;
use crate::chain::transaction::{Argument, Transaction};
use crate::chain::types::{Address, Block, ChainError, Identifier};
use crate::keys::manager::{Authorizer, KeyManager};
use crate::workflow::WorkflowError;

/// What to run and on whose behalf.
///
/// The service account always proposes and pays.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    pub script: String,
    pub arguments: Vec<Argument>,
    pub authorizers: Vec<Address>,
}

impl TransactionRequest {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            arguments: Vec::new(),
            authorizers: Vec::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<Argument>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_authorizer(mut self, address: Address) -> Self {
        self.authorizers.push(address);
        self
    }
}

/// A transaction the node accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedTransaction {
    pub id: Identifier,
    pub reference_block: Identifier,
    pub reference_height: u64,
    /// Proposal key sequence number the transaction consumed.
    pub sequence_number: u64,
}

/// Build, sign and send `request`.
///
/// Every signing key stays leased until the node answers. The proposer's
/// sequence number is consumed only if the node accepts the transaction.
/// When the send fails in a way that leaves acceptance unknown, or the node
/// refuses it, the proposer is resynced from the ledger before the lease
/// is released.
pub(crate) async fn submit(
    client: &BlockchainClient,
    keys: &KeyManager,
    request: &TransactionRequest,
) -> Result<SubmittedTransaction, WorkflowError> {
    // Building
    let block: Block = client.get_latest_block(true).await?;

    let payer = keys.admin().address;
    let mut signers: Vec<Address> = request.authorizers.clone();
    signers.push(payer);
    let mut leases: Vec<Authorizer> = keys.authorizers(&signers).await?;

    let proposer_at = leases
        .iter()
        .position(|a| a.address() == payer)
        .ok_or_else(|| WorkflowError::MissingSigner(payer))?;
    let proposal_key = leases[proposer_at].proposal_key();

    let mut tx = Transaction::new(request.script.clone())
        .with_arguments(request.arguments.clone())
        .with_reference_block(block.id)
        .with_proposal_key(proposal_key)
        .with_payer(payer);
    for address in &request.authorizers {
        tx = tx.with_authorizer(*address);
    }

    // Signed: everyone but the payer signs the payload, then the payer seals the envelope.
    for lease in leases.iter().filter(|a| a.address() != payer) {
        lease.sign_payload(&mut tx)?;
    }
    let proposer = leases.swap_remove(proposer_at);
    proposer.sign_envelope(&mut tx)?;

    // Submitted
    let id = match client.send_transaction(&tx).await {
        Ok(id) => id,
        Err(e) => {
            if matches!(e, ChainError::Timeout(_) | ChainError::Rpc(_) | ChainError::Rejected(_)) {
                resync(client, proposer).await;
            }
            return Err(e.into());
        }
    };
    let sequence_number = proposal_key.sequence_number;
    if let Err(e) = proposer.commit() {
        tracing::error!(tx_id = %id, sequence_number, error = %e, "Failed to record consumed sequence number");
    }
    drop(leases);

    tracing::info!(
        tx_id = %id,
        reference_height = block.height,
        sequence_number,
        authorizers = request.authorizers.len(),
        "Transaction submitted"
    );

    Ok(SubmittedTransaction {
        id,
        reference_block: block.id,
        reference_height: block.height,
        sequence_number,
    })
}

async fn resync(client: &BlockchainClient, proposer: Authorizer) {
    let local = proposer.proposal_key();
    let on_chain = match client.get_account_key(local.address, local.key_index).await {
        Ok(key) => key.sequence_number,
        Err(e) => {
            tracing::warn!(address = %local.address, key_index = local.key_index, error = %e, "Could not read proposal key from the ledger");
            return;
        }
    };
    if on_chain == local.sequence_number {
        return;
    }
    match proposer.sync_to(on_chain) {
        Ok(stored) => tracing::warn!(
            address = %local.address,
            key_index = local.key_index,
            local = local.sequence_number,
            on_chain,
            stored,
            "Resynced proposal key sequence number"
        ),
        Err(e) => tracing::error!(address = %local.address, error = %e, "Failed to resync proposal key"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::client::ChainClient;
    use crate::chain::emulator::{Emulator, EmulatorConfig};
    use crate::chain::types::{ChainResult, KeyDescriptor, Network, TransactionResult};
    use crate::keys::custody::{LocalCustody, LocalKey, TxSigner};
    use crate::keys::manager::AdminAccount;
    use crate::keys::store::MemoryKeyStore;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum AfterAccept {
        Stall,
        Reset,
    }

    /// Forwards to the ledger, but the first accepted send loses its answer.
    struct LostAck {
        ledger: Arc<Emulator>,
        fault: Mutex<Option<AfterAccept>>,
    }

    #[async_trait]
    impl ChainClient for LostAck {
        async fn get_latest_block(&self, sealed_only: bool) -> ChainResult<Block> {
            self.ledger.get_latest_block(sealed_only).await
        }

        async fn send_transaction(&self, transaction: &Transaction) -> ChainResult<Identifier> {
            let id = self.ledger.send_transaction(transaction).await?;
            let fault = self.fault.lock().unwrap().take();
            match fault {
                Some(AfterAccept::Stall) => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(id)
                }
                Some(AfterAccept::Reset) => Err(ChainError::Rpc("connection reset".to_string())),
                None => Ok(id),
            }
        }

        async fn get_transaction_result(&self, id: Identifier) -> ChainResult<TransactionResult> {
            self.ledger.get_transaction_result(id).await
        }

        async fn get_account_key(&self, address: Address, index: u32) -> ChainResult<KeyDescriptor> {
            self.ledger.get_account_key(address, index).await
        }

        async fn execute_script(&self, code: &str, arguments: &[Argument]) -> ChainResult<Argument> {
            self.ledger.execute_script(code, arguments).await
        }
    }

    fn ledger(admin_key: &LocalKey) -> Arc<Emulator> {
        let mut config = EmulatorConfig::new(Network::Emulator, admin_key.public_key());
        config.polls_per_status = 0;
        Arc::new(Emulator::new(config))
    }

    fn key_manager(admin_key: &LocalKey) -> KeyManager {
        let admin = AdminAccount {
            address: Network::Emulator.service_address(),
            key_index: 0,
        };
        let keys = KeyManager::new(Arc::new(MemoryKeyStore::new()), Arc::new(LocalCustody), admin);
        keys.register_admin_key(admin_key, admin_key.material()).unwrap();
        keys
    }

    fn noop() -> TransactionRequest {
        TransactionRequest::new("transaction { execute {} }")
    }

    async fn lost_ack_after_accept(fault: AfterAccept) {
        let admin_key = LocalKey::random();
        let ledger = ledger(&admin_key);
        let transport = Arc::new(LostAck {
            ledger: ledger.clone(),
            fault: Mutex::new(Some(fault)),
        });
        let client = BlockchainClient::new(transport, Network::Emulator, 1);
        let keys = key_manager(&admin_key);
        let service = keys.admin().address;

        let err = submit(&client, &keys, &noop()).await.unwrap_err();
        match fault {
            AfterAccept::Stall => assert!(matches!(err, WorkflowError::Chain(ChainError::Timeout(1)))),
            AfterAccept::Reset => assert!(matches!(err, WorkflowError::Chain(ChainError::Rpc(_)))),
        }
        assert_eq!(ledger.account_keys(&service).unwrap()[0].sequence_number, 1);

        let second = submit(&client, &keys, &noop()).await.unwrap();
        let third = submit(&client, &keys, &noop()).await.unwrap();
        assert_eq!(second.sequence_number, 1);
        assert_eq!(third.sequence_number, 2);
        assert_eq!(ledger.account_keys(&service).unwrap()[0].sequence_number, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_send_resyncs_sequence() {
        lost_ack_after_accept(AfterAccept::Stall).await;
    }

    #[tokio::test]
    async fn test_reset_after_accept_resyncs_sequence() {
        lost_ack_after_accept(AfterAccept::Reset).await;
    }

    #[tokio::test]
    async fn test_mismatch_rejection_resyncs_sequence() {
        let admin_key = LocalKey::random();
        let ledger = ledger(&admin_key);
        let client = BlockchainClient::new(ledger.clone(), Network::Emulator, 5);

        // Two managers over one ledger, each with its own key records.
        let ours = key_manager(&admin_key);
        let theirs = key_manager(&admin_key);
        submit(&client, &theirs, &noop()).await.unwrap();

        let err = submit(&client, &ours, &noop()).await.unwrap_err();
        assert!(err.to_string().contains("sequence number"));

        let retried = submit(&client, &ours, &noop()).await.unwrap();
        assert_eq!(retried.sequence_number, 1);
    }

    #[tokio::test]
    async fn test_accepted_send_commits_sequence() {
        let admin_key = LocalKey::random();
        let ledger = ledger(&admin_key);
        let client = BlockchainClient::new(ledger.clone(), Network::Emulator, 5);
        let keys = key_manager(&admin_key);

        let first = submit(&client, &keys, &noop()).await.unwrap();
        let second = submit(&client, &keys, &noop()).await.unwrap();
        assert_eq!((first.sequence_number, second.sequence_number), (0, 1));
        assert_ne!(first.id, second.id);
        assert!(ledger.transaction(&second.id).is_some());
    }
}
