//! Transaction workflow: the body run inline for synchronous calls or by a
//! worker for jobs.
//!
//! # Data Flow
//! ```text
//! TransactionRequest
//!     → submit.rs (reference block, leases, signatures, send, commit)
//!     → confirm.rs (poll until Sealed / Expired / execution error)
//!     → SealedTransaction
//! ```

pub mod confirm;
pub mod submit;

use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::chain::client::BlockchainClient;
use crate::chain::types::{Address, ChainError, Identifier, TransactionResult};
use crate::keys::manager::KeyManager;
use crate::keys::types::KeyError;
use crate::observability::metrics;

pub use confirm::{wait_for_seal, SealPolicy};
pub use submit::{SubmittedTransaction, TransactionRequest};

/// Errors that abort a workflow run.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Keys(#[from] KeyError),

    #[error("no signing key for {0}")]
    MissingSigner(Address),

    #[error("transaction {0} sealed without the expected {1} event")]
    MissingEvent(Identifier, &'static str),
}

/// Result type for workflow runs.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// A transaction that reached the sealed status without an execution error.
#[derive(Debug, Clone, PartialEq)]
pub struct SealedTransaction {
    pub id: Identifier,
    pub reference_block: Identifier,
    pub result: TransactionResult,
}

/// Submits and confirms transactions with the service account as payer.
#[derive(Clone)]
pub struct Workflow {
    client: BlockchainClient,
    keys: Arc<KeyManager>,
    policy: SealPolicy,
    cancel: CancellationToken,
}

impl Workflow {
    pub fn new(client: BlockchainClient, keys: Arc<KeyManager>, policy: SealPolicy) -> Self {
        Self {
            client,
            keys,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort confirmation waits when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn client(&self) -> &BlockchainClient {
        &self.client
    }

    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    pub async fn submit(&self, request: &TransactionRequest) -> WorkflowResult<SubmittedTransaction> {
        submit::submit(&self.client, &self.keys, request)
            .await
            .inspect_err(|e| {
                metrics::record_transaction("rejected");
                tracing::warn!(error = %e, "Transaction submission failed");
            })
    }

    pub async fn confirm(&self, submitted: &SubmittedTransaction) -> WorkflowResult<SealedTransaction> {
        match wait_for_seal(&self.client, submitted.id, &self.policy, &self.cancel).await {
            Ok(result) => {
                metrics::record_transaction("sealed");
                Ok(SealedTransaction {
                    id: submitted.id,
                    reference_block: submitted.reference_block,
                    result,
                })
            }
            Err(e) => {
                let outcome = match e {
                    ChainError::Execution(_) => "failed",
                    ChainError::Expired(_) => "expired",
                    _ => "error",
                };
                metrics::record_transaction(outcome);
                Err(e.into())
            }
        }
    }

    /// Submit then confirm.
    pub async fn execute(&self, request: &TransactionRequest) -> WorkflowResult<SealedTransaction> {
        let submitted = self.submit(request).await?;
        self.confirm(&submitted).await
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("client", &self.client)
            .field("policy", &self.policy)
            .finish()
    }
}
