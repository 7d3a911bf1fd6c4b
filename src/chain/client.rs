//! Chain client with timeout and error handling.
//!
//! # Responsibilities
//! - Define the narrow interface the core consumes from a ledger node
//! - Bound every call with the configured RPC timeout
//! - Log transport failures without retrying them
//! - Provide a health check for chain connectivity

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::chain::transaction::{Argument, Transaction};
use crate::chain::types::{
    Address, Block, ChainError, ChainResult, Identifier, KeyDescriptor, Network, TransactionResult,
};
use crate::observability::metrics;

/// Transport to a ledger node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Latest block, optionally restricted to sealed blocks.
    async fn get_latest_block(&self, sealed_only: bool) -> ChainResult<Block>;

    /// Submit a signed transaction and return its identifier.
    async fn send_transaction(&self, transaction: &Transaction) -> ChainResult<Identifier>;

    /// Current status of a submitted transaction.
    async fn get_transaction_result(&self, id: Identifier) -> ChainResult<TransactionResult>;

    /// One key of an account as the ledger currently records it.
    async fn get_account_key(&self, address: Address, index: u32) -> ChainResult<KeyDescriptor>;

    /// Run a read-only script against the latest sealed state.
    async fn execute_script(&self, code: &str, arguments: &[Argument]) -> ChainResult<Argument>;
}

/// Chain client wrapper shared by the key manager, workflow and services.
#[derive(Clone)]
pub struct BlockchainClient {
    transport: Arc<dyn ChainClient>,
    network: Network,
    timeout_duration: Duration,
}

impl BlockchainClient {
    /// Create a new client over `transport`.
    pub fn new(transport: Arc<dyn ChainClient>, network: Network, rpc_timeout_secs: u64) -> Self {
        tracing::info!(
            chain_id = network.chain_id(),
            rpc_timeout_secs,
            "Chain client initialized"
        );
        Self {
            transport,
            network,
            timeout_duration: Duration::from_secs(rpc_timeout_secs),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Identifier of the latest block, used as a transaction's reference block.
    pub async fn get_latest_block(&self, sealed_only: bool) -> ChainResult<Block> {
        self.bounded("get_latest_block", self.transport.get_latest_block(sealed_only))
            .await
    }

    pub async fn send_transaction(&self, transaction: &Transaction) -> ChainResult<Identifier> {
        self.bounded("send_transaction", self.transport.send_transaction(transaction))
            .await
    }

    pub async fn get_transaction_result(&self, id: Identifier) -> ChainResult<TransactionResult> {
        self.bounded(
            "get_transaction_result",
            self.transport.get_transaction_result(id),
        )
        .await
    }

    pub async fn get_account_key(&self, address: Address, index: u32) -> ChainResult<KeyDescriptor> {
        self.bounded("get_account_key", self.transport.get_account_key(address, index))
            .await
    }

    pub async fn execute_script(&self, code: &str, arguments: &[Argument]) -> ChainResult<Argument> {
        self.bounded("execute_script", self.transport.execute_script(code, arguments))
            .await
    }

    /// Check if the node is reachable.
    pub async fn is_healthy(&self) -> bool {
        let healthy = self.get_latest_block(true).await.is_ok();
        metrics::record_chain_health(healthy);
        healthy
    }

    async fn bounded<T, F>(&self, call: &'static str, fut: F) -> ChainResult<T>
    where
        F: std::future::Future<Output = ChainResult<T>>,
    {
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if matches!(e, ChainError::Rpc(_)) {
                    tracing::warn!(call, error = %e, "RPC error");
                }
                Err(e)
            }
            Err(_) => {
                tracing::warn!(call, "RPC timeout");
                Err(ChainError::Timeout(self.timeout_duration.as_secs()))
            }
        }
    }
}

impl std::fmt::Debug for BlockchainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainClient")
            .field("chain_id", &self.network.chain_id())
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .finish()
    }
}
