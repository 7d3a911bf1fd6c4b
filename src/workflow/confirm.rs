//! Confirmation: poll a submitted transaction until it reaches a terminal status.

use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::chain::client::BlockchainClient;
use crate::chain::types::{ChainError, ChainResult, Identifier, TransactionResult, TransactionStatus};
use crate::observability::metrics;

/// How long to wait for a transaction to seal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealPolicy {
    pub poll_interval: Duration,
    /// `None` polls until the ledger reports a terminal status.
    pub max_polls: Option<u32>,
}

impl Default for SealPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_polls: None,
        }
    }
}

/// Poll `id` until it is sealed.
///
/// An execution error reported at any poll ends the wait with
/// [`ChainError::Execution`]. Transport errors are returned as-is; the poll
/// is a status check and is never retried here.
pub async fn wait_for_seal(
    client: &BlockchainClient,
    id: Identifier,
    policy: &SealPolicy,
    cancel: &CancellationToken,
) -> ChainResult<TransactionResult> {
    let mut ticker = interval(policy.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polls = 0u32;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChainError::Cancelled),
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChainError::Cancelled),
            result = client.get_transaction_result(id) => result?,
        };
        polls += 1;
        metrics::record_seal_poll();

        if let Some(error) = result.error.clone() {
            tracing::info!(tx_id = %id, polls, error = %error, "Transaction execution failed");
            return Err(ChainError::Execution(error));
        }

        match result.status {
            TransactionStatus::Sealed => {
                tracing::debug!(tx_id = %id, polls, "Transaction sealed");
                return Ok(result);
            }
            TransactionStatus::Expired => return Err(ChainError::Expired(id)),
            status => {
                tracing::trace!(tx_id = %id, ?status, polls, "Waiting for seal");
            }
        }

        if policy.max_polls.is_some_and(|max| polls >= max) {
            tracing::warn!(tx_id = %id, polls, "Gave up waiting for seal");
            return Err(ChainError::SealTimeout { polls });
        }
    }
}
