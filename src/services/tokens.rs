//! Fungible token transfers between managed accounts and any recipient.

use crate::chain::script::TRANSFER_TOKENS;
use crate::chain::transaction::{parse_ufix64, Argument};
use crate::chain::types::Address;
use crate::services::{ServiceError, ServiceResult};
use crate::workflow::{SealedTransaction, SubmittedTransaction, TransactionRequest, Workflow};

#[derive(Clone)]
pub struct TokenService {
    workflow: Workflow,
}

impl TokenService {
    pub fn new(workflow: Workflow) -> Self {
        Self { workflow }
    }

    /// Submit a transfer of `amount` (a UFix64 literal such as "1.5") from
    /// `sender` to `recipient`. The service account pays the fees.
    pub async fn transfer(
        &self,
        sender: Address,
        recipient: Address,
        amount: &str,
    ) -> ServiceResult<SubmittedTransaction> {
        let request = self.prepare(sender, recipient, amount)?;
        Ok(self.workflow.submit(&request).await?)
    }

    /// Transfer and wait for the seal.
    pub async fn transfer_sync(
        &self,
        sender: Address,
        recipient: Address,
        amount: &str,
    ) -> ServiceResult<SealedTransaction> {
        let submitted = self.transfer(sender, recipient, amount).await?;
        self.confirm(&submitted).await
    }

    pub async fn confirm(&self, submitted: &SubmittedTransaction) -> ServiceResult<SealedTransaction> {
        Ok(self.workflow.confirm(submitted).await?)
    }

    fn prepare(&self, sender: Address, recipient: Address, amount: &str) -> ServiceResult<TransactionRequest> {
        let network = self.workflow.client().network();
        for address in [sender, recipient] {
            if !network.is_valid_address(&address) {
                return Err(ServiceError::Validation(format!("not a valid address for {}", network.chain_id())));
            }
        }
        if parse_ufix64(amount).is_none() {
            return Err(ServiceError::Validation(format!("not a valid amount: {}", amount)));
        }
        if !self.workflow.keys().is_managed(&sender) {
            return Err(ServiceError::NotFound("account not found"));
        }

        Ok(TransactionRequest::new(TRANSFER_TOKENS)
            .with_arguments(vec![Argument::ufix64(amount), Argument::address(recipient)])
            .with_authorizer(sender))
    }
}
