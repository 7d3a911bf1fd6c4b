//! Account creation and lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::chain::script::CREATE_ACCOUNT;
use crate::chain::transaction::Argument;
use crate::chain::types::{Address, ACCOUNT_CREATED_EVENT};
use crate::jobs::{Job, JobType, WorkerPool};
use crate::services::records::RecordSet;
use crate::services::{parse_address, ServiceError, ServiceResult};
use crate::workflow::{TransactionRequest, Workflow, WorkflowError};

/// A managed account. Key records stay inside the key subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: Address,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    fn new(address: Address) -> Self {
        let now = Utc::now();
        Self {
            address,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Creates accounts on the ledger and keeps their records.
#[derive(Clone)]
pub struct AccountService {
    workflow: Workflow,
    pool: WorkerPool,
    accounts: Arc<RecordSet<Address, Account>>,
    key_weight: u32,
}

impl AccountService {
    pub fn new(
        workflow: Workflow,
        pool: WorkerPool,
        accounts: Arc<RecordSet<Address, Account>>,
        key_weight: u32,
    ) -> Self {
        Self {
            workflow,
            pool,
            accounts,
            key_weight,
        }
    }

    /// Create an account and wait until the ledger seals it.
    pub async fn create_sync(&self) -> ServiceResult<Account> {
        create_account(&self.workflow, &self.accounts, self.key_weight).await
    }

    /// Queue account creation. The job result is the new address.
    pub fn create_async(&self) -> ServiceResult<Job> {
        let workflow = self.workflow.clone();
        let accounts = self.accounts.clone();
        let key_weight = self.key_weight;
        let job = self.pool.submit(JobType::CreateAccount, async move {
            create_account(&workflow, &accounts, key_weight)
                .await
                .map(|account| account.address.to_string())
        })?;
        Ok(job)
    }

    pub fn details(&self, address: &str) -> ServiceResult<Account> {
        let address = parse_address(self.workflow.client().network(), address)?;
        self.accounts
            .get(&address)
            .ok_or(ServiceError::NotFound("account not found"))
    }

    /// All accounts, oldest first.
    pub fn list(&self) -> Vec<Account> {
        let mut accounts = self.accounts.values();
        accounts.sort_by_key(|a| a.created_at);
        accounts
    }

    /// Whether `address` is an account this service created.
    pub fn exists(&self, address: &Address) -> bool {
        self.accounts.get(address).is_some()
    }
}

async fn create_account(
    workflow: &Workflow,
    accounts: &RecordSet<Address, Account>,
    key_weight: u32,
) -> ServiceResult<Account> {
    let keys = workflow.keys();
    let new_key = keys.generate(0, key_weight).await?;

    let request = TransactionRequest::new(CREATE_ACCOUNT)
        .with_arguments(vec![
            Argument::array(vec![Argument::string(new_key.descriptor.public_key.to_string())]),
            Argument::array(vec![Argument::ufix64(format!("{}.0", new_key.descriptor.weight))]),
        ])
        .with_authorizer(keys.admin().address);
    let sealed = workflow.execute(&request).await?;

    let address = sealed
        .result
        .created_address()
        .ok_or(WorkflowError::MissingEvent(sealed.id, ACCOUNT_CREATED_EVENT))?;

    keys.save(new_key.record.bind(address))?;
    let account = Account::new(address);
    accounts.insert(address, account.clone())?;

    tracing::info!(address = %address, tx_id = %sealed.id, "Account created");
    Ok(account)
}
