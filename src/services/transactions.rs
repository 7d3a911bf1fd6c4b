//! Arbitrary transactions authorized by a managed account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::chain::script;
use crate::chain::transaction::Argument;
use crate::chain::types::{Address, Identifier};
use crate::jobs::{Job, JobType, WorkerPool};
use crate::services::records::RecordSet;
use crate::services::{parse_address, parse_transaction_id, ServiceError, ServiceResult};
use crate::workflow::{TransactionRequest, Workflow};

/// Request body for a new transaction or a read-only script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransactionBody {
    pub code: String,
    #[serde(default)]
    pub arguments: Vec<Argument>,
}

/// A transaction the ledger accepted on behalf of a managed account.
///
/// Recorded on acceptance. `updated_at` moves once the transaction seals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub transaction_id: Identifier,
    pub address: Address,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    fn new(transaction_id: Identifier, address: Address) -> Self {
        let now = Utc::now();
        Self {
            transaction_id,
            address,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone)]
pub struct TransactionService {
    workflow: Workflow,
    pool: WorkerPool,
    records: Arc<RecordSet<Identifier, TransactionRecord>>,
}

impl TransactionService {
    pub fn new(
        workflow: Workflow,
        pool: WorkerPool,
        records: Arc<RecordSet<Identifier, TransactionRecord>>,
    ) -> Self {
        Self {
            workflow,
            pool,
            records,
        }
    }

    /// Run the transaction inline and return its record once sealed.
    pub async fn create_sync(&self, address: &str, body: TransactionBody) -> ServiceResult<TransactionRecord> {
        let (address, request) = self.prepare(address, body)?;
        send(&self.workflow, &self.records, address, request).await
    }

    /// Queue the transaction. The job result is the transaction id.
    pub fn create_async(&self, address: &str, body: TransactionBody) -> ServiceResult<Job> {
        let (address, request) = self.prepare(address, body)?;
        let workflow = self.workflow.clone();
        let records = self.records.clone();
        let job = self.pool.submit(JobType::Transaction, async move {
            send(&workflow, &records, address, request)
                .await
                .map(|record| record.transaction_id.to_string())
        })?;
        Ok(job)
    }

    pub fn details(&self, address: &str, transaction_id: &str) -> ServiceResult<TransactionRecord> {
        let address = parse_address(self.workflow.client().network(), address)?;
        let id = parse_transaction_id(transaction_id)?;
        self.records
            .get(&id)
            .filter(|record| record.address == address)
            .ok_or(ServiceError::NotFound("transaction not found"))
    }

    /// Transactions authorized by `address`, oldest first.
    pub fn list(&self, address: &str) -> ServiceResult<Vec<TransactionRecord>> {
        let address = parse_address(self.workflow.client().network(), address)?;
        let mut records: Vec<TransactionRecord> = self
            .records
            .values()
            .into_iter()
            .filter(|record| record.address == address)
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    /// Run a read-only script and return its value.
    pub async fn execute_script(&self, body: TransactionBody) -> ServiceResult<Argument> {
        script::parse_script(&body.code).map_err(|e| ServiceError::Validation(e.to_string()))?;
        let value = self
            .workflow
            .client()
            .execute_script(&body.code, &body.arguments)
            .await?;
        Ok(value)
    }

    /// Validate everything that can be checked before touching any state.
    fn prepare(&self, address: &str, body: TransactionBody) -> ServiceResult<(Address, TransactionRequest)> {
        let address = parse_address(self.workflow.client().network(), address)?;
        script::parse(&body.code).map_err(|e| ServiceError::Validation(e.to_string()))?;
        if !self.workflow.keys().is_managed(&address) {
            return Err(ServiceError::NotFound("account not found"));
        }
        let request = TransactionRequest::new(body.code)
            .with_arguments(body.arguments)
            .with_authorizer(address);
        Ok((address, request))
    }
}

async fn send(
    workflow: &Workflow,
    records: &RecordSet<Identifier, TransactionRecord>,
    address: Address,
    request: TransactionRequest,
) -> ServiceResult<TransactionRecord> {
    let submitted = workflow.submit(&request).await?;
    let mut record = TransactionRecord::new(submitted.id, address);
    records.insert(submitted.id, record.clone())?;

    workflow.confirm(&submitted).await?;
    record.updated_at = Utc::now();
    records.insert(submitted.id, record.clone())?;
    Ok(record)
}
