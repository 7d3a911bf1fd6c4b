//! Public operations built on the workflow and the worker pool.
//!
//! # Data Flow
//! ```text
//! HTTP handler / caller
//!     → validate input (nothing is persisted on failure)
//!     → sync: run the workflow inline
//!       async: submit the workflow to the worker pool, return the job
//!     → record the created account / transaction
//! ```

pub mod accounts;
pub mod jobs;
pub mod records;
pub mod tokens;
pub mod transactions;

use thiserror::Error;

use crate::chain::types::{Address, ChainError, Identifier, Network};
use crate::jobs::{AdmissionError, JobStoreError, PoolError};
use crate::keys::KeyError;
use crate::workflow::WorkflowError;

pub use accounts::{Account, AccountService};
pub use jobs::JobService;
pub use tokens::TokenService;
pub use transactions::{TransactionBody, TransactionRecord, TransactionService};

/// Errors returned by service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed input; rejected before any state is written.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(&'static str),

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Workflow(WorkflowError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<WorkflowError> for ServiceError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::Keys(KeyError::AccountNotFound(_)) => ServiceError::NotFound("account not found"),
            other => ServiceError::Workflow(other),
        }
    }
}

impl From<KeyError> for ServiceError {
    fn from(e: KeyError) -> Self {
        WorkflowError::Keys(e).into()
    }
}

impl From<ChainError> for ServiceError {
    fn from(e: ChainError) -> Self {
        ServiceError::Workflow(WorkflowError::Chain(e))
    }
}

impl From<JobStoreError> for ServiceError {
    fn from(e: JobStoreError) -> Self {
        match e {
            JobStoreError::NotFound(_) => ServiceError::NotFound("job not found"),
            JobStoreError::Persistence(io) => ServiceError::Persistence(io),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<PoolError> for ServiceError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Admission(e) => e.into(),
            PoolError::Store(e) => e.into(),
        }
    }
}

/// Parse an address and check it belongs to `network`.
pub fn parse_address(network: Network, input: &str) -> ServiceResult<Address> {
    network
        .parse_address(input.trim())
        .map_err(|e| ServiceError::Validation(e.to_string()))
}

/// Parse a 64 hex digit transaction id, with or without `0x`.
pub fn parse_transaction_id(input: &str) -> ServiceResult<Identifier> {
    let digits = input.trim().trim_start_matches("0x");
    if digits.len() != 64 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ServiceError::Validation("not a valid transaction id".to_string()));
    }
    digits
        .parse()
        .map_err(|_| ServiceError::Validation("not a valid transaction id".to_string()))
}
