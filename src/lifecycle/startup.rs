//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order: ledger, keys, jobs, workflow, services
//! - Apply the job recovery policy before any worker starts
//! - Start the workers last
//!
//! Any startup error is fatal.

use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::chain::types::{Address, AddressError};
use crate::chain::{BlockchainClient, Emulator, EmulatorConfig};
use crate::config::ServiceConfig;
use crate::jobs::{recover, JobStore, JobStoreError, MemoryJobStore, WorkerPool};
use crate::keys::{
    AdminAccount, KeyError, KeyManager, KeyStore, LocalCustody, LocalKey, MemoryKeyStore, TxSigner,
};
use crate::services::records::RecordSet;
use crate::services::{Account, AccountService, JobService, TokenService, TransactionRecord, TransactionService};
use crate::storage::Snapshot;
use crate::workflow::Workflow;

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid admin address: {0}")]
    AdminAddress(#[from] AddressError),

    #[error("key store unavailable: {0}")]
    Keys(#[from] KeyError),

    #[error("job store unavailable: {0}")]
    Jobs(#[from] JobStoreError),

    #[error("record store unavailable: {0}")]
    Records(#[from] std::io::Error),
}

/// Fully wired application.
pub struct App {
    pub config: ServiceConfig,
    pub emulator: Arc<Emulator>,
    pub client: BlockchainClient,
    pub keys: Arc<KeyManager>,
    pub pool: WorkerPool,
    pub workflow: Workflow,
    pub accounts: AccountService,
    pub transactions: TransactionService,
    pub tokens: TokenService,
    pub jobs: JobService,
    cancel: CancellationToken,
}

impl App {
    /// Drain the worker pool. Running jobs finish, queued jobs stay Accepted.
    pub async fn shutdown(&self) {
        self.pool.stop().await;
    }

    /// End every outstanding confirmation wait with a cancellation error.
    pub fn abort(&self) {
        tracing::warn!("Aborting outstanding confirmation waits");
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("client", &self.client)
            .field("pool", &self.pool.stats())
            .finish()
    }
}

/// Wire every subsystem from `config`, using `admin_key` for the service account.
///
/// Must be called inside a Tokio runtime: workers are spawned before returning.
pub fn bootstrap(config: ServiceConfig, admin_key: LocalKey) -> Result<App, StartupError> {
    let network = config.chain.network;
    let admin_address: Address = match &config.admin.address {
        Some(address) => network.parse_address(address)?,
        None => network.service_address(),
    };

    // Ledger
    let mut emulator_config = EmulatorConfig::new(network, admin_key.public_key());
    emulator_config.service_address = admin_address;
    emulator_config.service_key_index = config.admin.key_index;
    emulator_config.polls_per_status = config.chain.emulator_polls_per_status;
    emulator_config.expiry_window = config.chain.emulator_expiry_window;
    let emulator = Arc::new(Emulator::new(emulator_config));
    let client = BlockchainClient::new(emulator.clone(), network, config.chain.rpc_timeout_secs);

    // Keys
    if config.keys.persistence_path.is_some() {
        tracing::warn!("Key sequence numbers are persisted but the in-process ledger starts fresh");
    }
    let key_store: Arc<dyn KeyStore> = match &config.keys.persistence_path {
        Some(path) => Arc::new(MemoryKeyStore::open(path)?),
        None => Arc::new(MemoryKeyStore::new()),
    };
    let admin = AdminAccount {
        address: admin_address,
        key_index: config.admin.key_index,
    };
    let keys = Arc::new(KeyManager::new(key_store, Arc::new(LocalCustody), admin));
    keys.register_admin_key(&admin_key, admin_key.material())?;

    // Jobs
    let job_store: Arc<dyn JobStore> = match &config.jobs.persistence_path {
        Some(path) => Arc::new(MemoryJobStore::open(path)?),
        None => Arc::new(MemoryJobStore::new()),
    };
    recover(job_store.as_ref(), config.jobs.recovery)?;
    let pool = WorkerPool::new(job_store, config.workers.capacity);

    // Workflow and services
    let cancel = CancellationToken::new();
    let workflow = Workflow::new(client.clone(), keys.clone(), config.chain.seal_policy())
        .with_cancellation(cancel.clone());

    let account_records = match &config.records.accounts_path {
        Some(path) => RecordSet::open(Snapshot::at(path), |a: &Account| a.address)?,
        None => RecordSet::in_memory(),
    };
    let transaction_records = match &config.records.transactions_path {
        Some(path) => RecordSet::open(Snapshot::at(path), |t: &TransactionRecord| t.transaction_id)?,
        None => RecordSet::in_memory(),
    };

    let accounts = AccountService::new(
        workflow.clone(),
        pool.clone(),
        Arc::new(account_records),
        config.keys.default_weight,
    );
    let transactions = TransactionService::new(workflow.clone(), pool.clone(), Arc::new(transaction_records));
    let tokens = TokenService::new(workflow.clone());
    let jobs = JobService::new(pool.clone());

    // Workers last
    pool.add_workers(config.workers.count);

    tracing::info!(
        chain_id = network.chain_id(),
        admin_address = %admin_address,
        workers = config.workers.count,
        capacity = config.workers.capacity,
        "Application initialized"
    );

    Ok(App {
        config,
        emulator,
        client,
        keys,
        pool,
        workflow,
        accounts,
        transactions,
        tokens,
        jobs,
        cancel,
    })
}
