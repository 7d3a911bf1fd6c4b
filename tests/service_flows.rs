//! End-to-end flows through the services against the in-process ledger.

use std::collections::HashSet;

use custody_engine::chain::script::BALANCE_OF;
use custody_engine::chain::transaction::{format_ufix64, Argument};
use custody_engine::chain::types::{ChainError, TransactionStatus};
use custody_engine::jobs::{AdmissionError, JobState};
use custody_engine::services::{ServiceError, TransactionBody};
use custody_engine::workflow::WorkflowError;

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sync_and_async_account_creation() {
    let app = common::start_app(common::fast_config());
    let network = app.config.chain.network;

    let account = app.accounts.create_sync().await.unwrap();
    assert!(network.is_valid_address(&account.address));
    assert!(app.keys.is_managed(&account.address));

    let job = app.accounts.create_async().unwrap();
    assert_eq!(job.state, JobState::Accepted);
    let job = common::wait_for_job(&app, job.id).await;
    common::assert_complete(&job);

    let address = network.parse_address(job.result.as_deref().unwrap()).unwrap();
    assert_ne!(address, account.address);
    assert!(app.accounts.exists(&address));
    assert_eq!(app.accounts.list().len(), 2);

    let json = serde_json::to_string(&app.accounts.details(&address.to_string()).unwrap()).unwrap();
    assert!(!json.to_lowercase().contains("key"));

    app.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sequential_transfers_use_fresh_reference_blocks() {
    let app = common::start_app(common::fast_config());
    let admin = app.keys.admin().address;
    let recipient = app.accounts.create_sync().await.unwrap().address;

    let first = app.tokens.transfer_sync(admin, recipient, "1.5").await.unwrap();
    let second = app.tokens.transfer_sync(admin, recipient, "2.0").await.unwrap();

    assert_ne!(first.id, second.id);
    assert_ne!(first.reference_block, second.reference_block);
    assert_eq!(app.emulator.balance(&recipient), Some(350_000_000));

    app.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_funds_round_trip_between_admin_and_account() {
    let app = common::start_app(common::fast_config());
    let admin = app.keys.admin().address;
    let account = app.accounts.create_sync().await.unwrap().address;
    let admin_before = app.emulator.balance(&admin).unwrap();

    let funded = app.tokens.transfer_sync(admin, account, "5.0").await.unwrap();
    let returned = app.tokens.transfer_sync(account, admin, "2.0").await.unwrap();

    assert_eq!(funded.result.status, TransactionStatus::Sealed);
    assert_eq!(returned.result.status, TransactionStatus::Sealed);
    assert!(funded.result.error.is_none() && returned.result.error.is_none());
    assert_ne!(funded.id, returned.id);
    assert_ne!(funded.reference_block, returned.reference_block);

    let outbound = app.emulator.transaction(&returned.id).unwrap();
    assert_eq!(outbound.authorizers, vec![account]);
    assert_eq!(outbound.payer, admin);

    assert_eq!(app.emulator.balance(&account), Some(300_000_000));
    assert_eq!(app.emulator.balance(&admin), Some(admin_before - 300_000_000));

    app.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_execution_reports_id_then_error() {
    let app = common::start_app(common::fast_config());
    let admin = app.keys.admin().address;
    let empty = app.accounts.create_sync().await.unwrap().address;

    let submitted = app.tokens.transfer(empty, admin, "10.0").await.unwrap();
    assert!(app.emulator.transaction(&submitted.id).is_some());

    let err = app.tokens.confirm(&submitted).await.unwrap_err();
    match err {
        ServiceError::Workflow(WorkflowError::Chain(ChainError::Execution(message))) => {
            assert!(message.contains("insufficient balance"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // The sequence number was consumed, so the next transaction still lands.
    app.tokens.transfer_sync(admin, empty, "1.0").await.unwrap();
    app.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transactions_get_distinct_sequence_numbers() {
    let app = common::start_app(common::fast_config());
    let account = app.accounts.create_sync().await.unwrap().address;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let transactions = app.transactions.clone();
        let address = account.to_string();
        tasks.push(tokio::spawn(async move {
            let body = TransactionBody {
                code: "transaction { prepare(signer: AuthAccount) {} }".to_string(),
                arguments: Vec::new(),
            };
            transactions.create_sync(&address, body).await
        }));
    }

    let mut sequence_numbers = HashSet::new();
    for task in tasks {
        let record = task.await.unwrap().unwrap();
        let tx = app.emulator.transaction(&record.transaction_id).unwrap();
        assert!(sequence_numbers.insert(tx.proposal_key.sequence_number));
    }
    assert_eq!(sequence_numbers.len(), 8);
    assert_eq!(app.transactions.list(&account.to_string()).unwrap().len(), 8);

    app.shutdown().await;
}

#[tokio::test]
async fn test_invalid_script_persists_nothing() {
    let app = common::start_app(common::fast_config());
    let admin = app.keys.admin().address.to_string();
    let body = TransactionBody {
        code: "transaction { prepare(signer: AuthAccount) {".to_string(),
        arguments: Vec::new(),
    };

    let err = app.transactions.create_async(&admin, body.clone()).unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    let err = app.transactions.create_sync(&admin, body).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    assert!(app.jobs.list().is_empty());
    assert!(app.transactions.list(&admin).unwrap().is_empty());
    assert_eq!(app.jobs.stats().outstanding, 0);

    app.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_admission_rejects_beyond_workers_plus_capacity() {
    let mut config = common::fast_config();
    config.workers.count = 1;
    config.workers.capacity = 1;
    config.chain.emulator_polls_per_status = 200;
    let app = common::start_app(config);

    let first = app.accounts.create_async().unwrap();
    let second = app.accounts.create_async().unwrap();
    let err = app.accounts.create_async().unwrap_err();
    assert!(matches!(err, ServiceError::Admission(AdmissionError::AtCapacity)));
    assert_eq!(err.to_string(), "max capacity reached, try again later");

    let jobs = app.jobs.list();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.id == first.id || j.id == second.id));

    app.abort();
    app.shutdown().await;
}

#[tokio::test]
async fn test_unknown_lookups() {
    let app = common::start_app(common::fast_config());
    let stranger = app.config.chain.network.address_at(99);

    assert!(matches!(
        app.accounts.details(&stranger.to_string()),
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        app.tokens.transfer(stranger, app.keys.admin().address, "1.0").await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        app.jobs.details(&uuid::Uuid::new_v4().to_string()),
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(app.jobs.details("nope"), Err(ServiceError::Validation(_))));

    app.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scripts_read_ledger_state() {
    let app = common::start_app(common::fast_config());
    let admin = app.keys.admin().address;
    let account = app.accounts.create_sync().await.unwrap().address;
    app.tokens.transfer_sync(admin, account, "0.25").await.unwrap();

    let balance = app
        .transactions
        .execute_script(TransactionBody {
            code: BALANCE_OF.to_string(),
            arguments: vec![Argument::address(account)],
        })
        .await
        .unwrap();
    assert_eq!(balance, Argument::ufix64(format_ufix64(25_000_000)));

    let literal = app
        .transactions
        .execute_script(TransactionBody {
            code: "pub fun main(): Bool { return true }".to_string(),
            arguments: Vec::new(),
        })
        .await
        .unwrap();
    assert_eq!(literal, Argument::bool(true));

    let err = app
        .transactions
        .execute_script(TransactionBody {
            code: "pub fun main(): Int {".to_string(),
            arguments: Vec::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    app.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transaction_recorded_before_it_seals() {
    let mut config = common::fast_config();
    config.chain.emulator_polls_per_status = 100_000;
    let app = common::start_app(config);
    let admin = app.keys.admin().address.to_string();

    let pending = {
        let transactions = app.transactions.clone();
        let admin = admin.clone();
        tokio::spawn(async move {
            let body = TransactionBody {
                code: "transaction { prepare(signer: AuthAccount) {} }".to_string(),
                arguments: Vec::new(),
            };
            transactions.create_sync(&admin, body).await
        })
    };

    let recorded = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            if let Some(record) = app.transactions.list(&admin).unwrap().pop() {
                return record;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("transaction was not recorded");
    assert!(app.emulator.transaction(&recorded.transaction_id).is_some());

    // Abandon the seal wait; the record stays.
    pending.abort();
    assert!(pending.await.unwrap_err().is_cancelled());
    let details = app
        .transactions
        .details(&admin, &recorded.transaction_id.to_string())
        .unwrap();
    assert_eq!(details, recorded);

    app.shutdown().await;
}
