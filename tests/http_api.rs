//! HTTP surface tests driven over a real socket with reqwest.

use reqwest::StatusCode;
use serde_json::{json, Value};

use custody_engine::chain::script::BALANCE_OF;
use custody_engine::chain::transaction::format_ufix64;
use custody_engine::jobs::JobState;

mod common;

const NOOP: &str = "transaction { prepare(signer: AuthAccount) {} }";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_account_lifecycle_over_http() {
    let app = common::start_app(common::fast_config());
    let (addr, shutdown) = common::start_server(&app).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}/v1", addr);

    let res = client
        .post(format!("{}/accounts", base))
        .header("Use-Sync", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let account: Value = res.json().await.unwrap();
    let address = account["address"].as_str().unwrap().to_string();
    assert!(account.get("createdAt").is_some());

    let res = client.get(format!("{}/accounts/{}", base, address)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.post(format!("{}/accounts", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let job: Value = res.json().await.unwrap();
    assert_eq!(job["type"], "create_account");
    assert_eq!(job["status"], "Accepted");
    let job_id = job["jobId"].as_str().unwrap().parse().unwrap();
    let finished = common::wait_for_job(&app, job_id).await;
    assert_eq!(finished.state, JobState::Complete);

    let res = client.get(format!("{}/jobs/{}", base, job_id)).send().await.unwrap();
    let job: Value = res.json().await.unwrap();
    assert_eq!(job["status"], "Complete");
    assert!(job["result"].as_str().unwrap().starts_with("0x"));

    let accounts: Vec<Value> = client
        .get(format!("{}/accounts", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(accounts.len(), 2);

    shutdown.trigger();
    app.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_transactions_over_http() {
    let app = common::start_app(common::fast_config());
    let (addr, shutdown) = common::start_server(&app).await;
    let client = reqwest::Client::new();
    let address = app.accounts.create_sync().await.unwrap().address;
    let base = format!("http://{}/v1/accounts/{}/transactions", addr, address);

    let res = client
        .post(&base)
        .header("Use-Sync", "1")
        .json(&json!({ "code": NOOP }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let record: Value = res.json().await.unwrap();
    let tx_id = record["transactionId"].as_str().unwrap().to_string();

    let res = client.get(format!("{}/{}", base, tx_id)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.post(&base).json(&json!({ "code": NOOP })).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let job: Value = res.json().await.unwrap();
    assert_eq!(job["type"], "transaction");
    let job = common::wait_for_job(&app, job["jobId"].as_str().unwrap().parse().unwrap()).await;
    common::assert_complete(&job);

    let records: Vec<Value> = client.get(&base).send().await.unwrap().json().await.unwrap();
    assert_eq!(records.len(), 2);

    shutdown.trigger();
    app.shutdown().await;
}

#[tokio::test]
async fn test_request_errors() {
    let app = common::start_app(common::fast_config());
    let (addr, shutdown) = common::start_server(&app).await;
    let client = reqwest::Client::new();
    let admin = app.keys.admin().address;
    let base = format!("http://{}/v1", addr);
    let transactions = format!("{}/accounts/{}/transactions", base, admin);

    let res = client.post(&transactions).body("{}").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let res = client
        .post(&transactions)
        .header("content-type", "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.text().await.unwrap(), "empty body");

    let res = client
        .post(&transactions)
        .json(&json!({ "code": "transaction {" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(res.text().await.unwrap().starts_with("Parsing failed"));

    let res = client.get(format!("{}/accounts/0x1234", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(format!("{}/{}", transactions, "ab".repeat(32)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.get(format!("{}/jobs/not-a-uuid", base)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    assert!(app.jobs.list().is_empty());

    shutdown.trigger();
    app.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_capacity_rejection_over_http() {
    let mut config = common::fast_config();
    config.workers.count = 1;
    config.workers.capacity = 1;
    config.chain.emulator_polls_per_status = 200;
    let app = common::start_app(config);
    let (addr, shutdown) = common::start_server(&app).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/v1/accounts", addr);

    for _ in 0..2 {
        let res = client.post(&url).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }
    let res = client.post(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.text().await.unwrap(), "max capacity reached, try again later");

    let health: Value = client
        .get(format!("http://{}/v1/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["pool"]["outstanding"], 2);

    shutdown.trigger();
    app.abort();
    app.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scripts_over_http() {
    let app = common::start_app(common::fast_config());
    let (addr, shutdown) = common::start_server(&app).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/v1/scripts", addr);
    let admin = app.keys.admin().address;

    let res = client
        .post(&url)
        .json(&json!({ "code": "pub fun main(): Int { return 1 }" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let value: Value = res.json().await.unwrap();
    assert_eq!(value, json!({ "type": "Int", "value": "1" }));

    let res = client
        .post(&url)
        .json(&json!({
            "code": BALANCE_OF,
            "arguments": [{ "type": "Address", "value": admin.to_string() }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let value: Value = res.json().await.unwrap();
    let expected = format_ufix64(app.emulator.balance(&admin).unwrap());
    assert_eq!(value, json!({ "type": "UFix64", "value": expected }));

    let res = client
        .post(&url)
        .json(&json!({ "code": "pub fun main(): Int { return 1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let stranger = app.config.chain.network.address_at(99);
    let res = client
        .post(&url)
        .json(&json!({
            "code": BALANCE_OF,
            "arguments": [{ "type": "Address", "value": stranger.to_string() }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    shutdown.trigger();
    app.shutdown().await;
}
