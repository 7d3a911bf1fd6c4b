//! Route handlers.
//!
//! Handlers are thin: decode, call a service, map the error.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::http::request::{use_sync, JsonBody};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::jobs::PoolStats;
use crate::services::TransactionBody;

type ApiResult = Result<Response, ApiError>;

fn created<T: Serialize>(value: T) -> Response {
    (StatusCode::CREATED, Json(value)).into_response()
}

pub async fn list_accounts(State(state): State<AppState>) -> Response {
    Json(state.accounts.list()).into_response()
}

pub async fn create_account(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    if use_sync(&headers) {
        let account = state.accounts.create_sync().await?;
        Ok(created(account))
    } else {
        let job = state.accounts.create_async()?;
        Ok(created(job))
    }
}

pub async fn get_account(State(state): State<AppState>, Path(address): Path<String>) -> ApiResult {
    Ok(Json(state.accounts.details(&address)?).into_response())
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResult {
    Ok(Json(state.transactions.list(&address)?).into_response())
}

pub async fn create_transaction(
    State(state): State<AppState>,
    Path(address): Path<String>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<TransactionBody>,
) -> ApiResult {
    if use_sync(&headers) {
        let record = state.transactions.create_sync(&address, body).await?;
        Ok(created(record))
    } else {
        let job = state.transactions.create_async(&address, body)?;
        Ok(created(job))
    }
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path((address, transaction_id)): Path<(String, String)>,
) -> ApiResult {
    Ok(Json(state.transactions.details(&address, &transaction_id)?).into_response())
}

/// Read-only script: 200 with the returned value as a typed argument.
pub async fn execute_script(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<TransactionBody>,
) -> ApiResult {
    Ok(Json(state.transactions.execute_script(body).await?).into_response())
}

pub async fn list_jobs(State(state): State<AppState>) -> Response {
    Json(state.jobs.list()).into_response()
}

pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult {
    Ok(Json(state.jobs.details(&job_id)?).into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthReport {
    status: &'static str,
    chain_reachable: bool,
    chain_id: &'static str,
    pool: PoolStats,
}

/// Ledger reachability plus worker pool occupancy. 503 when the ledger is down.
pub async fn health(State(state): State<AppState>) -> Response {
    let chain_reachable = state.client.is_healthy().await;
    let report = HealthReport {
        status: if chain_reachable { "ok" } else { "degraded" },
        chain_reachable,
        chain_id: state.client.network().chain_id(),
        pool: state.jobs.stats(),
    };
    let status = if chain_reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}
