//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with every `/v1` handler
//! - Wire up middleware (tracing, whole-request timeout)
//! - Serve on a bound listener until the shutdown future resolves

use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::chain::BlockchainClient;
use crate::config::ListenerConfig;
use crate::http::handlers;
use crate::lifecycle::App;
use crate::services::{AccountService, JobService, TransactionService};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub transactions: TransactionService,
    pub jobs: JobService,
    pub client: BlockchainClient,
}

impl AppState {
    pub fn from_app(app: &App) -> Self {
        Self {
            accounts: app.accounts.clone(),
            transactions: app.transactions.clone(),
            jobs: app.jobs.clone(),
            client: app.client.clone(),
        }
    }
}

/// HTTP front of the custody engine.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, config: &ListenerConfig) -> Self {
        let router = Self::build_router(config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ListenerConfig, state: AppState) -> Router {
        let v1 = Router::new()
            .route(
                "/accounts",
                get(handlers::list_accounts).post(handlers::create_account),
            )
            .route("/accounts/{address}", get(handlers::get_account))
            .route(
                "/accounts/{address}/transactions",
                get(handlers::list_transactions).post(handlers::create_transaction),
            )
            .route(
                "/accounts/{address}/transactions/{transaction_id}",
                get(handlers::get_transaction),
            )
            .route("/scripts", post(handlers::execute_script))
            .route("/jobs", get(handlers::list_jobs))
            .route("/jobs/{job_id}", get(handlers::get_job))
            .route("/health", get(handlers::health));

        Router::new()
            .nest("/v1", v1)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// The assembled router, for driving in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server on `listener` until `shutdown` resolves, then finish
    /// in-flight requests and return.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
