//! Shared harness for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use uuid::Uuid;

use custody_engine::config::ServiceConfig;
use custody_engine::http::{AppState, HttpServer};
use custody_engine::jobs::{Job, JobState};
use custody_engine::keys::LocalKey;
use custody_engine::lifecycle::{bootstrap, App, Shutdown};

/// Defaults with fast seal polling so flows finish in milliseconds.
pub fn fast_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.chain.poll_interval_ms = 2;
    config.chain.emulator_polls_per_status = 1;
    config.workers.count = 8;
    config.workers.capacity = 64;
    config
}

/// Wire the application with a fresh random service key.
pub fn start_app(config: ServiceConfig) -> App {
    bootstrap(config, LocalKey::random()).unwrap()
}

/// Serve `app` on an ephemeral local port.
pub async fn start_server(app: &App) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = HttpServer::new(AppState::from_app(app), &app.config.listener);
    let stopped = shutdown.signalled();
    tokio::spawn(async move {
        server.run(listener, stopped).await.unwrap();
    });

    (addr, shutdown)
}

/// Poll the job ledger until `id` is terminal.
pub async fn wait_for_job(app: &App, id: Uuid) -> Job {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let job = app.pool.get(id).unwrap();
            if job.state.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job did not finish in time")
}

pub fn assert_complete(job: &Job) {
    assert_eq!(job.state, JobState::Complete, "job failed: {:?}", job.error);
}
