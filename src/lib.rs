//! Custodial ledger backend: managed accounts, signed transactions, and a
//! bounded job engine in front of them.

pub mod chain;
pub mod config;
pub mod http;
pub mod jobs;
pub mod keys;
pub mod lifecycle;
pub mod observability;
pub mod services;
pub mod storage;
pub mod workflow;

pub use config::schema::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::{App, Shutdown};
