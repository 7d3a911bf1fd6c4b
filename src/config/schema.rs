//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::chain::types::{Network, FULL_WEIGHT};
use crate::jobs::RecoveryPolicy;
use crate::keys::ADMIN_KEY_ENV_VAR;
use crate::workflow::SealPolicy;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP listener settings.
    pub listener: ListenerConfig,

    /// Ledger connection and confirmation settings.
    pub chain: ChainConfig,

    /// Service account used as proposer and fee payer.
    pub admin: AdminConfig,

    /// Worker pool sizing.
    pub workers: WorkerConfig,

    /// Job ledger settings.
    pub jobs: JobsConfig,

    /// Key store settings.
    pub keys: KeysConfig,

    /// Account and transaction record settings.
    pub records: RecordsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Whole-request timeout in seconds. Synchronous calls wait for the seal
    /// inside this window.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// Ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    pub network: Network,

    /// Access node address. Unused by the in-process emulator.
    pub access_api_host: String,

    /// Per-call RPC timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Interval between seal polls in milliseconds.
    pub poll_interval_ms: u64,

    /// Give up waiting for a seal after this many polls. Unset waits forever.
    pub max_polls: Option<u32>,

    /// Emulator: polls spent in each status before advancing.
    pub emulator_polls_per_status: u32,

    /// Emulator: blocks after which a reference block is too old.
    pub emulator_expiry_window: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            network: Network::Emulator,
            access_api_host: "localhost:3569".to_string(),
            rpc_timeout_secs: 10,
            poll_interval_ms: 1000,
            max_polls: None,
            emulator_polls_per_status: 1,
            emulator_expiry_window: 600,
        }
    }
}

impl ChainConfig {
    pub fn seal_policy(&self) -> SealPolicy {
        SealPolicy {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_polls: self.max_polls,
        }
    }
}

/// Service account configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Service account address; defaults to the network's service address.
    pub address: Option<String>,

    /// Index of the service key on the account.
    pub key_index: u32,

    /// Environment variable holding the service private key.
    pub private_key_env: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            address: None,
            key_index: 0,
            private_key_env: ADMIN_KEY_ENV_VAR.to_string(),
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of workers executing jobs.
    pub count: usize,

    /// Jobs that may wait in the backlog beyond the running ones.
    pub capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 100,
            capacity: 1000,
        }
    }
}

/// Job ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct JobsConfig {
    /// JSON-lines journal file. Unset keeps jobs in memory.
    pub persistence_path: Option<PathBuf>,

    /// What to do with jobs a previous process left unfinished.
    pub recovery: RecoveryPolicy,
}

/// Key store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeysConfig {
    /// JSON snapshot file. Unset keeps keys in memory.
    pub persistence_path: Option<PathBuf>,

    /// Weight given to generated account keys.
    pub default_weight: u32,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            persistence_path: None,
            default_weight: FULL_WEIGHT,
        }
    }
}

/// Account and transaction record configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RecordsConfig {
    pub accounts_path: Option<PathBuf>,
    pub transactions_path: Option<PathBuf>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
        assert_eq!(config.chain.network, Network::Emulator);
        assert_eq!(config.chain.seal_policy(), SealPolicy::default());
        assert_eq!(config.workers.count, 100);
        assert_eq!(config.workers.capacity, 1000);
        assert_eq!(config.jobs.recovery, RecoveryPolicy::Leave);
        assert_eq!(config.keys.default_weight, FULL_WEIGHT);
        assert_eq!(config.admin.private_key_env, ADMIN_KEY_ENV_VAR);
    }

    #[test]
    fn test_partial_sections() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [chain]
            network = "testnet"
            max_polls = 30

            [workers]
            count = 4

            [jobs]
            recovery = "fail"
            persistence_path = "/var/lib/custody/jobs.jsonl"
            "#,
        )
        .unwrap();
        assert_eq!(config.chain.network, Network::Testnet);
        assert_eq!(config.chain.seal_policy().max_polls, Some(30));
        assert_eq!(config.workers.count, 4);
        assert_eq!(config.workers.capacity, 1000);
        assert_eq!(config.jobs.recovery, RecoveryPolicy::Fail);
        assert!(config.jobs.persistence_path.is_some());
    }
}
