//! Ledger integration subsystem.
//!
//! # Data Flow
//! ```text
//! Services / workflow
//!     → transaction.rs (build, hash, attach signatures)
//!     → client.rs (timeout-bounded calls through the ChainClient trait)
//!     → emulator.rs (in-process ledger) or any other ChainClient
//! ```
//!
//! # Constraints
//! - Every node call is bounded by the configured RPC timeout
//! - Transport failures are reported, never retried here
//! - Scripts are syntax checked before anything is signed

pub mod client;
pub mod emulator;
pub mod script;
pub mod transaction;
pub mod types;

pub use client::{BlockchainClient, ChainClient};
pub use emulator::{Emulator, EmulatorConfig};
pub use transaction::{Argument, ProposalKey, Transaction};
pub use types::{
    Address, AddressError, Block, ChainError, ChainResult, Event, Identifier, KeyDescriptor,
    Network, PublicKey, TransactionResult, TransactionStatus, FULL_WEIGHT,
};
