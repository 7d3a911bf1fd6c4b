//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Ledger → Keys → Jobs (recovery) → Workflow → Services → Workers
//!
//! Shutdown (shutdown.rs):
//!     Signal received → HTTP stops accepting → WorkerPool::stop drains
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     second signal → abort outstanding confirmation waits
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
pub use startup::{bootstrap, App, StartupError};
