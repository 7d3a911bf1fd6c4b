//! Asynchronous job execution subsystem.
//!
//! # Data Flow
//! ```text
//! Service submit
//!     → pool.rs (admission against workers + backlog capacity)
//!     → store.rs (job created Accepted)
//!     → FIFO backlog → worker runs the workflow body
//!     → store.rs (single transition to Complete or Failed)
//! ```

pub mod pool;
pub mod store;
pub mod types;

pub use pool::{AdmissionError, PoolError, PoolStats, WorkerPool};
pub use store::{recover, JobStore, MemoryJobStore, RecoveryPolicy};
pub use types::{Job, JobOutcome, JobState, JobStoreError, JobStoreResult, JobType};
