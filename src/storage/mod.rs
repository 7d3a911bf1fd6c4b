//! Local persistence helpers shared by the record stores.
//!
//! Small stores keep their records in memory and rewrite a JSON snapshot
//! after every mutation. The job store appends to a journal instead, since
//! it grows with every request.

pub mod journal;
pub mod snapshot;

pub use journal::Journal;
pub use snapshot::Snapshot;
