//! Durable ledger of job records.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::jobs::types::{Job, JobOutcome, JobState, JobStoreError, JobStoreResult};
use crate::storage::Journal;

/// Concurrency-safe job storage. Every mutation after creation goes through
/// [`JobStore::transition`].
pub trait JobStore: Send + Sync {
    /// Insert a new Accepted job.
    fn create(&self, job: &Job) -> JobStoreResult<()>;

    /// Move a job to its terminal state exactly once.
    fn transition(&self, id: Uuid, outcome: JobOutcome) -> JobStoreResult<Job>;

    fn get(&self, id: Uuid) -> JobStoreResult<Job>;

    /// All jobs, oldest first.
    fn list(&self) -> Vec<Job>;
}

/// What to do with jobs left non-terminal by a previous process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryPolicy {
    /// Leave them Accepted.
    #[default]
    Leave,
    /// Mark them Failed.
    Fail,
}

pub const INTERRUPTED_ERROR: &str = "interrupted by restart";

/// Apply `policy` to every non-terminal job. Returns how many were touched.
pub fn recover(store: &dyn JobStore, policy: RecoveryPolicy) -> JobStoreResult<usize> {
    let stranded: Vec<Uuid> = store
        .list()
        .into_iter()
        .filter(|job| !job.state.is_terminal())
        .map(|job| job.id)
        .collect();

    if stranded.is_empty() {
        return Ok(0);
    }

    match policy {
        RecoveryPolicy::Leave => {
            tracing::warn!(count = stranded.len(), "Non-terminal jobs from a previous run left as Accepted");
            Ok(0)
        }
        RecoveryPolicy::Fail => {
            for id in &stranded {
                store.transition(*id, JobOutcome::Failed(INTERRUPTED_ERROR.to_string()))?;
            }
            tracing::warn!(count = stranded.len(), "Non-terminal jobs from a previous run marked Failed");
            Ok(stranded.len())
        }
    }
}

/// `DashMap`-backed job store with an optional journal file.
///
/// Every create and transition appends the job's new state as one line
/// while that job's entry is locked. Replay keeps the last line per job and
/// never lets a non-terminal line replace a terminal one.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: DashMap<Uuid, Job>,
    journal: Journal,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store backed by `path`, replaying it if present.
    pub fn open(path: impl AsRef<Path>) -> JobStoreResult<Self> {
        let (journal, entries) = Journal::open::<Job>(path)?;
        let jobs: DashMap<Uuid, Job> = DashMap::new();
        for job in entries {
            match jobs.entry(job.id) {
                Entry::Occupied(mut slot) => {
                    if !slot.get().state.is_terminal() || job.state.is_terminal() {
                        slot.insert(job);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(job);
                }
            }
        }

        let store = Self { jobs, journal };
        store.journal.compact(&store.list())?;
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl JobStore for MemoryJobStore {
    fn create(&self, job: &Job) -> JobStoreResult<()> {
        match self.jobs.entry(job.id) {
            Entry::Occupied(_) => return Err(JobStoreError::Conflict(job.id)),
            Entry::Vacant(slot) => {
                let mut job = job.clone();
                job.state = JobState::Accepted;
                job.result = None;
                job.error = None;
                self.journal.append(&job)?;
                slot.insert(job);
            }
        }
        Ok(())
    }

    fn transition(&self, id: Uuid, outcome: JobOutcome) -> JobStoreResult<Job> {
        let updated = {
            let mut job = self.jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
            if job.state.is_terminal() {
                return Err(JobStoreError::AlreadyTerminal { id, state: job.state });
            }
            let mut next = job.clone();
            next.state = outcome.state();
            match outcome {
                JobOutcome::Complete(result) => next.result = Some(result),
                JobOutcome::Failed(error) => next.error = Some(error),
            }
            next.updated_at = chrono::Utc::now();
            self.journal.append(&next)?;
            *job = next.clone();
            next
        };
        Ok(updated)
    }

    fn get(&self, id: Uuid) -> JobStoreResult<Job> {
        self.jobs
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(JobStoreError::NotFound(id))
    }

    fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|r| r.value().clone()).collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::JobType;
    use std::sync::Arc;

    #[test]
    fn test_create_conflict() {
        let store = MemoryJobStore::new();
        let job = Job::new(JobType::Transaction);
        store.create(&job).unwrap();
        assert!(matches!(store.create(&job), Err(JobStoreError::Conflict(id)) if id == job.id));
    }

    #[test]
    fn test_terminal_state_is_final() {
        let store = MemoryJobStore::new();
        let job = Job::new(JobType::Transaction);
        store.create(&job).unwrap();

        let done = store.transition(job.id, JobOutcome::Complete("ok".into())).unwrap();
        assert_eq!(done.state, JobState::Complete);
        assert_eq!(done.result.as_deref(), Some("ok"));
        assert!(done.error.is_none());

        let err = store
            .transition(job.id, JobOutcome::Failed("late".into()))
            .unwrap_err();
        assert!(matches!(err, JobStoreError::AlreadyTerminal { state: JobState::Complete, .. }));

        let stored = store.get(job.id).unwrap();
        assert_eq!(stored.state, JobState::Complete);
        assert!(stored.error.is_none());
    }

    #[test]
    fn test_concurrent_transitions_single_winner() {
        let store = Arc::new(MemoryJobStore::new());
        let job = Job::new(JobType::CreateAccount);
        store.create(&job).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .transition(job.id, JobOutcome::Complete(i.to_string()))
                        .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_unknown_job() {
        let store = MemoryJobStore::new();
        assert!(matches!(store.get(Uuid::new_v4()), Err(JobStoreError::NotFound(_))));
    }

    #[test]
    fn test_persistence_and_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.jsonl");

        let store = MemoryJobStore::open(&path).unwrap();
        let finished = Job::new(JobType::Transaction);
        let stranded = Job::new(JobType::CreateAccount);
        store.create(&finished).unwrap();
        store.create(&stranded).unwrap();
        store
            .transition(finished.id, JobOutcome::Complete("id".into()))
            .unwrap();
        drop(store);

        let reopened = MemoryJobStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(recover(&reopened, RecoveryPolicy::Leave).unwrap(), 0);
        assert_eq!(reopened.get(stranded.id).unwrap().state, JobState::Accepted);

        assert_eq!(recover(&reopened, RecoveryPolicy::Fail).unwrap(), 1);
        let failed = reopened.get(stranded.id).unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.error.as_deref(), Some(INTERRUPTED_ERROR));
        assert_eq!(reopened.get(finished.id).unwrap().result.as_deref(), Some("id"));
    }

    #[test]
    fn test_concurrent_transitions_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.jsonl");

        let store = Arc::new(MemoryJobStore::open(&path).unwrap());
        let jobs: Vec<Job> = (0..64).map(|_| Job::new(JobType::Transaction)).collect();
        for job in &jobs {
            store.create(job).unwrap();
        }

        let handles: Vec<_> = jobs
            .iter()
            .map(|job| {
                let store = store.clone();
                let id = job.id;
                std::thread::spawn(move || {
                    store.transition(id, JobOutcome::Complete(id.to_string())).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        drop(store);

        let reopened = MemoryJobStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 64);
        assert!(reopened.list().iter().all(|job| job.state == JobState::Complete));
        assert_eq!(recover(&reopened, RecoveryPolicy::Fail).unwrap(), 0);
    }

    #[test]
    fn test_replay_never_reverts_terminal_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.jsonl");

        let accepted = Job::new(JobType::CreateAccount);
        let mut failed = accepted.clone();
        failed.state = JobState::Failed;
        failed.error = Some("boom".into());

        let lines = [&failed, &accepted]
            .iter()
            .map(|job| serde_json::to_string(job).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        std::fs::write(&path, lines + "\n").unwrap();

        let store = MemoryJobStore::open(&path).unwrap();
        let job = store.get(accepted.id).unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
    }
}
