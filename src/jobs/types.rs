//! Job records and error definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle state of a job. Complete and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Accepted,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Accepted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Accepted => "Accepted",
            JobState::Complete => "Complete",
            JobState::Failed => "Failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which workflow a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    CreateAccount,
    Transaction,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::CreateAccount => "create_account",
            JobType::Transaction => "transaction",
        }
    }
}

/// A unit of asynchronous work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(rename = "jobId")]
    pub id: Uuid,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(rename = "status")]
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// New job in the Accepted state.
    pub fn new(job_type: JobType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type,
            state: JobState::Accepted,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Terminal outcome written back by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Complete(String),
    Failed(String),
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Complete(_) => JobState::Complete,
            JobOutcome::Failed(_) => JobState::Failed,
        }
    }
}

/// Errors that can occur in the job store.
#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("job {0} already exists")]
    Conflict(Uuid),

    #[error("job not found")]
    NotFound(Uuid),

    #[error("job {id} is already {state}")]
    AlreadyTerminal { id: Uuid, state: JobState },

    #[error("Job store persistence failed: {0}")]
    Persistence(#[from] std::io::Error),
}

/// Result type for job store operations.
pub type JobStoreResult<T> = Result<T, JobStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_wire_shape() {
        let mut job = Job::new(JobType::CreateAccount);
        job.state = JobState::Complete;
        job.result = Some("0x0000000000000102".to_string());

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["jobId"], job.id.to_string());
        assert_eq!(value["type"], "create_account");
        assert_eq!(value["status"], "Complete");
        assert_eq!(value["result"], "0x0000000000000102");
        assert!(value.get("error").is_none());
        assert!(value.get("createdAt").is_some());
        assert!(value.get("updatedAt").is_some());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Accepted.is_terminal());
        assert!(JobState::Complete.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert_eq!(JobOutcome::Failed("x".into()).state(), JobState::Failed);
    }
}
