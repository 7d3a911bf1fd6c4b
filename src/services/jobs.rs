//! Job lookups.

use uuid::Uuid;

use crate::jobs::{Job, PoolStats, WorkerPool};
use crate::services::{ServiceError, ServiceResult};

#[derive(Clone)]
pub struct JobService {
    pool: WorkerPool,
}

impl JobService {
    pub fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }

    pub fn details(&self, id: &str) -> ServiceResult<Job> {
        let id: Uuid = id
            .trim()
            .parse()
            .map_err(|_| ServiceError::Validation("not a valid job id".to_string()))?;
        Ok(self.pool.get(id)?)
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<Job> {
        self.pool.list()
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}
