//! Bounded worker pool with fail-fast admission control.
//!
//! # Responsibilities
//! - Admit at most `workers + capacity` outstanding jobs, rejecting the rest immediately
//! - Hand jobs to workers through a FIFO channel
//! - Write each job's terminal state back through the job store
//! - Drain gracefully on stop without interrupting running jobs

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::jobs::store::JobStore;
use crate::jobs::types::{Job, JobOutcome, JobStoreError, JobStoreResult, JobType};
use crate::observability::metrics;

/// Submission refused without creating a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("max capacity reached, try again later")]
    AtCapacity,

    #[error("worker pool is stopped")]
    Stopped,
}

/// Errors returned by [`WorkerPool::submit`].
#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    pub workers: usize,
    pub capacity: usize,
    pub outstanding: usize,
}

struct QueuedJob {
    id: Uuid,
    job_type: JobType,
    body: BoxFuture<'static, JobOutcome>,
}

struct PoolInner {
    store: Arc<dyn JobStore>,
    capacity: usize,
    workers: AtomicUsize,
    /// Admitted jobs not yet written back (running or queued).
    outstanding: AtomicUsize,
    sender: mpsc::UnboundedSender<QueuedJob>,
    receiver: Mutex<mpsc::UnboundedReceiver<QueuedJob>>,
    stopping: CancellationToken,
    tracker: TaskTracker,
}

/// Fixed set of workers pulling jobs from a bounded backlog.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Create a pool with no workers and room for `capacity` queued jobs.
    pub fn new(store: Arc<dyn JobStore>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(PoolInner {
                store,
                capacity,
                workers: AtomicUsize::new(0),
                outstanding: AtomicUsize::new(0),
                sender,
                receiver: Mutex::new(receiver),
                stopping: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Spawn `count` more workers. Ignored once the pool is stopping.
    pub fn add_workers(&self, count: usize) {
        if self.inner.stopping.is_cancelled() {
            tracing::warn!(count, "Worker pool stopped, not adding workers");
            return;
        }
        for _ in 0..count {
            let worker = self.inner.workers.fetch_add(1, Ordering::SeqCst);
            let inner = self.inner.clone();
            self.inner.tracker.spawn(worker_loop(inner, worker));
        }
        tracing::info!(
            added = count,
            workers = self.inner.workers.load(Ordering::SeqCst),
            capacity = self.inner.capacity,
            "Workers started"
        );
    }

    /// Admit `body` as a new job, or fail immediately when the pool is full.
    ///
    /// The returned job is Accepted; it may already be terminal in the store
    /// by the time the caller looks again.
    pub fn submit<F, E>(&self, job_type: JobType, body: F) -> Result<Job, PoolError>
    where
        F: Future<Output = Result<String, E>> + Send + 'static,
        E: Display + 'static,
    {
        if let Err(e) = self.inner.reserve() {
            metrics::record_job_rejected(job_type.as_str());
            tracing::warn!(job_type = job_type.as_str(), error = %e, "Job rejected");
            return Err(e.into());
        }

        let job = Job::new(job_type);
        if let Err(e) = self.inner.store.create(&job) {
            self.inner.release();
            return Err(e.into());
        }

        let body = AssertUnwindSafe(body)
            .catch_unwind()
            .map(|result| match result {
                Ok(Ok(value)) => JobOutcome::Complete(value),
                Ok(Err(e)) => JobOutcome::Failed(e.to_string()),
                Err(_) => JobOutcome::Failed("job panicked".to_string()),
            })
            .boxed();

        let queued = QueuedJob {
            id: job.id,
            job_type,
            body,
        };
        if self.inner.sender.send(queued).is_err() {
            // The receiver lives as long as the pool, so this cannot happen.
            self.inner.release();
            let _ = self
                .inner
                .store
                .transition(job.id, JobOutcome::Failed("worker pool unavailable".to_string()));
            return Err(AdmissionError::Stopped.into());
        }

        metrics::record_job_submitted(job_type.as_str());
        tracing::debug!(job_id = %job.id, job_type = job_type.as_str(), "Job accepted");
        Ok(job)
    }

    /// Stop taking jobs off the backlog and wait for running jobs to finish.
    ///
    /// Jobs still queued are left Accepted in the store. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.inner.stopping.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;

        let mut abandoned = 0usize;
        {
            let mut receiver = self.inner.receiver.lock().await;
            while let Ok(job) = receiver.try_recv() {
                tracing::warn!(job_id = %job.id, job_type = job.job_type.as_str(), "Queued job not started before stop");
                self.inner.release();
                abandoned += 1;
            }
        }
        tracing::info!(abandoned, "Worker pool stopped");
    }

    pub fn get(&self, id: Uuid) -> JobStoreResult<Job> {
        self.inner.store.get(id)
    }

    pub fn list(&self) -> Vec<Job> {
        self.inner.store.list()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            workers: self.inner.workers.load(Ordering::SeqCst),
            capacity: self.inner.capacity,
            outstanding: self.inner.outstanding.load(Ordering::SeqCst),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopping.is_cancelled()
    }
}

impl PoolInner {
    fn reserve(&self) -> Result<(), AdmissionError> {
        if self.stopping.is_cancelled() {
            return Err(AdmissionError::Stopped);
        }
        let limit = self.workers.load(Ordering::SeqCst) + self.capacity;
        let admitted = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
            .map_err(|_| AdmissionError::AtCapacity)?;
        metrics::set_jobs_outstanding(admitted + 1);
        Ok(())
    }

    fn release(&self) {
        let previous = self.outstanding.fetch_sub(1, Ordering::SeqCst);
        metrics::set_jobs_outstanding(previous.saturating_sub(1));
    }

    async fn execute(&self, job: QueuedJob, worker: usize) {
        let started = Instant::now();
        tracing::debug!(job_id = %job.id, job_type = job.job_type.as_str(), worker, "Job started");

        let outcome = job.body.await;
        let state = outcome.state();
        match self.store.transition(job.id, outcome) {
            Ok(stored) => tracing::info!(
                job_id = %job.id,
                job_type = job.job_type.as_str(),
                state = %stored.state,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Job finished"
            ),
            Err(e) => tracing::error!(job_id = %job.id, error = %e, "Failed to record job outcome"),
        }

        self.release();
        metrics::record_job_finished(job.job_type.as_str(), state.as_str(), started);
    }
}

async fn worker_loop(inner: Arc<PoolInner>, worker: usize) {
    tracing::debug!(worker, "Worker started");
    loop {
        let next = {
            let mut receiver = inner.receiver.lock().await;
            tokio::select! {
                biased;
                _ = inner.stopping.cancelled() => None,
                job = receiver.recv() => job,
            }
        };
        let Some(job) = next else { break };
        inner.execute(job, worker).await;
    }
    tracing::debug!(worker, "Worker exited");
}
