//! # Worker pool: bounded concurrency over a bounded queue.
//!
//! ## Rules
//! - At most `max_workers` jobs execute concurrently.
//! - The queue capacity equals `max_workers`; `submit` awaits when full.
//! - Job errors are not propagated: a job records its own outcome (the
//!   rollout engine writes per-device results into the progress tracker).
//! - The cancel token given to [`WorkerPool::start`] is handed to every
//!   job; jobs are expected to observe it and short-circuit.
//! - Callers sequence `submit*` then `stop`; `stop` drains the queue and
//!   joins the workers.

use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// A unit of work: receives the pool's cancel token, returns a future
/// that records its own outcome.
pub type Job = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, ()> + Send + 'static>;

/// Errors produced by [`WorkerPool::submit`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// `submit` was called before `start`.
    #[error("worker pool not started")]
    NotStarted,

    /// The pool has been stopped; the queue is closed.
    #[error("worker pool closed")]
    Closed,
}

/// Bounded-concurrency task executor.
pub struct WorkerPool {
    max_workers: usize,
    tx: Option<mpsc::Sender<Job>>,
    rx: Option<mpsc::Receiver<Job>>,
    workers: JoinSet<()>,
}

impl WorkerPool {
    /// Creates a pool of `max_workers` (clamped to at least one) with a
    /// queue of the same capacity.
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        let (tx, rx) = mpsc::channel(max_workers);
        Self {
            max_workers,
            tx: Some(tx),
            rx: Some(rx),
            workers: JoinSet::new(),
        }
    }

    /// Launches the workers, binding every job to `token`.
    ///
    /// Calling `start` twice is a no-op: the receiver has already been
    /// claimed by the first worker set.
    pub fn start(&mut self, token: CancellationToken) {
        let Some(rx) = self.rx.take() else {
            return;
        };
        let rx = Arc::new(Mutex::new(rx));

        for _ in 0..self.max_workers {
            let rx = Arc::clone(&rx);
            let token = token.clone();
            self.workers.spawn(async move {
                loop {
                    // Hold the queue lock only for the dequeue, never
                    // across job execution.
                    let job = { rx.lock().await.recv().await };
                    match job {
                        Some(job) => job(token.clone()).await,
                        None => break,
                    }
                }
            });
        }
    }

    /// Enqueues a job, waiting while the queue is at capacity.
    pub async fn submit(&self, job: Job) -> Result<(), PoolError> {
        match &self.tx {
            Some(tx) => tx.send(job).await.map_err(|_| PoolError::Closed),
            None => Err(PoolError::Closed),
        }
    }

    /// Closes the queue and blocks until all queued and in-flight jobs
    /// have finished.
    pub async fn stop(&mut self) {
        self.tx.take();
        while self.workers.join_next().await.is_some() {}
    }
}
