//! Bounded-concurrency task executor with graceful drain.
//!
//! The rollout engine fans device pushes out through a [`WorkerPool`]:
//! at most `max_workers` jobs run at once, the submission queue holds at
//! most `max_workers` pending jobs (a producer outrunning the workers
//! backpressures naturally), and [`WorkerPool::stop`] closes the queue and
//! waits for everything in flight to finish.

mod worker;

pub use worker::{Job, PoolError, WorkerPool};
