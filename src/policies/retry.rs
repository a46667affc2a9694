//! # Retry loop with cancellation and non-retryable short-circuit.
//!
//! [`RetryPolicy::run`] drives an async action through up to
//! `max_attempts` invocations, sleeping per [`BackoffPolicy`] between
//! attempts.
//!
//! ## Rules
//! - The action completing without error terminates the loop.
//! - A non-retryable error ([`DeliveryError::is_retryable`] is false)
//!   returns immediately; a non-retryable failure costs exactly one
//!   attempt.
//! - The cancel token firing during a backoff sleep returns
//!   [`DeliveryError::Cancelled`] immediately.
//! - When the last attempt still fails, its error is returned.
//!
//! The action must be safely re-invocable: callers that stream bytes are
//! responsible for rewinding their source at the start of every attempt.

use std::future::Future;
use std::time::Duration;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::error::DeliveryError;

use super::backoff::BackoffPolicy;

/// Attempt budget plus backoff for one logical operation.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (`>= 1`; values of
    /// zero are treated as one).
    pub max_attempts: u32,
    /// Delay policy between attempts.
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    /// Returns the stock policy: three attempts over the default backoff
    /// (1s initial, 30s cap, 2.0 factor).
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    /// Invokes `action` until it succeeds, fails permanently, is
    /// cancelled, or the attempt budget runs out.
    pub async fn run<T, F, Fut>(
        &self,
        token: &CancellationToken,
        mut action: F,
    ) -> Result<T, DeliveryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DeliveryError>>,
    {
        let budget = self.max_attempts.max(1);
        let mut prev_delay: Option<Duration> = None;

        for attempt in 1..=budget {
            match action().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    if attempt == budget {
                        return Err(err);
                    }
                    let delay = self.backoff.next(prev_delay);
                    prev_delay = Some(delay);
                    log::debug!(
                        "retry: attempt {attempt}/{budget} failed ({}), backing off {delay:?}",
                        err.as_label()
                    );

                    let sleep = time::sleep(delay);
                    tokio::pin!(sleep);
                    select! {
                        _ = &mut sleep => {}
                        _ = token.cancelled() => return Err(DeliveryError::Cancelled),
                    }
                }
            }
        }

        // The loop always returns from inside; budget >= 1 guarantees at
        // least one iteration.
        Err(DeliveryError::Cancelled)
    }
}
