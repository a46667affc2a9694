//! # Backoff policy for retrying device pushes.
//!
//! [`BackoffPolicy`] controls how retry delays grow after repeated
//! failures, parameterized by the initial delay, a multiplicative growth
//! factor, and a cap.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry backoff policy.
///
/// - `first`: delay before the first retry;
/// - `factor`: multiplicative growth (`>= 1.0` recommended);
/// - `max`: cap applied to every delay.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Initial delay before the first retry.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor.
    pub factor: f64,
}

impl Default for BackoffPolicy {
    /// Returns the stock policy: `first = 1s`, `max = 30s`, `factor = 2.0`.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Computes the next delay from the previous one.
    ///
    /// - `None` → `first`, clamped to `max`.
    /// - `Some(d)` → `d * factor`, clamped to `max`. A non-finite product
    ///   (factor abuse) also clamps to `max`.
    pub fn next(&self, prev: Option<Duration>) -> Duration {
        let unclamped = match prev {
            None => self.first,
            Some(d) => {
                let mul = d.as_secs_f64() * self.factor;
                if !mul.is_finite() {
                    self.max
                } else {
                    d.mul_f64(self.factor)
                }
            }
        };
        unclamped.min(self.max)
    }
}
