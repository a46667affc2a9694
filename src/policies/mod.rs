//! Policies governing push retries:
//! - [`BackoffPolicy`] for inter-attempt delays;
//! - [`RetryPolicy`] for attempt accounting and cancellation.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use fleetvisor::{BackoffPolicy, RetryPolicy};
//!
//! let retry = RetryPolicy {
//!     max_attempts: 4,
//!     backoff: BackoffPolicy {
//!         first: Duration::from_secs(1),
//!         max: Duration::from_secs(8),
//!         factor: 2.0,
//!     },
//! };
//!
//! // Delay sequence between the four attempts: 1s -> 2s -> 4s.
//! let mut prev = None;
//! let delays: Vec<_> = (0..3)
//!     .map(|_| {
//!         let d = retry.backoff.next(prev);
//!         prev = Some(d);
//!         d
//!     })
//!     .collect();
//! assert_eq!(
//!     delays,
//!     vec![
//!         Duration::from_secs(1),
//!         Duration::from_secs(2),
//!         Duration::from_secs(4),
//!     ]
//! );
//! ```

mod backoff;
mod retry;

pub use backoff::BackoffPolicy;
pub use retry::RetryPolicy;
