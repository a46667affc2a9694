//! Delivery port: protocol-specific payload transport.
//!
//! [`Delivery`] is the capability the rollout engine uses to push one
//! payload to one device and (optionally) verify it afterwards.
//! Implementations own authentication, TLS, address parsing, and protocol
//! details, and are the single place transport outcomes are classified
//! into the retryable/non-retryable variants of
//! [`DeliveryError`](crate::error::DeliveryError).
//!
//! [`HttpDelivery`] ships with the crate; other transports implement the
//! trait outside.

mod http;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::DeliveryError;
use crate::model::Device;
use crate::payload::PayloadSource;

pub use http::{HttpDelivery, HttpDeliveryConfig};

/// Protocol-specific push/verify port.
///
/// ## Implementation rules
/// - `push` streams the payload without materializing it; buffers of
///   bounded size are fine.
/// - `push` honors the cancel token at every blocking point.
/// - `push` must be safely re-invocable on the same logical payload: the
///   engine rewinds the source before every attempt, and implementations
///   must not retain state between calls.
/// - Transport/timeout/5xx outcomes map to retryable variants;
///   permission/validation/4xx outcomes map to
///   [`DeliveryError::Rejected`](crate::error::DeliveryError::Rejected).
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Streams `payload` to `device`.
    async fn push(
        &self,
        token: &CancellationToken,
        device: &Device,
        payload: &mut dyn PayloadSource,
    ) -> Result<(), DeliveryError>;

    /// Checks that the update took effect on the device.
    ///
    /// Transports that cannot verify report success. Not invoked by the
    /// engine's core flow; callers use it separately.
    async fn verify(
        &self,
        _token: &CancellationToken,
        _device: &Device,
    ) -> Result<(), DeliveryError> {
        Ok(())
    }
}
