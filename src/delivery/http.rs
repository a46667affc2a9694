//! # HTTP payload delivery.
//!
//! Pushes payloads with a streaming `POST {address}{update_endpoint}`
//! (`application/octet-stream`) and verifies with
//! `GET {address}{verify_endpoint}`. The payload is pumped through a
//! bounded chunk channel into the request body, so memory use stays at a
//! few chunks regardless of payload size.
//!
//! Classification: network and 5xx failures are retryable transport
//! errors, request timeouts are retryable timeouts, 4xx responses are
//! non-retryable rejections.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::model::Device;
use crate::payload::PayloadSource;

use super::Delivery;

/// Configuration for [`HttpDelivery`].
#[derive(Clone, Debug)]
pub struct HttpDeliveryConfig {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Path appended to the device address for pushes.
    pub update_endpoint: String,
    /// Path appended to the device address for verification.
    pub verify_endpoint: String,
    /// Extra headers sent on every request (e.g. Authorization).
    pub headers: HashMap<String, String>,
    /// Read-chunk size for streaming the payload.
    pub chunk_size: usize,
}

impl Default for HttpDeliveryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            update_endpoint: "/update".to_string(),
            verify_endpoint: "/version".to_string(),
            headers: HashMap::new(),
            chunk_size: 64 * 1024,
        }
    }
}

/// HTTP-based [`Delivery`] implementation.
pub struct HttpDelivery {
    config: HttpDeliveryConfig,
    client: reqwest::Client,
}

impl HttpDelivery {
    /// Creates a delivery with default configuration.
    pub fn new() -> Result<Self, DeliveryError> {
        Self::with_config(HttpDeliveryConfig::default())
    }

    /// Creates a delivery with custom configuration.
    pub fn with_config(config: HttpDeliveryConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DeliveryError::transport(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, device: &Device, path: &str) -> String {
        format!("{}{}", device.address.trim_end_matches('/'), path)
    }

    fn apply_headers(&self, mut req: reqwest::RequestBuilder, device: &Device) -> reqwest::RequestBuilder {
        for (key, value) in &self.config.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        req.header("X-Device-Id", device.id.as_str())
            .header("X-Device-Name", device.name.as_str())
    }

    fn classify_send_error(&self, err: reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout {
                timeout: self.config.timeout,
            }
        } else {
            DeliveryError::transport(err.to_string())
        }
    }
}

/// Maps a non-success response onto the retry classification: 5xx stays
/// retryable, everything else is rejected outright.
fn classify_response(status: reqwest::StatusCode, body: &str) -> DeliveryError {
    let reason = format!("push failed with status {}: {}", status.as_u16(), body);
    if status.is_server_error() {
        DeliveryError::Transport { reason }
    } else {
        DeliveryError::Rejected { reason }
    }
}

/// Reads at most 1 KiB of an error response for diagnostics.
async fn error_body(resp: reqwest::Response) -> String {
    let body = resp.bytes().await.unwrap_or_else(|_| Bytes::new());
    let end = body.len().min(1024);
    String::from_utf8_lossy(&body[..end]).into_owned()
}

#[async_trait]
impl Delivery for HttpDelivery {
    async fn push(
        &self,
        token: &CancellationToken,
        device: &Device,
        payload: &mut dyn PayloadSource,
    ) -> Result<(), DeliveryError> {
        let url = self.endpoint(device, &self.config.update_endpoint);
        let chunk_size = self.config.chunk_size.max(1024);

        // Bounded channel between the local read pump and the request
        // body: at most a few chunks in memory at once.
        let (tx, mut rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(4);
        let body_stream = futures::stream::poll_fn(move |cx| rx.poll_recv(cx));

        let request = self
            .apply_headers(self.client.post(&url), device)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(body_stream))
            .send();

        // `tx` moves into the pump so the body stream closes (and the
        // request can complete) the moment the payload is drained.
        let pump = async move {
            let mut buf = vec![0u8; chunk_size];
            loop {
                match payload.read(&mut buf).await {
                    Ok(0) => return Ok(()),
                    Ok(n) => {
                        if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                            // Request side hung up; its error is reported below.
                            return Ok(());
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let exchange = async {
            let (sent, pumped) = tokio::join!(request, pump);
            if let Err(e) = pumped {
                return Err(DeliveryError::Payload {
                    reason: format!("read payload: {e}"),
                });
            }
            let resp = sent.map_err(|e| self.classify_send_error(e))?;
            let status = resp.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(classify_response(status, &error_body(resp).await))
            }
        };

        tokio::select! {
            _ = token.cancelled() => Err(DeliveryError::Cancelled),
            result = exchange => result,
        }
    }

    async fn verify(
        &self,
        token: &CancellationToken,
        device: &Device,
    ) -> Result<(), DeliveryError> {
        let url = self.endpoint(device, &self.config.verify_endpoint);
        let request = self.apply_headers(self.client.get(&url), device).send();

        let exchange = async {
            let resp = request.await.map_err(|e| self.classify_send_error(e))?;
            let status = resp.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(DeliveryError::rejected(format!(
                    "verify failed with status {}",
                    status.as_u16()
                )))
            }
        };

        tokio::select! {
            _ = token.cancelled() => Err(DeliveryError::Cancelled),
            result = exchange => result,
        }
    }
}
