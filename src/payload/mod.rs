//! Payload sources: seekable byte streams and the factory that produces
//! them.
//!
//! The rollout engine receives payloads as a [`PayloadFactory`], a
//! producer of fresh, exclusively-owned seekable sources, so that every
//! device task streams from its own source and pushes are never
//! serialized against each other. The engine seeks each source back to
//! byte zero at the start of every push attempt; a failed push is retried
//! from the beginning, never resumed.
//!
//! Two factories are provided: [`BytesPayload`] for in-memory payloads
//! and [`FilePayload`] for on-disk images.

use std::io::Cursor;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncSeek};

use crate::error::DeliveryError;

/// A seekable byte stream holding one update payload.
///
/// Blanket-implemented for everything readable and seekable, including
/// `std::io::Cursor<Bytes>` and `tokio::fs::File`.
pub trait PayloadSource: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin + ?Sized> PayloadSource for T {}

/// Producer of fresh payload sources, one per device task.
///
/// `open` must return a source positioned at byte zero whose bytes are
/// identical on every call for the lifetime of one update execution.
#[async_trait]
pub trait PayloadFactory: Send + Sync {
    /// Opens a new, exclusively-owned source over the payload.
    async fn open(&self) -> Result<Box<dyn PayloadSource>, DeliveryError>;
}

/// In-memory payload. Opening clones a cheap reference-counted handle.
pub struct BytesPayload {
    data: Bytes,
}

impl BytesPayload {
    /// Wraps the given bytes as a payload.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    /// True for a zero-length payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl PayloadFactory for BytesPayload {
    async fn open(&self) -> Result<Box<dyn PayloadSource>, DeliveryError> {
        Ok(Box::new(Cursor::new(self.data.clone())))
    }
}

/// On-disk payload. Opening creates an independent file handle.
pub struct FilePayload {
    path: PathBuf,
}

impl FilePayload {
    /// Serves the file at `path` as a payload.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl PayloadFactory for FilePayload {
    async fn open(&self) -> Result<Box<dyn PayloadSource>, DeliveryError> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| DeliveryError::Payload {
                reason: format!("open {}: {e}", self.path.display()),
            })?;
        Ok(Box::new(file))
    }
}
