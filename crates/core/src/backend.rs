//! StorageBackend trait definition
//!
//! The capability contract every transport adapter satisfies. Callers
//! upload, download, list and delete objects through this trait without
//! branching on backend type; the factory in the facade crate is the only
//! dispatch point.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

use crate::error::{Error, ErrorClass, Result};
use crate::path::RemoteRef;

/// Metadata for one listed remote object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Reference to the object, revision attached when the backend
    /// reports one
    pub reference: RemoteRef,

    /// Size in bytes (None for directories)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,

    /// Human-readable size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_human: Option<String>,

    /// Last modified timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<jiff::Timestamp>,

    /// Backend content hash, when the backend computes one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// Whether this entry is a directory
    pub is_dir: bool,
}

impl RemoteObject {
    /// Create a RemoteObject for a file
    pub fn file(reference: RemoteRef, size: u64) -> Self {
        Self {
            reference,
            size_bytes: Some(size),
            size_human: Some(humansize::format_size(size, humansize::BINARY)),
            modified: None,
            content_hash: None,
            is_dir: false,
        }
    }

    /// Create a RemoteObject for a directory
    pub fn dir(reference: RemoteRef) -> Self {
        Self {
            reference,
            size_bytes: None,
            size_human: None,
            modified: None,
            content_hash: None,
            is_dir: true,
        }
    }
}

/// The unit of one logical upload: where the data goes and what we know
/// about it up front. Lifetime spans exactly one logical transfer.
#[derive(Debug, Clone)]
pub struct TransferDescriptor {
    pub reference: RemoteRef,

    /// Expected payload size, if known; used to pick the chunked path
    pub expected_size: Option<u64>,

    /// Expected content hash, if known
    pub content_hash: Option<String>,
}

impl TransferDescriptor {
    pub fn new(reference: RemoteRef) -> Self {
        Self {
            reference,
            expected_size: None,
            content_hash: None,
        }
    }

    pub fn expected_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    pub fn content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }
}

/// Success payload of one logical operation
#[derive(Debug, Clone, Default)]
pub struct TransferOutcome {
    pub bytes_transferred: u64,

    /// Revision marker of the written object, when the backend has one
    pub revision: Option<String>,

    /// Content hash of the written object, when the backend reports one
    pub content_hash: Option<String>,
}

/// Data source for an upload.
///
/// Memory and File sources can be re-acquired, which makes the whole
/// transfer retryable; a bare reader gets exactly one attempt.
pub enum ByteSource {
    Memory(Bytes),
    File(PathBuf),
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl ByteSource {
    /// Payload length when knowable without IO
    pub fn len(&self) -> Option<u64> {
        match self {
            Self::Memory(bytes) => Some(bytes.len() as u64),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// A fresh copy of this source for a retry attempt, when the source
    /// supports re-reading.
    pub fn try_clone(&self) -> Option<Self> {
        match self {
            Self::Memory(bytes) => Some(Self::Memory(bytes.clone())),
            Self::File(path) => Some(Self::File(path.clone())),
            Self::Reader(_) => None,
        }
    }

    /// Turn the source into an async reader for streaming consumption
    pub async fn into_reader(self) -> Result<Box<dyn AsyncRead + Send + Unpin>> {
        match self {
            Self::Memory(bytes) => Ok(Box::new(std::io::Cursor::new(bytes))),
            Self::File(path) => Ok(Box::new(tokio::fs::File::open(path).await?)),
            Self::Reader(reader) => Ok(reader),
        }
    }

    /// Buffer the whole source in memory. Used by single-request upload
    /// paths; chunked paths stream instead.
    pub async fn collect(self) -> Result<Bytes> {
        match self {
            Self::Memory(bytes) => Ok(bytes),
            Self::File(path) => Ok(tokio::fs::read(path).await?.into()),
            Self::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Ok(buf.into())
            }
        }
    }
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory(bytes) => write!(f, "ByteSource::Memory({} bytes)", bytes.len()),
            Self::File(path) => write!(f, "ByteSource::File({})", path.display()),
            Self::Reader(_) => write!(f, "ByteSource::Reader"),
        }
    }
}

impl From<Bytes> for ByteSource {
    fn from(bytes: Bytes) -> Self {
        Self::Memory(bytes)
    }
}

impl From<Vec<u8>> for ByteSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Memory(bytes.into())
    }
}

impl From<&str> for ByteSource {
    fn from(s: &str) -> Self {
        Self::Memory(Bytes::copy_from_slice(s.as_bytes()))
    }
}

/// Data sink for a download. The orchestrator opens a fresh writer per
/// attempt so a retried download never appends to a partial body.
#[derive(Debug, Clone)]
pub enum ByteSink {
    Memory,
    File(PathBuf),
}

/// Lazy, finite sequence of listed objects; restartable per call
pub type ObjectStream<'a> = BoxStream<'a, Result<RemoteObject>>;

/// Capability contract for one remote storage transport.
///
/// Implemented by the Dropbox and SFTP adapters; mockable for testing.
/// All failure paths surface the classified errors of [`crate::error`].
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short label describing the backend and its vital parameters,
    /// safe to log
    fn label(&self) -> String;

    /// Write one object. A chunked implementation may perform multiple
    /// wire operations, but the call is atomic from the caller's view.
    async fn upload(
        &self,
        descriptor: &TransferDescriptor,
        source: ByteSource,
    ) -> Result<TransferOutcome>;

    /// Read one object into the sink
    async fn download(
        &self,
        reference: &RemoteRef,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<TransferOutcome>;

    /// List objects directly under the given prefix. `None` lists the
    /// backend root. The stream is lazy and finite.
    async fn list(&self, prefix: Option<&RemoteRef>) -> Result<ObjectStream<'_>>;

    /// Delete one object; `NotFound` when it does not exist
    async fn delete(&self, reference: &RemoteRef) -> Result<()>;

    /// Whether the reference currently exists
    async fn exists(&self, reference: &RemoteRef) -> Result<bool>;

    /// Move/rename one object. `NotFound` for a missing source,
    /// `Conflict` for an occupied destination.
    async fn rename(&self, from: &RemoteRef, to: &RemoteRef) -> Result<()>;

    /// Map a failure to its retry category. The default is the shared
    /// taxonomy hint; adapters override when their transport needs more.
    fn classify(&self, error: &Error) -> ErrorClass {
        error.class_hint()
    }

    /// Compare-and-swap update support, when the backend has revisions
    fn as_safe_update(&self) -> Option<&dyn SafeUpdate> {
        None
    }

    /// Resumable chunked upload support, when the backend has upload
    /// sessions
    fn as_chunked_upload(&self) -> Option<&dyn ChunkedUpload> {
        None
    }
}

/// Optimistic-concurrency write: the object is replaced only if its
/// current revision matches, otherwise the call fails with `Conflict`.
#[async_trait]
pub trait SafeUpdate: Send + Sync {
    async fn update(
        &self,
        reference: &RemoteRef,
        source: ByteSource,
        revision: &str,
    ) -> Result<TransferOutcome>;
}

/// Low-level upload-session operations driven by the orchestrator for
/// large objects. Each call is one wire operation and individually
/// retryable; the orchestrator owns the resumption cursor.
#[async_trait]
pub trait ChunkedUpload: Send + Sync {
    /// Open an upload session and return its identifier
    async fn start_session(&self) -> Result<String>;

    /// Append one chunk at the given byte offset. The backend rejects an
    /// offset that does not match what it has confirmed so far.
    async fn append(&self, session_id: &str, offset: u64, chunk: Bytes) -> Result<()>;

    /// Close the session and commit the object
    async fn finish(
        &self,
        session_id: &str,
        offset: u64,
        descriptor: &TransferDescriptor,
    ) -> Result<TransferOutcome>;
}
