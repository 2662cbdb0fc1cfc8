//! ferry-core: Core library for the ferry transfer client
//!
//! This crate provides the backend-agnostic pieces of ferry, including:
//! - The StorageBackend trait every transport adapter implements
//! - Remote path parsing and normalization
//! - Credential resolution from the process environment
//! - Error taxonomy and the retry/backoff policy
//!
//! This crate is independent of any concrete transport. Adapters for the
//! Dropbox HTTP API and for SFTP live in their own crates and are the only
//! places that depend on the respective protocol stacks.

pub mod backend;
pub mod credentials;
pub mod error;
pub mod path;
pub mod retry;

pub use backend::{
    ByteSink, ByteSource, ChunkedUpload, ObjectStream, RemoteObject, SafeUpdate, StorageBackend,
    TransferDescriptor, TransferOutcome,
};
pub use credentials::{BackendKind, Credentials, DropboxCredentials, SftpCredentials};
pub use error::{Error, ErrorClass, Result};
pub use path::RemoteRef;
pub use retry::{with_retry, RetryConfig};

// Re-exported so callers do not need a direct tokio-util dependency to
// cancel operations.
pub use tokio_util::sync::CancellationToken;
