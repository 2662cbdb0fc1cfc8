//! ferry: retry-aware transfers to remote storage backends
//!
//! One contract over two transports. Credentials resolve from the
//! environment, the factory builds the matching adapter, and the
//! [`TransferEngine`] drives uploads, downloads and listings through it
//! with bounded, classified retries.
//!
//! ```no_run
//! use ferry::{BackendKind, ByteSource, CancellationToken, Credentials, TransferDescriptor};
//!
//! # async fn run() -> ferry::Result<()> {
//! let credentials = Credentials::resolve_from_process(BackendKind::Dropbox)?;
//! let engine = ferry::TransferEngine::new(ferry::create_backend(credentials, None)?);
//!
//! let descriptor = TransferDescriptor::new("reports/q3.pdf".parse()?);
//! let cancel = CancellationToken::new();
//! engine.upload(&descriptor, ByteSource::File("q3.pdf".into()), &cancel).await?;
//! # Ok(())
//! # }
//! ```

pub mod factory;
pub mod transfer;

pub use factory::create_backend;
pub use transfer::{Download, TransferEngine, TransferOptions};

pub use ferry_core::{
    BackendKind, ByteSink, ByteSource, CancellationToken, ChunkedUpload, Credentials, Error,
    ErrorClass, ObjectStream, RemoteObject, RemoteRef, Result, RetryConfig, SafeUpdate,
    StorageBackend, TransferDescriptor, TransferOutcome,
};
pub use ferry_dropbox::DropboxBackend;
pub use ferry_sftp::SftpBackend;
