//! Transfer orchestration
//!
//! Wraps a backend with the retry policy and drives large uploads through
//! the chunked path when the backend supports it. Retry decisions live
//! here; adapters only classify their own failures.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use ferry_core::{
    ByteSink, ByteSource, CancellationToken, Error, ObjectStream, RemoteRef, Result,
    RetryConfig, StorageBackend, TransferDescriptor, TransferOutcome, with_retry,
};

/// Objects at or above this size go through the chunked upload path when
/// the backend has one. Matches the single-request ceiling of the API
/// backend.
const DEFAULT_CHUNK_THRESHOLD: u64 = 150 * 1024 * 1024;

const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct TransferOptions {
    pub retry: RetryConfig,

    /// Minimum object size for the chunked upload path
    pub chunk_threshold: u64,

    /// Bytes per upload-session append
    pub chunk_size: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Result of one download: the outcome plus the body when the sink was
/// in-memory.
#[derive(Debug)]
pub struct Download {
    pub outcome: TransferOutcome,
    pub body: Option<Bytes>,
}

/// Retry-aware front door for one backend.
///
/// Every operation takes a cancellation token; cancelling aborts backoff
/// immediately and drops any in-flight attempt.
pub struct TransferEngine {
    backend: Arc<dyn StorageBackend>,
    options: TransferOptions,
}

impl TransferEngine {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_options(backend, TransferOptions::default())
    }

    pub fn with_options(backend: Arc<dyn StorageBackend>, options: TransferOptions) -> Self {
        Self { backend, options }
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    /// Upload one object.
    ///
    /// Memory and file sources are retried whole; a bare reader cannot be
    /// rewound and gets exactly one attempt. Large payloads stream through
    /// the backend's upload session when it has one, with per-chunk
    /// retries at the confirmed offset.
    pub async fn upload(
        &self,
        descriptor: &TransferDescriptor,
        source: ByteSource,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome> {
        let size = match descriptor.expected_size.or(source.len()) {
            Some(size) => Some(size),
            None => match &source {
                ByteSource::File(path) => Some(tokio::fs::metadata(path).await?.len()),
                _ => None,
            },
        };

        if let Some(chunked) = self.backend.as_chunked_upload() {
            if size.is_some_and(|s| s >= self.options.chunk_threshold) {
                return self.upload_chunked(chunked, descriptor, source, cancel).await;
            }
        }

        match source.try_clone() {
            Some(_) => {
                with_retry(
                    &self.options.retry,
                    cancel,
                    |e| self.backend.classify(e),
                    |attempt| {
                        // First checked above, never None for these variants
                        let attempt_source = source.try_clone();
                        async move {
                            let src = attempt_source.ok_or_else(|| {
                                Error::General("source not re-readable".into())
                            })?;
                            if attempt > 0 {
                                tracing::debug!(
                                    reference = %descriptor.reference,
                                    attempt,
                                    "re-sending upload"
                                );
                            }
                            self.backend.upload(descriptor, src).await
                        }
                    },
                )
                .await
            }
            None => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                    result = self.backend.upload(descriptor, source) => result,
                }
            }
        }
    }

    async fn upload_chunked(
        &self,
        chunked: &dyn ferry_core::ChunkedUpload,
        descriptor: &TransferDescriptor,
        source: ByteSource,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome> {
        let classify = |e: &Error| self.backend.classify(e);

        let session_id = with_retry(&self.options.retry, cancel, classify, |_| {
            chunked.start_session()
        })
        .await?;
        tracing::debug!(
            reference = %descriptor.reference,
            session = %session_id,
            "upload session opened"
        );

        // Chunks are buffered before sending, so each append is retryable
        // even when the source itself cannot be rewound. The offset only
        // advances after the backend confirms the append.
        let mut reader = source.into_reader().await?;
        let mut offset: u64 = 0;
        loop {
            let mut buf = vec![0u8; self.options.chunk_size];
            let mut filled = 0;
            while filled < buf.len() {
                let n = reader.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            buf.truncate(filled);
            let chunk = Bytes::from(buf);

            with_retry(&self.options.retry, cancel, classify, |_| {
                chunked.append(&session_id, offset, chunk.clone())
            })
            .await?;
            offset += filled as u64;
        }

        let outcome = with_retry(&self.options.retry, cancel, classify, |_| {
            chunked.finish(&session_id, offset, descriptor)
        })
        .await?;
        tracing::debug!(
            reference = %descriptor.reference,
            bytes = offset,
            "upload session committed"
        );
        Ok(outcome)
    }

    /// Download one object into the sink.
    ///
    /// Every attempt starts with a fresh writer, so a retried download
    /// never appends to the partial body of a failed one.
    pub async fn download(
        &self,
        reference: &RemoteRef,
        sink: &ByteSink,
        cancel: &CancellationToken,
    ) -> Result<Download> {
        with_retry(
            &self.options.retry,
            cancel,
            |e| self.backend.classify(e),
            |_| async move {
                match sink {
                    ByteSink::Memory => {
                        let mut buf = Vec::new();
                        let outcome = self.backend.download(reference, &mut buf).await?;
                        Ok(Download {
                            outcome,
                            body: Some(buf.into()),
                        })
                    }
                    ByteSink::File(path) => {
                        if let Some(parent) = path.parent() {
                            tokio::fs::create_dir_all(parent).await?;
                        }
                        let mut file = tokio::fs::File::create(path).await?;
                        let outcome = self.backend.download(reference, &mut file).await?;
                        file.flush().await?;
                        Ok(Download {
                            outcome,
                            body: None,
                        })
                    }
                }
            },
        )
        .await
    }

    /// Replace the object only if its revision still matches. Falls back
    /// to a plain upload on backends without revision tracking, where
    /// last-writer-wins is the only available semantics.
    pub async fn update(
        &self,
        reference: &RemoteRef,
        source: ByteSource,
        revision: &str,
        cancel: &CancellationToken,
    ) -> Result<TransferOutcome> {
        let Some(safe) = self.backend.as_safe_update() else {
            tracing::debug!(
                backend = %self.backend.label(),
                "no revision support, updating last-writer-wins"
            );
            let descriptor = TransferDescriptor::new(reference.clone());
            return self.upload(&descriptor, source, cancel).await;
        };

        match source.try_clone() {
            Some(_) => {
                with_retry(
                    &self.options.retry,
                    cancel,
                    |e| self.backend.classify(e),
                    |_| {
                        let attempt_source = source.try_clone();
                        async move {
                            let src = attempt_source.ok_or_else(|| {
                                Error::General("source not re-readable".into())
                            })?;
                            safe.update(reference, src, revision).await
                        }
                    },
                )
                .await
            }
            None => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                    result = safe.update(reference, source, revision) => result,
                }
            }
        }
    }

    /// List objects directly under the prefix. Retries cover opening the
    /// listing; consuming the returned stream is not retried.
    pub async fn list(
        &self,
        prefix: Option<&RemoteRef>,
        cancel: &CancellationToken,
    ) -> Result<ObjectStream<'_>> {
        with_retry(
            &self.options.retry,
            cancel,
            |e| self.backend.classify(e),
            |_| self.backend.list(prefix),
        )
        .await
    }

    pub async fn delete(&self, reference: &RemoteRef, cancel: &CancellationToken) -> Result<()> {
        with_retry(
            &self.options.retry,
            cancel,
            |e| self.backend.classify(e),
            |_| self.backend.delete(reference),
        )
        .await
    }

    pub async fn exists(
        &self,
        reference: &RemoteRef,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        with_retry(
            &self.options.retry,
            cancel,
            |e| self.backend.classify(e),
            |_| self.backend.exists(reference),
        )
        .await
    }

    pub async fn rename(
        &self,
        from: &RemoteRef,
        to: &RemoteRef,
        cancel: &CancellationToken,
    ) -> Result<()> {
        with_retry(
            &self.options.retry,
            cancel,
            |e| self.backend.classify(e),
            |_| self.backend.rename(from, to),
        )
        .await
    }
}
