//! Dropbox backend implementation
//!
//! Implements the StorageBackend trait over the stateless bearer-token
//! HTTP API. RPC endpoints carry JSON bodies; content endpoints carry the
//! payload in the body and their arguments in the `Dropbox-API-Arg`
//! header. A 401 triggers one transparent refresh-and-retry cycle per
//! operation when a refresh token is configured.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use ferry_core::path::relative_path;
use ferry_core::{
    ByteSource, ChunkedUpload, DropboxCredentials, Error, ObjectStream, RemoteObject, RemoteRef,
    Result, SafeUpdate, StorageBackend, TransferDescriptor, TransferOutcome,
};

use crate::hash::content_hash;
use crate::protocol::{
    ApiErrorBody, CommitInfo, FileMetadata, ListFolderArg, ListFolderContinueArg,
    ListFolderResult, Metadata, MetadataResult, PathArg, RelocationArg, TokenResponse,
    UploadSessionAppendArg, UploadSessionCursor, UploadSessionFinishArg, UploadSessionStartArg,
    UploadSessionStartResult,
};

const API_BASE: &str = "https://api.dropboxapi.com/2";
const CONTENT_BASE: &str = "https://content.dropboxapi.com/2";
const TOKEN_ENDPOINT: &str = "https://api.dropboxapi.com/oauth2/token";

/// Page size for folder listings
const LISTING_LIMIT: u32 = 1000;

/// Dropbox adapter
pub struct DropboxBackend {
    http: Client,
    credentials: RwLock<Arc<DropboxCredentials>>,
    /// Backend root in native form: "" for the app root, otherwise
    /// "/dir" with a leading slash and no trailing slash
    root: String,
}

impl DropboxBackend {
    /// Create an adapter rooted at the app folder
    pub fn new(credentials: DropboxCredentials) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            credentials: RwLock::new(Arc::new(credentials)),
            root: String::new(),
        })
    }

    /// Scope all operations under the given root directory
    pub fn with_root(mut self, root: &str) -> Result<Self> {
        self.root = format!("/{}", RemoteRef::new(root)?.path());
        Ok(self)
    }

    /// Translate a reference into native Dropbox path syntax
    fn full_path(&self, reference: &RemoteRef) -> String {
        format!("{}/{}", self.root, reference.path())
    }

    fn current_token(&self) -> String {
        self.credentials
            .read()
            .expect("credentials lock")
            .access_token
            .clone()
    }

    /// Run an operation, allowing one refresh-and-retry cycle on token
    /// expiry. Refresh is per operation, not per chunk.
    async fn run_with_refresh<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match op().await {
            Err(Error::AuthExpired(reason)) => {
                let can_refresh = self
                    .credentials
                    .read()
                    .expect("credentials lock")
                    .can_refresh();
                if !can_refresh {
                    return Err(Error::AuthExpired(reason));
                }
                tracing::info!("access token expired, refreshing");
                self.refresh_access_token().await?;
                op().await
            }
            other => other,
        }
    }

    /// Exchange the refresh token for a new access token and swap in a
    /// fresh immutable bundle.
    async fn refresh_access_token(&self) -> Result<()> {
        let (refresh_token, app_key, app_secret) = {
            let creds = self.credentials.read().expect("credentials lock");
            let Some(refresh_token) = creds.refresh_token.clone() else {
                return Err(Error::Auth("no refresh token configured".into()));
            };
            (refresh_token, creds.app_key.clone(), creds.app_secret.clone())
        };

        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", app_key.as_str()),
                ("client_secret", app_secret.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!(
                "token refresh failed: HTTP {}: {body}",
                status.as_u16()
            )));
        }

        let token: TokenResponse = response.json().await.map_err(transport_error)?;
        let mut guard = self.credentials.write().expect("credentials lock");
        *guard = Arc::new(guard.with_access_token(token.access_token));
        Ok(())
    }

    /// POST to an RPC endpoint (api host, JSON body in and out)
    async fn rpc<T: DeserializeOwned>(&self, endpoint: &str, arg: &impl Serialize) -> Result<T> {
        self.run_with_refresh(|| async move {
            let response = self
                .http
                .post(format!("{API_BASE}/{endpoint}"))
                .bearer_auth(self.current_token())
                .json(arg)
                .send()
                .await
                .map_err(transport_error)?;
            let response = check(response).await?;
            response.json::<T>().await.map_err(transport_error)
        })
        .await
    }

    /// POST to a content endpoint (content host, args in header, payload
    /// in body). The caller checks/consumes the response.
    async fn send_content(
        &self,
        endpoint: &str,
        arg: &impl Serialize,
        body: Bytes,
    ) -> Result<Response> {
        let response = self
            .http
            .post(format!("{CONTENT_BASE}/{endpoint}"))
            .bearer_auth(self.current_token())
            .header("Dropbox-API-Arg", api_arg_header(arg)?)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await
    }

    /// Content request returning a JSON body
    async fn content_rpc<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        arg: &impl Serialize,
        body: Bytes,
    ) -> Result<T> {
        self.run_with_refresh(|| {
            let body = body.clone();
            async move {
                let response = self.send_content(endpoint, arg, body).await?;
                response.json::<T>().await.map_err(transport_error)
            }
        })
        .await
    }

    /// Map native metadata to a RemoteObject with a root-relative
    /// reference; deleted entries map to None.
    fn metadata_to_object(&self, metadata: Metadata) -> Result<Option<RemoteObject>> {
        match metadata {
            Metadata::File(file) => {
                let full = file
                    .path_display
                    .unwrap_or_else(|| format!("/{}", file.name));
                let rel = relative_path(&full, &self.root)?;
                let reference = RemoteRef::new(rel)?.with_revision(file.rev);
                let mut object = RemoteObject::file(reference, file.size);
                object.content_hash = file.content_hash;
                object.modified = file.server_modified.as_deref().and_then(|s| s.parse().ok());
                Ok(Some(object))
            }
            Metadata::Folder(folder) => {
                let full = folder
                    .path_display
                    .unwrap_or_else(|| format!("/{}", folder.name));
                let rel = relative_path(&full, &self.root)?;
                Ok(Some(RemoteObject::dir(RemoteRef::new(rel)?)))
            }
            Metadata::Deleted(_) => Ok(None),
        }
    }

    fn outcome_from(file: FileMetadata, bytes_transferred: u64) -> TransferOutcome {
        TransferOutcome {
            bytes_transferred,
            revision: Some(file.rev),
            content_hash: file.content_hash,
        }
    }
}

#[async_trait]
impl StorageBackend for DropboxBackend {
    fn label(&self) -> String {
        if self.root.is_empty() {
            "dropbox(/)".to_string()
        } else {
            format!("dropbox({})", self.root)
        }
    }

    async fn upload(
        &self,
        descriptor: &TransferDescriptor,
        source: ByteSource,
    ) -> Result<TransferOutcome> {
        let payload = source.collect().await?;
        let size = payload.len() as u64;
        let local_hash = content_hash(&payload);
        check_expected_hash(descriptor, &local_hash)?;
        let arg = CommitInfo::overwrite(self.full_path(&descriptor.reference));
        tracing::debug!(path = %descriptor.reference, size, "uploading");
        let file: FileMetadata = self.content_rpc("files/upload", &arg, payload).await?;
        check_reported_hash(&local_hash, file.content_hash.as_deref())?;
        Ok(Self::outcome_from(file, size))
    }

    async fn download(
        &self,
        reference: &RemoteRef,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<TransferOutcome> {
        let arg = PathArg {
            path: self.full_path(reference),
        };
        let mut response = self
            .run_with_refresh(|| self.send_content("files/download", &arg, Bytes::new()))
            .await?;

        // Metadata rides along in a response header
        let metadata = response
            .headers()
            .get("dropbox-api-result")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| serde_json::from_str::<FileMetadata>(s).ok());

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;

        Ok(TransferOutcome {
            bytes_transferred: written,
            revision: metadata.as_ref().map(|m| m.rev.clone()),
            content_hash: metadata.and_then(|m| m.content_hash),
        })
    }

    async fn list(&self, prefix: Option<&RemoteRef>) -> Result<ObjectStream<'_>> {
        // Dropbox wants "" for the root folder, a full path otherwise
        let path = match prefix {
            Some(reference) => self.full_path(reference),
            None if self.root.is_empty() => String::new(),
            None => self.root.clone(),
        };
        let arg = ListFolderArg {
            path,
            recursive: false,
            limit: LISTING_LIMIT,
        };
        let first: ListFolderResult = self.rpc("files/list_folder", &arg).await?;
        tracing::debug!(entries = first.entries.len(), has_more = first.has_more, "listing page");

        let state = (
            VecDeque::from(first.entries),
            first.cursor,
            first.has_more,
        );
        let stream = futures::stream::try_unfold(
            state,
            move |(mut entries, mut cursor, mut has_more)| async move {
                loop {
                    if let Some(metadata) = entries.pop_front() {
                        match self.metadata_to_object(metadata)? {
                            Some(object) => {
                                return Ok(Some((object, (entries, cursor, has_more))));
                            }
                            None => continue,
                        }
                    }
                    if !has_more {
                        return Ok(None);
                    }
                    let page: ListFolderResult = self
                        .rpc(
                            "files/list_folder/continue",
                            &ListFolderContinueArg {
                                cursor: cursor.clone(),
                            },
                        )
                        .await?;
                    tracing::debug!(entries = page.entries.len(), "listing continuation page");
                    entries = VecDeque::from(page.entries);
                    cursor = page.cursor;
                    has_more = page.has_more;
                }
            },
        );
        Ok(Box::pin(stream))
    }

    async fn delete(&self, reference: &RemoteRef) -> Result<()> {
        let arg = PathArg {
            path: self.full_path(reference),
        };
        let _: MetadataResult = self.rpc("files/delete_v2", &arg).await?;
        Ok(())
    }

    async fn exists(&self, reference: &RemoteRef) -> Result<bool> {
        let arg = PathArg {
            path: self.full_path(reference),
        };
        match self.rpc::<Metadata>("files/get_metadata", &arg).await {
            Ok(Metadata::Deleted(_)) => Ok(false),
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn rename(&self, from: &RemoteRef, to: &RemoteRef) -> Result<()> {
        let arg = RelocationArg {
            from_path: self.full_path(from),
            to_path: self.full_path(to),
        };
        let _: MetadataResult = self.rpc("files/move_v2", &arg).await?;
        Ok(())
    }

    fn as_safe_update(&self) -> Option<&dyn SafeUpdate> {
        Some(self)
    }

    fn as_chunked_upload(&self) -> Option<&dyn ChunkedUpload> {
        Some(self)
    }
}

#[async_trait]
impl SafeUpdate for DropboxBackend {
    async fn update(
        &self,
        reference: &RemoteRef,
        source: ByteSource,
        revision: &str,
    ) -> Result<TransferOutcome> {
        let payload = source.collect().await?;
        let size = payload.len() as u64;
        let local_hash = content_hash(&payload);
        let arg = CommitInfo::update(self.full_path(reference), revision);
        let file: FileMetadata = self.content_rpc("files/upload", &arg, payload).await?;
        check_reported_hash(&local_hash, file.content_hash.as_deref())?;
        Ok(Self::outcome_from(file, size))
    }
}

#[async_trait]
impl ChunkedUpload for DropboxBackend {
    async fn start_session(&self) -> Result<String> {
        let arg = UploadSessionStartArg { close: false };
        let result: UploadSessionStartResult = self
            .content_rpc("files/upload_session/start", &arg, Bytes::new())
            .await?;
        Ok(result.session_id)
    }

    async fn append(&self, session_id: &str, offset: u64, chunk: Bytes) -> Result<()> {
        let arg = UploadSessionAppendArg {
            cursor: UploadSessionCursor {
                session_id: session_id.to_string(),
                offset,
            },
            close: false,
        };
        self.run_with_refresh(|| self.send_content("files/upload_session/append_v2", &arg, chunk.clone()))
            .await?;
        Ok(())
    }

    async fn finish(
        &self,
        session_id: &str,
        offset: u64,
        descriptor: &TransferDescriptor,
    ) -> Result<TransferOutcome> {
        let arg = UploadSessionFinishArg {
            cursor: UploadSessionCursor {
                session_id: session_id.to_string(),
                offset,
            },
            commit: CommitInfo::overwrite(self.full_path(&descriptor.reference)),
        };
        let file: FileMetadata = self
            .content_rpc("files/upload_session/finish", &arg, Bytes::new())
            .await?;
        Ok(Self::outcome_from(file, offset))
    }
}

/// Serialize an argument for the `Dropbox-API-Arg` header; non-ASCII
/// characters must be escaped to keep the header value HTTP-safe.
fn api_arg_header<T: Serialize>(arg: &T) -> Result<String> {
    let json = serde_json::to_string(arg)?;
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    Ok(out)
}

fn transport_error(err: reqwest::Error) -> Error {
    Error::Network(format!("request failed: {err}"))
}

/// The payload must match the hash the descriptor promises, when it
/// carries one. A mismatch means the source changed since the caller
/// hashed it; re-sending the same bytes cannot fix that.
fn check_expected_hash(descriptor: &TransferDescriptor, local_hash: &str) -> Result<()> {
    match &descriptor.content_hash {
        Some(expected) if expected != local_hash => Err(Error::General(format!(
            "payload hash {local_hash} does not match descriptor hash {expected} for {}",
            descriptor.reference
        ))),
        _ => Ok(()),
    }
}

/// The server echoes a content hash for the stored object; a mismatch
/// means the bytes were mangled in transit, so a fresh attempt can
/// succeed.
fn check_reported_hash(local_hash: &str, reported: Option<&str>) -> Result<()> {
    match reported {
        Some(reported) if reported != local_hash => Err(Error::Network(format!(
            "server stored hash {reported}, sent {local_hash}"
        ))),
        _ => Ok(()),
    }
}

/// Pass a successful response through; otherwise read the body and map
/// the status to the shared taxonomy.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    Err(map_error(status, retry_after, &body))
}

/// Map HTTP status codes plus Dropbox error summaries to the taxonomy
fn map_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => Error::AuthExpired(summary_or(body, "access token rejected")),
        StatusCode::FORBIDDEN => Error::Auth(summary_or(body, "access denied")),
        StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
            message: summary_or(body, "too many requests"),
            retry_after,
        },
        StatusCode::CONFLICT => {
            let summary = summary_or(body, "conflict");
            if summary.contains("not_found") {
                Error::NotFound(summary)
            } else if summary.contains("conflict") {
                Error::Conflict(summary)
            } else {
                Error::General(format!("HTTP 409: {summary}"))
            }
        }
        s if s == StatusCode::REQUEST_TIMEOUT || s.is_server_error() => {
            Error::Network(format!("HTTP {}: {body}", s.as_u16()))
        }
        s => Error::General(format!("HTTP {}: {body}", s.as_u16())),
    }
}

/// Extract `error_summary` from a Dropbox error body, or fall back
fn summary_or(body: &str, fallback: &str) -> String {
    let summary = serde_json::from_str::<ApiErrorBody>(body)
        .unwrap_or_default()
        .error_summary;
    if summary.is_empty() {
        fallback.to_string()
    } else {
        summary
    }
}
