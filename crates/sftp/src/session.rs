//! SSH session establishment and failure classification
//!
//! Connection-level failures (handshake, drop, timeout) map to the
//! transient network class and are eligible for reconnect-and-retry;
//! authentication failures (bad key, rejected credentials) are fatal and
//! never retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh::keys::{PrivateKeyWithHashAlg, decode_secret_key};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::StatusCode;

use ferry_core::{Error, Result, SftpCredentials};

use crate::pool::PoolableSession;

const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct ClientHandler;

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        // Host key pinning is the deployment's job; transfers run against
        // hosts provisioned alongside the credentials.
        Ok(true)
    }
}

/// One authenticated SSH connection with an open SFTP subsystem
pub(crate) struct SshSession {
    sftp: SftpSession,
    // Dropping the handle closes the underlying connection
    _handle: client::Handle<ClientHandler>,
}

impl SshSession {
    pub(crate) fn sftp(&self) -> &SftpSession {
        &self.sftp
    }
}

#[async_trait]
impl PoolableSession for SshSession {
    async fn open(credentials: &SftpCredentials) -> Result<Self> {
        let key = decode_secret_key(
            &credentials.private_key,
            credentials.passphrase.as_deref(),
        )
        .map_err(|e| Error::InvalidCredential(format!("cannot parse private key: {e}")))?;

        let config = Arc::new(client::Config {
            inactivity_timeout: Some(INACTIVITY_TIMEOUT),
            ..Default::default()
        });

        tracing::debug!(
            host = %credentials.host,
            port = credentials.port,
            username = %credentials.username,
            "opening ssh session"
        );

        let mut handle = client::connect(
            config,
            (credentials.host.as_str(), credentials.port),
            ClientHandler,
        )
        .await
        .map_err(map_ssh_error)?;

        let auth = handle
            .authenticate_publickey(
                &credentials.username,
                PrivateKeyWithHashAlg::new(Arc::new(key), None),
            )
            .await
            .map_err(map_ssh_error)?;

        if !auth.success() {
            return Err(Error::Auth(format!(
                "server rejected key for {}@{}",
                credentials.username, credentials.host
            )));
        }

        let channel = handle.channel_open_session().await.map_err(map_ssh_error)?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(map_ssh_error)?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(map_sftp_error)?;

        Ok(Self {
            sftp,
            _handle: handle,
        })
    }
}

/// Transport-level SSH failures are transient; everything here happens
/// before or below authentication, which is reported separately.
pub(crate) fn map_ssh_error(err: russh::Error) -> Error {
    Error::Network(format!("ssh transport error: {err}"))
}

/// Map an SFTP status to the shared taxonomy
pub(crate) fn map_sftp_error(err: russh_sftp::client::error::Error) -> Error {
    match err {
        russh_sftp::client::error::Error::Status(status) => match status.status_code {
            StatusCode::NoSuchFile => Error::NotFound(status.error_message),
            StatusCode::PermissionDenied => Error::Auth(status.error_message),
            code => Error::Network(format!("sftp status {code:?}: {}", status.error_message)),
        },
        other => Error::Network(format!("sftp error: {other}")),
    }
}
