use super::{Fetched, Provisioned, RemoteSession};
use crate::config::Timeouts;
use crate::descriptor::ConnectionDescriptor;
use crate::error::{TransferError, TransferResult};
use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::PublicKey;
use russh::Disconnect;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::StatusCode;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// SFTP client running over a single SSH session channel
pub struct SftpClient {
    descriptor: ConnectionDescriptor,
    timeouts: Timeouts,
}

impl SftpClient {
    pub fn new(descriptor: ConnectionDescriptor, timeouts: Timeouts) -> Self {
        Self {
            descriptor,
            timeouts,
        }
    }

    pub fn describe(&self) -> String {
        let (host, port) = self.descriptor.address();
        format!(
            "ssh-file://{}@{}:{}",
            self.descriptor.credentials.user, host, port
        )
    }

    pub async fn connect(&self) -> TransferResult<Box<dyn RemoteSession>> {
        Ok(Box::new(self.open().await?))
    }

    pub async fn probe(&self) -> TransferResult<()> {
        let mut session = tokio::time::timeout(self.timeouts.probe, self.open())
            .await
            .map_err(|_| TransferError::Connection("timed out".to_string()))??;
        session.close().await
    }

    async fn open(&self) -> TransferResult<SftpRemote> {
        let (host, port) = self.descriptor.address();
        debug!(host = %host, port, "Connecting to SSH server");

        let config = Arc::new(client::Config::default());
        let mut handle = client::connect(config, (host.as_str(), port), HostKeyPolicy)
            .await
            .map_err(|e| TransferError::Connection(e.to_string()))?;

        let credentials = &self.descriptor.credentials;
        let authenticated = handle
            .authenticate_password(credentials.user.as_str(), credentials.secret.as_str())
            .await
            .map_err(|e| TransferError::Connection(e.to_string()))?;
        if !authenticated {
            return Err(TransferError::Connection(format!(
                "authentication rejected for user {}",
                credentials.user
            )));
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| TransferError::Connection(e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| TransferError::Connection(e.to_string()))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| TransferError::Connection(e.to_string()))?;

        let cwd = sftp.canonicalize(".").await.map_err(remote_error)?;
        debug!(cwd = %cwd, "SFTP session ready");

        Ok(SftpRemote {
            handle,
            sftp,
            cwd,
        })
    }
}

/// Accepts every host key; the store is addressed by a configured
/// descriptor and no known_hosts file is kept.
struct HostKeyPolicy;

#[async_trait]
impl client::Handler for HostKeyPolicy {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(key_type = ?server_public_key.algorithm(), "Accepting server host key");
        Ok(true)
    }
}

fn remote_error(err: SftpError) -> TransferError {
    TransferError::RemoteIo(err.to_string())
}

fn is_no_such_file(err: &SftpError) -> bool {
    matches!(err, SftpError::Status(status) if matches!(status.status_code, StatusCode::NoSuchFile))
}

struct SftpRemote {
    handle: Handle<HostKeyPolicy>,
    sftp: SftpSession,
    cwd: String,
}

impl SftpRemote {
    fn path_of(&self, name: &str) -> String {
        format!("{}/{}", self.cwd.trim_end_matches('/'), name)
    }
}

#[async_trait]
impl RemoteSession for SftpRemote {
    fn current_dir(&self) -> String {
        self.cwd.clone()
    }

    /// A failed stat counts as "absent": the caller then tries to create
    /// the entry, and a real problem surfaces from that call.
    async fn exists(&mut self, name: &str) -> TransferResult<bool> {
        let path = self.path_of(name);
        match self.sftp.metadata(path.as_str()).await {
            Ok(_) => Ok(true),
            Err(err) => {
                debug!(path = %path, error = %err, "Stat failed, treating as absent");
                Ok(false)
            }
        }
    }

    async fn make_dir(&mut self, name: &str) -> TransferResult<Provisioned> {
        let path = self.path_of(name);
        debug!(path = %path, "Creating SFTP directory");

        match self.sftp.create_dir(path.as_str()).await {
            Ok(()) => Ok(Provisioned::Created),
            Err(err) => match self.sftp.metadata(path.as_str()).await {
                Ok(metadata) if metadata.is_dir() => Ok(Provisioned::Existing),
                _ => Err(remote_error(err)),
            },
        }
    }

    async fn change_dir(&mut self, name: &str) -> TransferResult<()> {
        let path = self.path_of(name);
        let metadata = self
            .sftp
            .metadata(path.as_str())
            .await
            .map_err(remote_error)?;
        if !metadata.is_dir() {
            return Err(TransferError::RemoteIo(format!("{} is not a directory", path)));
        }
        self.cwd = path;
        Ok(())
    }

    async fn upload_file(&mut self, local: &Path, name: &str) -> TransferResult<u64> {
        let path = self.path_of(name);
        debug!(local = %local.display(), remote = %path, "Uploading via SFTP");

        let mut source = tokio::fs::File::open(local).await?;
        let mut remote = self
            .sftp
            .create(path.as_str())
            .await
            .map_err(remote_error)?;
        let written = tokio::io::copy(&mut source, &mut remote)
            .await
            .map_err(|e| TransferError::RemoteIo(e.to_string()))?;
        remote
            .shutdown()
            .await
            .map_err(|e| TransferError::RemoteIo(e.to_string()))?;

        Ok(written)
    }

    async fn download_file(&mut self, name: &str, local: &Path) -> TransferResult<Fetched> {
        let path = self.path_of(name);
        debug!(remote = %path, local = %local.display(), "Downloading via SFTP");

        match self.sftp.read(path.as_str()).await {
            Ok(content) => {
                tokio::fs::write(local, &content).await?;
                Ok(Fetched::Found(content.len() as u64))
            }
            Err(err) if is_no_such_file(&err) => Ok(Fetched::Missing),
            Err(err) => Err(remote_error(err)),
        }
    }

    async fn close(&mut self) -> TransferResult<()> {
        if let Err(e) = self.sftp.close().await {
            warn!(error = %e, "Failed to close SFTP channel");
        }
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| TransferError::RemoteIo(e.to_string()))
    }
}
