use crate::config::Timeouts;
use crate::descriptor::{ConnectionDescriptor, Scheme};
use crate::error::TransferResult;
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, warn};

pub mod ftp;
pub mod memory;
pub mod sftp;
pub mod webdav;

pub use ftp::FtpClient;
pub use memory::MemoryTransport;
pub use sftp::SftpClient;
pub use webdav::WebDavClient;

/// Outcome of a directory creation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    Existing,
}

/// Outcome of a download request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetched {
    /// The remote file was copied to the local path; carries its size
    Found(u64),
    /// No remote file with that name
    Missing,
}

/// An open connection to a remote store
///
/// A session has a current position, like a shell's working directory.
/// Names passed to the operations below are single path segments resolved
/// against that position.
#[async_trait]
pub trait RemoteSession: Send {
    /// Remote path of the current position, for log and error messages
    fn current_dir(&self) -> String;

    /// Check whether a file or directory named `name` exists here
    async fn exists(&mut self, name: &str) -> TransferResult<bool>;

    /// Create a directory. An existing directory is not an error.
    async fn make_dir(&mut self, name: &str) -> TransferResult<Provisioned>;

    /// Move the current position into the child directory `name`
    async fn change_dir(&mut self, name: &str) -> TransferResult<()>;

    /// Upload a local file, replacing any remote file with the same name.
    /// Returns the number of bytes written.
    async fn upload_file(&mut self, local: &Path, name: &str) -> TransferResult<u64>;

    /// Download the remote file `name` to `local`
    async fn download_file(&mut self, name: &str, local: &Path) -> TransferResult<Fetched>;

    /// Release the connection
    async fn close(&mut self) -> TransferResult<()>;

    /// Walk into `segments` in order, creating each one that is missing.
    /// Safe to repeat: existing segments are only entered.
    async fn ensure_directory(&mut self, segments: &[&str]) -> TransferResult<()> {
        for segment in segments {
            if !self.exists(segment).await? {
                let outcome = self.make_dir(segment).await?;
                debug!(dir = %segment, ?outcome, parent = %self.current_dir(), "Provisioned directory");
            }
            self.change_dir(segment).await?;
        }
        Ok(())
    }
}

/// Something that can open sessions on a remote store
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open and authenticate a session
    async fn connect(&self) -> TransferResult<Box<dyn RemoteSession>>;

    /// Check that the store is reachable and accepts the credentials
    async fn probe(&self) -> TransferResult<()> {
        let mut session = self.connect().await?;
        session.close().await
    }

    /// Human readable target, without credentials
    fn describe(&self) -> String;
}

/// Transfer client selected once from a connection descriptor
pub enum TransferClient {
    Ftp(FtpClient),
    Sftp(SftpClient),
    WebDav(WebDavClient),
}

impl TransferClient {
    pub fn new(descriptor: ConnectionDescriptor, timeouts: Timeouts) -> Self {
        match descriptor.scheme {
            Scheme::Ftp => TransferClient::Ftp(FtpClient::new(descriptor, timeouts)),
            Scheme::SshFile => TransferClient::Sftp(SftpClient::new(descriptor, timeouts)),
            Scheme::WebDav | Scheme::WebDavSecure => {
                TransferClient::WebDav(WebDavClient::new(descriptor, timeouts))
            }
        }
    }

    pub fn scheme(&self) -> Scheme {
        match self {
            TransferClient::Ftp(_) => Scheme::Ftp,
            TransferClient::Sftp(_) => Scheme::SshFile,
            TransferClient::WebDav(client) => client.scheme(),
        }
    }
}

#[async_trait]
impl Transport for TransferClient {
    async fn connect(&self) -> TransferResult<Box<dyn RemoteSession>> {
        match self {
            TransferClient::Ftp(client) => client.connect().await,
            TransferClient::Sftp(client) => client.connect().await,
            TransferClient::WebDav(client) => client.connect().await,
        }
    }

    async fn probe(&self) -> TransferResult<()> {
        match self {
            TransferClient::Ftp(client) => client.probe().await,
            TransferClient::Sftp(client) => client.probe().await,
            TransferClient::WebDav(client) => client.probe().await,
        }
    }

    fn describe(&self) -> String {
        match self {
            TransferClient::Ftp(client) => client.describe(),
            TransferClient::Sftp(client) => client.describe(),
            TransferClient::WebDav(client) => client.describe(),
        }
    }
}

/// Close a session, logging instead of returning a failure
pub(crate) async fn close_quietly(session: &mut dyn RemoteSession) {
    if let Err(e) = session.close().await {
        warn!(error = %e, "Failed to close remote session");
    }
}

/// Normalize a path: trim leading/trailing slashes, handle empty as root
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// Join a normalized parent path and a child segment
pub fn join_path(parent: &str, name: &str) -> String {
    let parent = normalize_path(parent);
    let name = normalize_path(name);
    if parent.is_empty() {
        name
    } else if name.is_empty() {
        parent
    } else {
        format!("{}/{}", parent, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Credentials;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "a"), "a");
        assert_eq!(join_path("/a/", "b"), "a/b");
        assert_eq!(join_path("a", ""), "a");
        assert_eq!(normalize_path("."), "");
    }

    #[test]
    fn test_client_selected_from_scheme() {
        let creds = Credentials::new("u", "p");
        let cases = [
            ("10.0.0.1", Scheme::Ftp),
            ("ssh-file://host", Scheme::SshFile),
            ("webdav://host", Scheme::WebDav),
            ("webdav-secure://host", Scheme::WebDavSecure),
        ];
        for (raw, scheme) in cases {
            let descriptor = ConnectionDescriptor::parse(raw, creds.clone());
            let client = TransferClient::new(descriptor, Timeouts::default());
            assert_eq!(client.scheme(), scheme, "{}", raw);
        }
    }

    #[test]
    fn test_describe_omits_secret() {
        let descriptor =
            ConnectionDescriptor::parse("ssh-file://host:2222", Credentials::new("bob", "hunter2"));
        let client = TransferClient::new(descriptor, Timeouts::default());
        let described = client.describe();
        assert!(described.contains("host:2222"));
        assert!(!described.contains("hunter2"));
    }
}
