use super::{join_path, Fetched, Provisioned, RemoteSession};
use crate::config::Timeouts;
use crate::descriptor::ConnectionDescriptor;
use crate::error::{TransferError, TransferResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Mode, Status};
use tracing::debug;

/// Plain FTP client
///
/// `suppaftp`'s stream is blocking, so every command runs on tokio's
/// blocking pool.
pub struct FtpClient {
    descriptor: ConnectionDescriptor,
    timeouts: Timeouts,
}

impl FtpClient {
    pub fn new(descriptor: ConnectionDescriptor, timeouts: Timeouts) -> Self {
        Self {
            descriptor,
            timeouts,
        }
    }

    pub fn describe(&self) -> String {
        let (host, port) = self.descriptor.address();
        format!("ftp://{}@{}:{}", self.descriptor.credentials.user, host, port)
    }

    pub async fn connect(&self) -> TransferResult<Box<dyn RemoteSession>> {
        let session = self.open(self.timeouts.connect).await?;
        Ok(Box::new(session))
    }

    /// Connect with the shorter health check timeout, then quit
    pub async fn probe(&self) -> TransferResult<()> {
        let mut session = self.open(self.timeouts.probe).await?;
        session.close().await
    }

    async fn open(&self, timeout: Duration) -> TransferResult<FtpSession> {
        let descriptor = self.descriptor.clone();
        let stream = tokio::task::spawn_blocking(move || open_stream(&descriptor, timeout))
            .await
            .map_err(|e| TransferError::Connection(e.to_string()))??;

        Ok(FtpSession {
            stream: Arc::new(Mutex::new(Some(stream))),
            cwd: String::new(),
        })
    }
}

fn resolve(host: &str, port: u16) -> TransferResult<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| TransferError::Connection(format!("cannot resolve {}: {}", host, e)))?
        .next()
        .ok_or_else(|| TransferError::Connection(format!("no address for {}", host)))
}

fn open_stream(descriptor: &ConnectionDescriptor, timeout: Duration) -> TransferResult<FtpStream> {
    let (host, port) = descriptor.address();
    let addr = resolve(&host, port)?;

    debug!(%addr, ?timeout, "Connecting to FTP server");

    let mut stream = FtpStream::connect_timeout(addr, timeout).map_err(connection_error)?;
    let credentials = &descriptor.credentials;
    stream
        .login(credentials.user.as_str(), credentials.secret.as_str())
        .map_err(connection_error)?;
    stream
        .transfer_type(FileType::Binary)
        .map_err(connection_error)?;
    stream.set_mode(Mode::Passive);

    Ok(stream)
}

fn connection_error(err: FtpError) -> TransferError {
    TransferError::Connection(err.to_string())
}

fn remote_error(err: FtpError) -> TransferError {
    TransferError::RemoteIo(err.to_string())
}

/// Status of a reply the server rejected, if the error carries one
fn rejected_status(err: &FtpError) -> Option<Status> {
    match err {
        FtpError::UnexpectedResponse(response) => Some(response.status),
        _ => None,
    }
}

/// 550 covers both "no such file" and, for MKD, "already exists"
fn is_unavailable(status: Status) -> bool {
    matches!(status, Status::FileUnavailable)
}

/// NLST on an empty directory: 550 on most servers, 450 on ProFTPD
fn is_empty_listing(status: Status) -> bool {
    matches!(
        status,
        Status::FileUnavailable | Status::RequestFileActionIgnored
    )
}

/// Whether an NLST listing contains `name`. Servers may answer with bare
/// names or with paths, so only the last component is compared.
fn listing_contains(entries: &[String], name: &str) -> bool {
    entries
        .iter()
        .any(|entry| entry.trim_end_matches('/').rsplit('/').next() == Some(name))
}

struct FtpSession {
    stream: Arc<Mutex<Option<FtpStream>>>,
    cwd: String,
}

impl FtpSession {
    /// Run a blocking command against the control connection
    async fn run<T, F>(&self, op: F) -> TransferResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> TransferResult<T> + Send + 'static,
    {
        let stream = self.stream.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = stream.lock();
            let stream = guard
                .as_mut()
                .ok_or_else(|| TransferError::RemoteIo("session already closed".to_string()))?;
            op(stream)
        })
        .await
        .map_err(|e| TransferError::RemoteIo(e.to_string()))?
    }
}

#[async_trait]
impl RemoteSession for FtpSession {
    fn current_dir(&self) -> String {
        format!("/{}", self.cwd)
    }

    async fn exists(&mut self, name: &str) -> TransferResult<bool> {
        let name = name.to_string();
        self.run(move |stream| match stream.nlst(None) {
            Ok(entries) => Ok(listing_contains(&entries, &name)),
            Err(err) if rejected_status(&err).is_some_and(is_empty_listing) => Ok(false),
            Err(err) => Err(remote_error(err)),
        })
        .await
    }

    async fn make_dir(&mut self, name: &str) -> TransferResult<Provisioned> {
        debug!(dir = %join_path(&self.cwd, name), "Creating FTP directory");

        let name = name.to_string();
        self.run(move |stream| match stream.mkdir(name.as_str()) {
            Ok(()) => Ok(Provisioned::Created),
            Err(err) if rejected_status(&err).is_some_and(is_unavailable) => {
                let entries = stream.nlst(None).map_err(remote_error)?;
                if listing_contains(&entries, &name) {
                    Ok(Provisioned::Existing)
                } else {
                    Err(remote_error(err))
                }
            }
            Err(err) => Err(remote_error(err)),
        })
        .await
    }

    async fn change_dir(&mut self, name: &str) -> TransferResult<()> {
        let owned = name.to_string();
        self.run(move |stream| stream.cwd(owned.as_str()).map_err(remote_error))
            .await?;
        self.cwd = join_path(&self.cwd, name);
        Ok(())
    }

    async fn upload_file(&mut self, local: &Path, name: &str) -> TransferResult<u64> {
        debug!(local = %local.display(), remote = %join_path(&self.cwd, name), "Uploading via FTP");

        let local: PathBuf = local.to_path_buf();
        let name = name.to_string();
        self.run(move |stream| {
            let mut file = std::fs::File::open(&local)?;
            stream
                .put_file(name.as_str(), &mut file)
                .map_err(remote_error)
        })
        .await
    }

    async fn download_file(&mut self, name: &str, local: &Path) -> TransferResult<Fetched> {
        debug!(remote = %join_path(&self.cwd, name), local = %local.display(), "Downloading via FTP");

        let local: PathBuf = local.to_path_buf();
        let name = name.to_string();
        self.run(move |stream| match stream.retr_as_buffer(name.as_str()) {
            Ok(buffer) => {
                let content = buffer.into_inner();
                std::fs::write(&local, &content)?;
                Ok(Fetched::Found(content.len() as u64))
            }
            Err(err) if rejected_status(&err).is_some_and(is_unavailable) => Ok(Fetched::Missing),
            Err(err) => Err(remote_error(err)),
        })
        .await
    }

    async fn close(&mut self) -> TransferResult<()> {
        let stream = self.stream.lock().take();
        if let Some(mut stream) = stream {
            tokio::task::spawn_blocking(move || stream.quit().map_err(remote_error))
                .await
                .map_err(|e| TransferError::RemoteIo(e.to_string()))??;
        }
        Ok(())
    }
}
