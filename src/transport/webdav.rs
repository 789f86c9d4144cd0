use super::{Fetched, Provisioned, RemoteSession};
use crate::config::Timeouts;
use crate::descriptor::{ConnectionDescriptor, Credentials, Scheme};
use crate::error::{TransferError, TransferResult};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use std::path::Path;
use tracing::debug;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?><propfind xmlns="DAV:"><prop><resourcetype/></prop></propfind>"#;

/// WebDAV client over HTTP or HTTPS
pub struct WebDavClient {
    descriptor: ConnectionDescriptor,
    timeouts: Timeouts,
}

impl WebDavClient {
    pub fn new(descriptor: ConnectionDescriptor, timeouts: Timeouts) -> Self {
        Self {
            descriptor,
            timeouts,
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.descriptor.scheme
    }

    /// Root URL of the store, with a trailing slash
    pub fn base_url(&self) -> TransferResult<Url> {
        let protocol = match self.descriptor.scheme {
            Scheme::WebDavSecure => "https",
            _ => "http",
        };
        let root = self.descriptor.root_path();
        let raw = if root.is_empty() {
            format!("{}://{}/", protocol, self.descriptor.authority())
        } else {
            format!("{}://{}/{}/", protocol, self.descriptor.authority(), root)
        };
        Url::parse(&raw).map_err(|e| TransferError::Connection(format!("invalid URL {}: {}", raw, e)))
    }

    pub fn describe(&self) -> String {
        format!("{}://{}@{}", self.descriptor.scheme, self.descriptor.credentials.user, self.descriptor.host)
    }

    pub async fn connect(&self) -> TransferResult<Box<dyn RemoteSession>> {
        Ok(Box::new(self.open(self.timeouts.connect).await?))
    }

    pub async fn probe(&self) -> TransferResult<()> {
        let mut session = self.open(self.timeouts.probe).await?;
        session.close().await
    }

    /// HTTP has no session; opening one checks that the root answers to
    /// the configured credentials.
    async fn open(&self, timeout: std::time::Duration) -> TransferResult<WebDavSession> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| TransferError::Connection(e.to_string()))?;
        let session = WebDavSession {
            client,
            credentials: self.descriptor.credentials.clone(),
            base: self.base_url()?,
            segments: Vec::new(),
        };

        let url = session.url_for(None)?;
        debug!(url = %url, "Checking WebDAV root");

        let response = session
            .request(propfind()?, url)
            .header("Depth", "0")
            .body(PROPFIND_BODY)
            .send()
            .await
            .map_err(|e| TransferError::Connection(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TransferError::Connection(
                format!("authentication rejected ({})", response.status()),
            )),
            status if status.is_success() => Ok(session),
            status => Err(TransferError::Connection(format!(
                "unexpected status {} from WebDAV root",
                status
            ))),
        }
    }
}

fn propfind() -> TransferResult<Method> {
    Method::from_bytes(b"PROPFIND").map_err(|e| TransferError::RemoteIo(e.to_string()))
}

fn mkcol() -> TransferResult<Method> {
    Method::from_bytes(b"MKCOL").map_err(|e| TransferError::RemoteIo(e.to_string()))
}

fn request_error(err: reqwest::Error) -> TransferError {
    if err.is_connect() || err.is_timeout() {
        TransferError::Connection(err.to_string())
    } else {
        TransferError::RemoteIo(err.to_string())
    }
}

fn status_error(action: &str, response: &Response) -> TransferError {
    TransferError::RemoteIo(format!(
        "{} {} failed with status {}",
        action,
        response.url(),
        response.status()
    ))
}

struct WebDavSession {
    client: Client,
    credentials: Credentials,
    base: Url,
    segments: Vec<String>,
}

impl WebDavSession {
    /// URL of `name` under the current position, or of the position
    /// itself (as a collection) when `name` is `None`
    fn url_for(&self, name: Option<&str>) -> TransferResult<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| TransferError::RemoteIo(format!("{} cannot be a base", self.base)))?;
            path.pop_if_empty();
            path.extend(self.segments.iter());
            match name {
                Some(name) => {
                    path.push(name);
                }
                None => {
                    path.push("");
                }
            }
        }
        Ok(url)
    }

    fn collection_url(&self, name: &str) -> TransferResult<Url> {
        let mut url = self.url_for(Some(name))?;
        if let Ok(mut path) = url.path_segments_mut() {
            path.push("");
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.secret))
    }
}

#[async_trait]
impl RemoteSession for WebDavSession {
    fn current_dir(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    async fn exists(&mut self, name: &str) -> TransferResult<bool> {
        let url = self.url_for(Some(name))?;
        let response = self
            .request(propfind()?, url)
            .header("Depth", "0")
            .body(PROPFIND_BODY)
            .send()
            .await
            .map_err(request_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(status_error("PROPFIND", &response)),
        }
    }

    async fn make_dir(&mut self, name: &str) -> TransferResult<Provisioned> {
        let url = self.collection_url(name)?;
        debug!(url = %url, "Creating WebDAV collection");

        let response = self
            .request(mkcol()?, url)
            .send()
            .await
            .map_err(request_error)?;

        match response.status() {
            // RFC 4918: MKCOL on an existing resource is 405
            StatusCode::METHOD_NOT_ALLOWED => Ok(Provisioned::Existing),
            status if status.is_success() => Ok(Provisioned::Created),
            _ => Err(status_error("MKCOL", &response)),
        }
    }

    async fn change_dir(&mut self, name: &str) -> TransferResult<()> {
        self.segments.push(name.to_string());
        Ok(())
    }

    async fn upload_file(&mut self, local: &Path, name: &str) -> TransferResult<u64> {
        let url = self.url_for(Some(name))?;
        debug!(local = %local.display(), url = %url, "Uploading via WebDAV");

        let content = tokio::fs::read(local).await?;
        let len = content.len() as u64;
        let response = self
            .request(Method::PUT, url)
            .body(content)
            .send()
            .await
            .map_err(request_error)?;

        if response.status().is_success() {
            Ok(len)
        } else {
            Err(status_error("PUT", &response))
        }
    }

    async fn download_file(&mut self, name: &str, local: &Path) -> TransferResult<Fetched> {
        let url = self.url_for(Some(name))?;
        debug!(url = %url, local = %local.display(), "Downloading via WebDAV");

        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(request_error)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(Fetched::Missing),
            status if status.is_success() => {
                let content = response.bytes().await.map_err(request_error)?;
                tokio::fs::write(local, &content).await?;
                Ok(Fetched::Found(content.len() as u64))
            }
            _ => Err(status_error("GET", &response)),
        }
    }

    async fn close(&mut self) -> TransferResult<()> {
        Ok(())
    }
}
