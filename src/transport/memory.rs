use super::{join_path, normalize_path, Fetched, Provisioned, RemoteSession, Transport};
use crate::error::{TransferError, TransferResult};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared tree behind every session of a [`MemoryTransport`]
#[derive(Default)]
struct Tree {
    files: RwLock<HashMap<String, Bytes>>,
    dirs: RwLock<HashSet<String>>,
    offline: AtomicBool,
    reject_uploads: AtomicBool,
    uploads: AtomicUsize,
    open_sessions: AtomicUsize,
}

/// In-memory remote store for tests and dry runs
///
/// Clones share the same tree, so a test can keep one handle for
/// inspection while the code under test connects through another.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    tree: Arc<Tree>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with pre-populated files, keyed by full remote path
    pub fn with_files(files: HashMap<String, Vec<u8>>) -> Self {
        let transport = Self::new();
        for (path, content) in files {
            transport.put(&path, content);
        }
        transport
    }

    /// Write a file directly, creating its parent directories
    pub fn put(&self, path: &str, content: impl Into<Bytes>) {
        let path = normalize_path(path);
        {
            let mut dirs = self.tree.dirs.write();
            let mut parent = path.as_str();
            while let Some((dir, _)) = parent.rsplit_once('/') {
                dirs.insert(dir.to_string());
                parent = dir;
            }
        }
        self.tree.files.write().insert(path, content.into());
    }

    pub fn file(&self, path: &str) -> Option<Bytes> {
        self.tree.files.read().get(&normalize_path(path)).cloned()
    }

    pub fn is_dir(&self, path: &str) -> bool {
        let path = normalize_path(path);
        path.is_empty() || self.tree.dirs.read().contains(&path)
    }

    /// Refuse new connections, as an unreachable host would
    pub fn set_offline(&self, offline: bool) {
        self.tree.offline.store(offline, Ordering::SeqCst);
    }

    /// Fail every upload with a remote I/O error
    pub fn set_reject_uploads(&self, reject: bool) {
        self.tree.reject_uploads.store(reject, Ordering::SeqCst);
    }

    /// Number of successful uploads so far
    pub fn upload_count(&self) -> usize {
        self.tree.uploads.load(Ordering::SeqCst)
    }

    /// Sessions connected but not yet closed
    pub fn open_sessions(&self) -> usize {
        self.tree.open_sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> TransferResult<Box<dyn RemoteSession>> {
        if self.tree.offline.load(Ordering::SeqCst) {
            return Err(TransferError::Connection(
                "memory store is offline".to_string(),
            ));
        }
        self.tree.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            tree: self.tree.clone(),
            cwd: String::new(),
            closed: false,
        }))
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

struct MemorySession {
    tree: Arc<Tree>,
    cwd: String,
    closed: bool,
}

#[async_trait]
impl RemoteSession for MemorySession {
    fn current_dir(&self) -> String {
        format!("/{}", self.cwd)
    }

    async fn exists(&mut self, name: &str) -> TransferResult<bool> {
        let path = join_path(&self.cwd, name);
        Ok(self.tree.dirs.read().contains(&path) || self.tree.files.read().contains_key(&path))
    }

    async fn make_dir(&mut self, name: &str) -> TransferResult<Provisioned> {
        let path = join_path(&self.cwd, name);
        if self.tree.files.read().contains_key(&path) {
            return Err(TransferError::RemoteIo(format!("{} is a file", path)));
        }
        if self.tree.dirs.write().insert(path) {
            Ok(Provisioned::Created)
        } else {
            Ok(Provisioned::Existing)
        }
    }

    async fn change_dir(&mut self, name: &str) -> TransferResult<()> {
        let path = join_path(&self.cwd, name);
        if !self.tree.dirs.read().contains(&path) {
            return Err(TransferError::RemoteIo(format!("no such directory: {}", path)));
        }
        self.cwd = path;
        Ok(())
    }

    async fn upload_file(&mut self, local: &Path, name: &str) -> TransferResult<u64> {
        if self.tree.reject_uploads.load(Ordering::SeqCst) {
            return Err(TransferError::RemoteIo("upload rejected".to_string()));
        }
        let content = tokio::fs::read(local).await?;
        let len = content.len() as u64;
        self.tree
            .files
            .write()
            .insert(join_path(&self.cwd, name), Bytes::from(content));
        self.tree.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(len)
    }

    async fn download_file(&mut self, name: &str, local: &Path) -> TransferResult<Fetched> {
        let content = self.tree.files.read().get(&join_path(&self.cwd, name)).cloned();
        match content {
            Some(content) => {
                tokio::fs::write(local, &content).await?;
                Ok(Fetched::Found(content.len() as u64))
            }
            None => Ok(Fetched::Missing),
        }
    }

    async fn close(&mut self) -> TransferResult<()> {
        if !self.closed {
            self.closed = true;
            self.tree.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
