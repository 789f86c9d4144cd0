//! Access list cached in memory and persisted as a text file on the remote
//! store.
//!
//! The remote file holds comma separated decimal identities. It is read
//! once at startup and rewritten in full after every addition.

use crate::config::ACCESS_LIST_FILE;
use crate::error::{TransferError, TransferResult};
use crate::provision::ensure_base;
use crate::transport::{close_quietly, Fetched, RemoteSession, Transport};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::io::Write;
use std::num::ParseIntError;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of a grant request
#[derive(Debug)]
pub enum Grant {
    /// The identity was already on the list; nothing was written
    AlreadyPresent,
    /// Added and written to the remote file
    Persisted,
    /// Added in memory, but the remote write failed. The identity keeps
    /// access until the process restarts.
    LocalOnly(TransferError),
}

impl Grant {
    /// True only when the identity was added and persisted
    pub fn is_added(&self) -> bool {
        matches!(self, Grant::Persisted)
    }
}

/// Result of loading the remote list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The remote file was read; carries the number of identities cached
    Loaded(usize),
    /// No remote file yet
    Missing,
    /// Connection, transfer or parse failure; the cache was left as is
    Failed,
}

/// Parse the remote file format. Whitespace and empty items are ignored.
pub fn parse_ids(content: &str) -> Result<BTreeSet<i64>, ParseIntError> {
    content
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::parse)
        .collect()
}

/// Serialize in ascending order, without a trailing delimiter
pub fn format_ids(ids: &BTreeSet<i64>) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// In-memory access list backed by a remote file
pub struct AccessList {
    ids: RwLock<BTreeSet<i64>>,
    /// Serializes read-modify-write cycles against the remote file
    remote: Mutex<()>,
}

impl Default for AccessList {
    fn default() -> Self {
        Self::new()
    }
}

impl AccessList {
    pub fn new() -> Self {
        Self {
            ids: RwLock::new(BTreeSet::new()),
            remote: Mutex::new(()),
        }
    }

    /// Merge identities into the cache without touching the remote file
    pub fn seed(&self, ids: impl IntoIterator<Item = i64>) {
        self.ids.write().extend(ids);
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.read().contains(&id)
    }

    /// Current identities in ascending order
    pub fn snapshot(&self) -> Vec<i64> {
        self.ids.read().iter().copied().collect()
    }

    /// Replace the cache with the remote file's contents. Failures are
    /// logged and leave the cache unchanged.
    pub async fn sync_from_remote<T: Transport + ?Sized>(
        &self,
        transport: &T,
        base_folder: Option<&str>,
    ) -> SyncOutcome {
        let _guard = self.remote.lock().await;

        match self.load(transport, base_folder).await {
            Ok(Some(ids)) => {
                let count = ids.len();
                *self.ids.write() = ids;
                info!(count, "Loaded access list");
                SyncOutcome::Loaded(count)
            }
            Ok(None) => {
                info!(file = ACCESS_LIST_FILE, "No remote access list yet");
                SyncOutcome::Missing
            }
            Err(e) => {
                warn!(error = %e, "Could not load access list, keeping cached entries");
                SyncOutcome::Failed
            }
        }
    }

    async fn load<T: Transport + ?Sized>(
        &self,
        transport: &T,
        base_folder: Option<&str>,
    ) -> TransferResult<Option<BTreeSet<i64>>> {
        let temp = tempfile::NamedTempFile::new()?;
        let mut session = transport.connect().await?;
        let fetched = fetch(session.as_mut(), base_folder, temp.path()).await;
        close_quietly(session.as_mut()).await;

        match fetched? {
            Fetched::Missing => Ok(None),
            Fetched::Found(len) => {
                debug!(len, "Downloaded access list");
                let content = tokio::fs::read_to_string(temp.path()).await?;
                let ids = parse_ids(&content).map_err(|e| {
                    TransferError::RemoteIo(format!("malformed {}: {}", ACCESS_LIST_FILE, e))
                })?;
                Ok(Some(ids))
            }
        }
    }

    /// Add an identity and rewrite the remote file
    ///
    /// A failed write does not undo the in-memory addition.
    pub async fn add<T: Transport + ?Sized>(
        &self,
        transport: &T,
        base_folder: Option<&str>,
        id: i64,
    ) -> Grant {
        let _guard = self.remote.lock().await;

        let content = {
            let mut ids = self.ids.write();
            if !ids.insert(id) {
                return Grant::AlreadyPresent;
            }
            format_ids(&ids)
        };

        match persist(transport, base_folder, &content).await {
            Ok(()) => {
                info!(id, "Granted access");
                Grant::Persisted
            }
            Err(e) => {
                warn!(id, error = %e, "Granted access in memory only, remote write failed");
                Grant::LocalOnly(e)
            }
        }
    }
}

async fn fetch(
    session: &mut dyn RemoteSession,
    base_folder: Option<&str>,
    local: &std::path::Path,
) -> TransferResult<Fetched> {
    ensure_base(session, base_folder).await?;
    session.download_file(ACCESS_LIST_FILE, local).await
}

async fn persist<T: Transport + ?Sized>(
    transport: &T,
    base_folder: Option<&str>,
    content: &str,
) -> TransferResult<()> {
    let mut temp = tempfile::NamedTempFile::new()?;
    temp.write_all(content.as_bytes())?;
    temp.flush()?;

    let mut session = transport.connect().await?;
    let result = upload(session.as_mut(), base_folder, temp.path()).await;
    close_quietly(session.as_mut()).await;
    result
}

async fn upload(
    session: &mut dyn RemoteSession,
    base_folder: Option<&str>,
    local: &std::path::Path,
) -> TransferResult<()> {
    ensure_base(session, base_folder).await?;
    let len = session.upload_file(local, ACCESS_LIST_FILE).await?;
    debug!(len, dir = %session.current_dir(), "Wrote access list");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_parse_ids() {
        let ids = parse_ids("5,7,7,3").unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![3, 5, 7]);
        assert!(parse_ids("").unwrap().is_empty());
        assert_eq!(parse_ids(" 1 , 2,\n").unwrap().len(), 2);
        assert!(parse_ids("1,x").is_err());
    }

    #[test]
    fn test_format_ids() {
        let ids: BTreeSet<i64> = [9, -1, 4].into_iter().collect();
        assert_eq!(format_ids(&ids), "-1,4,9");
        assert_eq!(format_ids(&BTreeSet::new()), "");
    }

    #[tokio::test]
    async fn test_sync_dedupes() {
        let transport = MemoryTransport::new();
        transport.put("uploads/allowed_ids.txt", b"5,7,7,3".to_vec());

        let list = AccessList::new();
        let outcome = list.sync_from_remote(&transport, Some("uploads")).await;

        assert_eq!(outcome, SyncOutcome::Loaded(3));
        let mut ids = list.snapshot();
        ids.sort();
        assert_eq!(ids, vec![3, 5, 7]);
        assert!(list.contains(7));
        assert!(!list.contains(9));
        assert_eq!(transport.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_sync_missing_file_keeps_cache() {
        let transport = MemoryTransport::new();
        let list = AccessList::new();
        list.seed([1]);

        assert_eq!(
            list.sync_from_remote(&transport, Some("uploads")).await,
            SyncOutcome::Missing
        );
        assert_eq!(list.snapshot(), vec![1]);
        // provisioning the base folder is part of the load
        assert!(transport.is_dir("uploads"));
    }

    #[tokio::test]
    async fn test_sync_failures_keep_cache() {
        let transport = MemoryTransport::new();
        transport.put("allowed_ids.txt", b"1,two".to_vec());
        let list = AccessList::new();
        list.seed([42]);

        assert_eq!(list.sync_from_remote(&transport, None).await, SyncOutcome::Failed);
        assert_eq!(list.snapshot(), vec![42]);

        transport.set_offline(true);
        assert_eq!(list.sync_from_remote(&transport, None).await, SyncOutcome::Failed);
        assert_eq!(list.snapshot(), vec![42]);
    }

    #[tokio::test]
    async fn test_add_writes_whole_list() {
        let transport = MemoryTransport::new();
        let list = AccessList::new();
        list.seed([10]);

        let grant = list.add(&transport, Some("uploads"), 20).await;
        assert!(grant.is_added());
        assert_eq!(
            transport.file("uploads/allowed_ids.txt").unwrap().as_ref(),
            b"10,20"
        );
        assert_eq!(transport.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_add_twice_writes_once() {
        let transport = MemoryTransport::new();
        let list = AccessList::new();

        assert!(list.add(&transport, None, 7).await.is_added());
        let second = list.add(&transport, None, 7).await;
        assert!(matches!(second, Grant::AlreadyPresent));
        assert!(!second.is_added());
        assert_eq!(transport.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_add_failure_keeps_local_grant() {
        let transport = MemoryTransport::new();
        transport.set_reject_uploads(true);
        let list = AccessList::new();

        let grant = list.add(&transport, None, 5).await;
        assert!(matches!(grant, Grant::LocalOnly(TransferError::RemoteIo(_))));
        assert!(!grant.is_added());
        assert!(list.contains(5));
        assert!(transport.file("allowed_ids.txt").is_none());

        transport.set_reject_uploads(false);
        transport.set_offline(true);
        let grant = list.add(&transport, None, 6).await;
        assert!(matches!(grant, Grant::LocalOnly(ref e) if e.is_connection()));
        assert!(list.contains(6));
    }

    #[tokio::test]
    async fn test_add_then_sync_round_trips_through_remote() {
        let transport = MemoryTransport::new();
        let writer = AccessList::new();
        writer.add(&transport, Some("base"), 3).await;
        writer.add(&transport, Some("base"), 1).await;

        let reader = AccessList::new();
        reader.sync_from_remote(&transport, Some("base")).await;
        assert_eq!(reader.snapshot(), vec![1, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_are_all_persisted() {
        let transport = Arc::new(MemoryTransport::new());
        let list = Arc::new(AccessList::new());

        let tasks: Vec<_> = (1..=16)
            .map(|id| {
                let transport = transport.clone();
                let list = list.clone();
                tokio::spawn(async move { list.add(transport.as_ref(), Some("base"), id).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_added());
        }

        let expected: Vec<i64> = (1..=16).collect();
        assert_eq!(list.snapshot(), expected);

        let remote = transport.file("base/allowed_ids.txt").unwrap();
        let persisted = parse_ids(std::str::from_utf8(&remote).unwrap()).unwrap();
        assert_eq!(persisted.into_iter().collect::<Vec<_>>(), expected);
    }

    proptest! {
        #[test]
        fn prop_format_then_parse(ids in prop::collection::btree_set(any::<i64>(), 0..50)) {
            let text = format_ids(&ids);
            prop_assert!(!text.ends_with(','));
            prop_assert_eq!(parse_ids(&text).unwrap(), ids);
        }
    }
}
