use crate::access::{AccessList, Grant, SyncOutcome};
use crate::config::StoreConfig;
use crate::error::{StoreError, TransferResult};
use crate::transport::{TransferClient, Transport};
use crate::upload::{self, Stored, UploadJob};
use std::sync::Arc;
use tracing::info;

/// Remote file store with its access list
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct RemoteStore<T: Transport> {
    transport: Arc<T>,
    base_folder: Option<String>,
    /// Configured identities, merged back after every remote load
    seed_ids: Vec<i64>,
    access: AccessList,
}

impl RemoteStore<TransferClient> {
    /// Build a store for the protocol named by the configured descriptor
    pub fn from_config(config: StoreConfig) -> Self {
        let StoreConfig {
            descriptor,
            base_folder,
            seed_ids,
            timeouts,
        } = config;
        Self::new(TransferClient::new(descriptor, timeouts))
            .base_folder(base_folder)
            .seed_ids(seed_ids)
    }
}

impl<T: Transport> RemoteStore<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(transport),
            base_folder: None,
            seed_ids: Vec::new(),
            access: AccessList::new(),
        }
    }

    pub fn base_folder(mut self, folder: Option<String>) -> Self {
        self.base_folder = folder
            .map(|f| f.trim().trim_matches('/').to_string())
            .filter(|f| !f.is_empty());
        self
    }

    /// Identities that always have access, whatever the remote list says
    pub fn seed_ids(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.seed_ids.extend(ids);
        self.access.seed(self.seed_ids.iter().copied());
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Load the remote access list; call once at startup
    pub async fn warm_up(&self) -> SyncOutcome {
        info!(target_store = %self.transport.describe(), "Loading access list");
        let outcome = self
            .access
            .sync_from_remote(self.transport.as_ref(), self.base_folder.as_deref())
            .await;
        self.access.seed(self.seed_ids.iter().copied());
        outcome
    }

    /// Store a downloaded file under its user folder
    pub async fn store(&self, job: &UploadJob) -> Result<Stored, StoreError> {
        upload::store(self.transport.as_ref(), self.base_folder.as_deref(), job).await
    }

    /// Add an identity to the access list
    pub async fn grant_access(&self, id: i64) -> Grant {
        self.access
            .add(self.transport.as_ref(), self.base_folder.as_deref(), id)
            .await
    }

    pub fn has_access(&self, id: i64) -> bool {
        self.access.contains(id)
    }

    /// Identities on the access list, ascending
    pub fn list_access(&self) -> Vec<i64> {
        self.access.snapshot()
    }

    /// Check that the remote store is reachable
    pub async fn probe(&self) -> TransferResult<()> {
        self.transport.probe().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ConnectionDescriptor, Credentials, Scheme};
    use crate::transport::MemoryTransport;
    use tempfile::TempDir;

    fn store_with(transport: &MemoryTransport) -> RemoteStore<MemoryTransport> {
        RemoteStore::new(transport.clone()).base_folder(Some("/uploads/".to_string()))
    }

    #[tokio::test]
    async fn test_warm_up_then_check() {
        let transport = MemoryTransport::new();
        transport.put("uploads/allowed_ids.txt", b"5,7,7,3".to_vec());
        let store = store_with(&transport);

        assert_eq!(store.warm_up().await, SyncOutcome::Loaded(3));
        assert!(store.has_access(7));
        assert!(!store.has_access(9));
        let mut ids = store.list_access();
        ids.sort();
        assert_eq!(ids, vec![3, 5, 7]);
    }

    #[tokio::test]
    async fn test_grant_is_visible_and_persisted() {
        let transport = MemoryTransport::new();
        let store = store_with(&transport);
        store.warm_up().await;

        assert!(store.grant_access(11).await.is_added());
        assert!(!store.grant_access(11).await.is_added());
        assert!(store.has_access(11));
        assert_eq!(transport.upload_count(), 1);
        assert_eq!(
            transport.file("uploads/allowed_ids.txt").unwrap().as_ref(),
            b"11"
        );
    }

    #[tokio::test]
    async fn test_store_and_probe() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("temp_x.png");
        std::fs::write(&local, b"png").unwrap();

        let transport = MemoryTransport::new();
        let store = store_with(&transport);
        store.probe().await.unwrap();

        let stored = store
            .store(&UploadJob::new(&local, "Anna", "x.png"))
            .await
            .unwrap();
        assert_eq!(stored.folder, "uploads/Anna");
        assert!(transport.file("uploads/Anna/x.png").is_some());

        transport.set_offline(true);
        assert!(store.probe().await.unwrap_err().is_connection());
    }

    #[tokio::test]
    async fn test_seeds_survive_warm_up() {
        let transport = MemoryTransport::new();
        transport.put("uploads/allowed_ids.txt", b"5".to_vec());
        let store = store_with(&transport).seed_ids([100]);

        store.warm_up().await;
        assert_eq!(store.list_access(), vec![5, 100]);

        store.grant_access(6).await;
        assert_eq!(
            transport.file("uploads/allowed_ids.txt").unwrap().as_ref(),
            b"5,6,100"
        );
    }

    #[tokio::test]
    async fn test_nested_base_folder() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("temp_y.jpg");
        std::fs::write(&local, b"jpg").unwrap();

        let transport = MemoryTransport::new();
        let store =
            RemoteStore::new(transport.clone()).base_folder(Some("media/bot".to_string()));
        store.warm_up().await;

        for name in ["y.jpg", "z.jpg"] {
            let stored = store
                .store(&UploadJob::new(&local, "Anna", name))
                .await
                .unwrap();
            assert_eq!(stored.folder, "media/bot/Anna");
        }
        assert!(store.grant_access(4).await.is_added());
        assert!(store.grant_access(8).await.is_added());

        assert!(transport.file("media/bot/Anna/z.jpg").is_some());
        assert_eq!(
            transport.file("media/bot/allowed_ids.txt").unwrap().as_ref(),
            b"4,8"
        );
    }

    #[test]
    fn test_from_config_seeds_and_selects_protocol() {
        let descriptor = ConnectionDescriptor::parse(
            "webdav-secure://cloud.example.com/dav",
            Credentials::new("u", "p"),
        );
        let config = StoreConfig::new(descriptor)
            .base_folder("uploads")
            .seed_ids([1, 2]);
        let store = RemoteStore::from_config(config);

        assert_eq!(store.transport().scheme(), Scheme::WebDavSecure);
        assert_eq!(store.list_access(), vec![1, 2]);
        assert_eq!(store.base_folder.as_deref(), Some("uploads"));
    }
}
