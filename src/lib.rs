//! # remote-stash
//!
//! Store files on a remote FTP, SFTP or WebDAV server, and keep a small
//! access list on that same server.
//!
//! The protocol is picked from the connection string prefix:
//! `ssh-file://`, `webdav://`, `webdav-secure://`, or nothing for FTP.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use remote_stash::{RemoteStore, StoreConfig, UploadJob};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let store = RemoteStore::from_config(StoreConfig::from_env()?);
//!     store.warm_up().await;
//!
//!     if store.has_access(42) {
//!         let job = UploadJob::new("/tmp/temp_abc.jpg", "Ivan_Petrov", "abc.jpg");
//!         let stored = store.store(&job).await?;
//!         println!("saved to {}", stored.folder);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Testing against memory
//!
//! ```rust
//! use remote_stash::{MemoryTransport, RemoteStore};
//!
//! # tokio_test::block_on(async {
//! let transport = MemoryTransport::new();
//! let store = RemoteStore::new(transport.clone()).base_folder(Some("uploads".into()));
//! assert!(store.grant_access(7).await.is_added());
//! assert!(transport.file("uploads/allowed_ids.txt").is_some());
//! # });
//! ```

pub mod access;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod provision;
pub mod store;
pub mod transport;
pub mod upload;

// Re-exports for convenience
pub use access::{AccessList, Grant, SyncOutcome};
pub use config::{StoreConfig, Timeouts, ACCESS_LIST_FILE};
pub use descriptor::{ConnectionDescriptor, Credentials, Scheme};
pub use error::{ConfigError, Error, StoreError, TransferError};
pub use store::RemoteStore;
pub use transport::{MemoryTransport, RemoteSession, TransferClient, Transport};
pub use upload::{media_file_name, user_folder_name, Stored, UploadJob};
