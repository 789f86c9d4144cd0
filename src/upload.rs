use crate::error::StoreError;
use crate::provision::{display_path, ensure_path};
use crate::transport::{close_quietly, Transport};
use std::path::PathBuf;
use tracing::{debug, info};

/// A downloaded file waiting to be stored
///
/// The caller owns `local_path` and removes it once the job is done,
/// whatever the outcome.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub local_path: PathBuf,
    pub user_folder: String,
    pub file_name: String,
}

impl UploadJob {
    pub fn new(
        local_path: impl Into<PathBuf>,
        user_folder: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            local_path: local_path.into(),
            user_folder: user_folder.into(),
            file_name: file_name.into(),
        }
    }
}

/// A completed upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stored {
    /// Remote folder the file landed in, relative to the login root
    pub folder: String,
    pub file_name: String,
    pub bytes: u64,
}

/// Folder name for a sender: `first_last`, or just `first` without a last name
pub fn user_folder_name(first_name: &str, last_name: Option<&str>) -> String {
    let joined = format!("{}_{}", first_name.trim(), last_name.unwrap_or("").trim());
    joined.trim().trim_end_matches('_').to_string()
}

/// Remote file name for a media item: `{unique_id}.{ext}`, with the
/// extension taken from the source path
pub fn media_file_name(unique_id: &str, source_path: &str) -> String {
    let ext = source_path.rsplit('.').next().unwrap_or(source_path);
    format!("{}.{}", unique_id, ext)
}

/// Store a local file at `[base_folder/]user_folder/file_name`
///
/// The session is closed on every path once it has been opened.
pub async fn store<T: Transport + ?Sized>(
    transport: &T,
    base_folder: Option<&str>,
    job: &UploadJob,
) -> Result<Stored, StoreError> {
    let folder = display_path(base_folder, &job.user_folder);
    debug!(local = %job.local_path.display(), folder = %folder, file = %job.file_name, "Storing file");

    let mut session = transport.connect().await.map_err(StoreError::Connect)?;

    let result = async {
        ensure_path(session.as_mut(), base_folder, &job.user_folder)
            .await
            .map_err(|source| StoreError::Provision {
                path: folder.clone(),
                source,
            })?;

        session
            .upload_file(&job.local_path, &job.file_name)
            .await
            .map_err(|source| StoreError::Upload {
                path: format!("{}/{}", folder, job.file_name),
                source,
            })
    }
    .await;

    close_quietly(session.as_mut()).await;

    let bytes = result?;
    info!(folder = %folder, file = %job.file_name, bytes, "Stored file");

    Ok(Stored {
        folder,
        file_name: job.file_name.clone(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransferError;
    use crate::transport::MemoryTransport;
    use tempfile::TempDir;

    fn job_in(dir: &TempDir, content: &[u8]) -> UploadJob {
        let local = dir.path().join("temp_abc.jpg");
        std::fs::write(&local, content).unwrap();
        UploadJob::new(local, "Ivan_Petrov", "abc.jpg")
    }

    #[test]
    fn test_user_folder_name() {
        assert_eq!(user_folder_name("Ivan", Some("Petrov")), "Ivan_Petrov");
        assert_eq!(user_folder_name("Ivan", None), "Ivan");
        assert_eq!(user_folder_name(" Ivan ", Some("")), "Ivan");
    }

    #[test]
    fn test_media_file_name() {
        assert_eq!(media_file_name("AgADx", "photos/file_12.jpg"), "AgADx.jpg");
        assert_eq!(media_file_name("AgADx", "videos/clip.tar.mp4"), "AgADx.mp4");
        assert_eq!(media_file_name("AgADx", "noext"), "AgADx.noext");
    }

    #[tokio::test]
    async fn test_store_creates_folders_and_file() {
        let dir = TempDir::new().unwrap();
        let content = vec![0u8, 1, 2, 255, 254, 10, 13];
        let job = job_in(&dir, &content);
        let transport = MemoryTransport::new();

        let stored = store(&transport, Some("uploads"), &job).await.unwrap();

        assert_eq!(
            stored,
            Stored {
                folder: "uploads/Ivan_Petrov".to_string(),
                file_name: "abc.jpg".to_string(),
                bytes: content.len() as u64,
            }
        );
        assert!(transport.is_dir("uploads"));
        assert!(transport.is_dir("uploads/Ivan_Petrov"));
        assert_eq!(
            transport.file("uploads/Ivan_Petrov/abc.jpg").unwrap().as_ref(),
            content.as_slice()
        );
        assert_eq!(transport.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_store_without_base_folder() {
        let dir = TempDir::new().unwrap();
        let job = job_in(&dir, b"x");
        let transport = MemoryTransport::new();

        let stored = store(&transport, None, &job).await.unwrap();
        assert_eq!(stored.folder, "Ivan_Petrov");
        assert!(transport.file("Ivan_Petrov/abc.jpg").is_some());
    }

    #[tokio::test]
    async fn test_store_overwrites() {
        let dir = TempDir::new().unwrap();
        let transport = MemoryTransport::new();
        transport.put("Ivan_Petrov/abc.jpg", b"old content".to_vec());

        store(&transport, None, &job_in(&dir, b"new")).await.unwrap();
        assert_eq!(transport.file("Ivan_Petrov/abc.jpg").unwrap().as_ref(), b"new");
    }

    #[tokio::test]
    async fn test_store_unreachable_is_connection_error() {
        let dir = TempDir::new().unwrap();
        let job = job_in(&dir, b"x");
        let transport = MemoryTransport::new();
        transport.set_offline(true);

        let err = store(&transport, Some("uploads"), &job).await.unwrap_err();
        assert!(matches!(err, StoreError::Connect(_)));
        assert!(err.is_connection());
        // the local file is left for the caller to remove
        assert!(job.local_path.exists());
    }

    #[tokio::test]
    async fn test_store_reports_failing_step() {
        let dir = TempDir::new().unwrap();
        let transport = MemoryTransport::new();
        transport.set_reject_uploads(true);

        let err = store(&transport, Some("uploads"), &job_in(&dir, b"x"))
            .await
            .unwrap_err();
        match err {
            StoreError::Upload { ref path, source: TransferError::RemoteIo(_) } => {
                assert_eq!(path, "uploads/Ivan_Petrov/abc.jpg")
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(transport.open_sessions(), 0);

        let transport = MemoryTransport::new();
        transport.put("uploads/Ivan_Petrov", b"file".to_vec());
        let err = store(&transport, Some("uploads"), &job_in(&dir, b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Provision { .. }));
        assert!(!err.is_connection());
        assert_eq!(transport.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_store_missing_local_file() {
        let dir = TempDir::new().unwrap();
        let transport = MemoryTransport::new();
        let job = UploadJob::new(dir.path().join("gone"), "u", "f");

        let err = store(&transport, None, &job).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Upload { source: TransferError::LocalIo(_), .. }
        ));
    }
}
