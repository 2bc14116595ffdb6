//! Object storage for media files.
//!
//! The catalog talks to storage through the [`ObjectStore`] trait, which
//! exposes the four operations the media library relies on: upload without
//! overwrite, paged listing of a folder, public URL resolution and removal of
//! a batch of paths. [`LocalObjectStore`] implements it on the local
//! filesystem.
//!
//! # File Organization
//!
//! ```text
//! data/
//! └── media/                       # bucket
//!     └── uploads/                 # folder
//!         ├── 1700000000000-hero-banner.jpg
//!         └── 1700000000123-red-shoes.webp
//! ```
//!
//! Paths handed to the store are relative to the bucket root
//! (`uploads/1700000000000-hero-banner.jpg`).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// One entry of a folder listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageObject {
    /// Object name inside the listed folder
    pub name: String,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StorageObject {
    /// Storage path of this object given the folder it was listed from
    pub fn path_in(&self, folder: &str) -> String {
        join_path(folder, &self.name)
    }
}

/// Join a folder and a name into a bucket-relative path
pub fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder, name)
    }
}

/// Object storage abstraction used by the catalog
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object; fails with `AlreadyExists` instead of overwriting
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> StorageResult<()>;

    /// List up to `limit` objects directly inside `folder`
    async fn list(&self, folder: &str, limit: usize) -> StorageResult<Vec<StorageObject>>;

    /// Publicly reachable URL of an object
    fn public_url(&self, path: &str) -> String;

    /// Remove objects; returns the paths that existed and were removed
    async fn remove(&self, paths: &[String]) -> StorageResult<Vec<String>>;

    /// Read an object's bytes
    async fn download(&self, path: &str) -> StorageResult<Bytes>;
}

/// Filesystem-backed object store rooted at the bucket directory
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base: String,
}

impl LocalObjectStore {
    /// Create the store and make sure the bucket directory exists
    ///
    /// # Arguments
    /// * `config` - Storage configuration
    /// * `base_url` - Server base URL, objects are served under `/storage`
    pub async fn new(config: &StorageConfig, base_url: &str) -> StorageResult<Self> {
        let root = config.bucket_path();
        fs::create_dir_all(root.join(config.folder.trim_matches('/'))).await?;

        info!(
            root = %root.display(),
            folder = %config.folder,
            "Object store initialized"
        );

        Ok(Self {
            root,
            public_base: format!("{}/storage", base_url.trim_end_matches('/')),
        })
    }

    /// Resolve a bucket-relative path, rejecting anything that escapes the root
    pub fn object_path(&self, path: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(path);
        let valid = !path.is_empty()
            && !path.contains('\\')
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !valid {
            return Err(StorageError::InvalidPath(path.to_string()));
        }

        Ok(self.root.join(relative))
    }

    /// Get storage statistics
    pub async fn stats(&self) -> StorageResult<StorageStats> {
        let (object_count, total_size) = Self::dir_usage(&self.root).await?;
        Ok(StorageStats {
            object_count,
            total_size,
        })
    }

    /// Count files and bytes below a directory
    async fn dir_usage(path: &Path) -> StorageResult<(usize, u64)> {
        let mut count = 0;
        let mut total = 0;

        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok((0, 0));
        }

        let mut entries = fs::read_dir(path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                count += 1;
                total += metadata.len();
            } else if metadata.is_dir() {
                let (c, t) = Box::pin(Self::dir_usage(&entry.path())).await?;
                count += c;
                total += t;
            }
        }

        Ok((count, total))
    }
}

/// Remove an object whose contents could not be fully written
async fn discard_partial(file_path: &Path, err: std::io::Error) -> StorageError {
    if let Err(cleanup) = fs::remove_file(file_path).await {
        warn!(
            path = %file_path.display(),
            error = %cleanup,
            "Failed to remove partially written object"
        );
    }
    StorageError::Io(err)
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload(&self, path: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        let file_path = self.object_path(path)?;

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.to_string()),
                _ => StorageError::Io(e),
            })?;

        let written = async {
            file.write_all(&data).await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            drop(file);
            return Err(discard_partial(&file_path, e).await);
        }

        debug!(
            path = %path,
            size = data.len(),
            content_type = %content_type,
            "Stored object"
        );

        Ok(())
    }

    async fn list(&self, folder: &str, limit: usize) -> StorageResult<Vec<StorageObject>> {
        let dir = self.object_path(folder.trim_matches('/'))?;

        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut objects = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();

            // Placeholder and temp files are not media
            if name.starts_with('.') {
                continue;
            }

            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }

            let updated_at = metadata.modified().ok().map(DateTime::<Utc>::from);
            let created_at = metadata
                .created()
                .ok()
                .map(DateTime::<Utc>::from)
                .or(updated_at);

            objects.push(StorageObject {
                mime_type: mime_guess::from_path(&name).first().map(|m| m.to_string()),
                name,
                size: Some(metadata.len()),
                created_at,
                updated_at,
            });
        }

        // Names start with a millisecond timestamp, so this is newest first
        objects.sort_by(|a, b| b.name.cmp(&a.name));
        objects.truncate(limit);

        debug!(folder = %folder, count = objects.len(), "Listed objects");

        Ok(objects)
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base, path.trim_start_matches('/'))
    }

    async fn remove(&self, paths: &[String]) -> StorageResult<Vec<String>> {
        let mut removed = Vec::new();

        for path in paths {
            let file_path = self.object_path(path)?;

            if !fs::try_exists(&file_path).await.unwrap_or(false) {
                continue;
            }

            fs::remove_file(&file_path)
                .await
                .map_err(|e| StorageError::Backend(format!("Failed to remove {}: {}", path, e)))?;

            debug!(path = %path, "Removed object");
            removed.push(path.clone());
        }

        Ok(removed)
    }

    async fn download(&self, path: &str) -> StorageResult<Bytes> {
        let file_path = self.object_path(path)?;

        if !fs::try_exists(&file_path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(path.to_string()));
        }

        Ok(Bytes::from(fs::read(&file_path).await?))
    }
}

/// Storage statistics
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    /// Number of objects in the bucket
    pub object_count: usize,
    /// Total size of all objects in bytes
    pub total_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_store() -> (LocalObjectStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            data_dir: temp_dir.path().to_path_buf(),
            bucket: "media".to_string(),
            folder: "uploads".to_string(),
        };

        let store = LocalObjectStore::new(&config, "http://localhost:3000")
            .await
            .unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_upload_and_download() {
        let (store, _temp) = create_test_store().await;
        let data = Bytes::from_static(b"test image data");

        store
            .upload("uploads/1-a.png", data.clone(), "image/png")
            .await
            .unwrap();

        let read = store.download("uploads/1-a.png").await.unwrap();
        assert_eq!(read, data);
    }

    #[tokio::test]
    async fn test_partial_write_is_discarded() {
        let (store, _temp) = create_test_store().await;
        let file_path = store.object_path("uploads/1-partial.png").unwrap();
        fs::write(&file_path, b"half").await.unwrap();

        let err = discard_partial(
            &file_path,
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        )
        .await;

        assert!(matches!(err, StorageError::Io(_)));
        assert!(!fs::try_exists(&file_path).await.unwrap());
        assert!(store.download("uploads/1-partial.png").await.is_err());
    }

    #[tokio::test]
    async fn test_upload_does_not_overwrite() {
        let (store, _temp) = create_test_store().await;

        store
            .upload("uploads/1-a.png", Bytes::from_static(b"first"), "image/png")
            .await
            .unwrap();
        let err = store
            .upload("uploads/1-a.png", Bytes::from_static(b"second"), "image/png")
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::AlreadyExists(_)));
        let read = store.download("uploads/1-a.png").await.unwrap();
        assert_eq!(&read[..], b"first");
    }

    #[tokio::test]
    async fn test_list_skips_placeholders_and_limits() {
        let (store, temp) = create_test_store().await;

        for name in ["1-a.png", "2-b.jpg", "3-c.gif"] {
            store
                .upload(&join_path("uploads", name), Bytes::from_static(b"x"), "image/png")
                .await
                .unwrap();
        }
        std::fs::write(
            temp.path().join("media/uploads/.emptyFolderPlaceholder"),
            b"",
        )
        .unwrap();

        let all = store.list("uploads", 100).await.unwrap();
        let names: Vec<_> = all.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["3-c.gif", "2-b.jpg", "1-a.png"]);
        assert_eq!(all[1].mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(all[0].size, Some(1));

        let limited = store.list("uploads", 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_reports_existing_paths_only() {
        let (store, _temp) = create_test_store().await;
        store
            .upload("uploads/1-a.png", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap();

        let removed = store
            .remove(&["uploads/1-a.png".to_string(), "uploads/missing.png".to_string()])
            .await
            .unwrap();

        assert_eq!(removed, vec!["uploads/1-a.png".to_string()]);
        assert!(matches!(
            store.download("uploads/1-a.png").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (store, _temp) = create_test_store().await;

        assert!(store.object_path("../secret").is_err());
        assert!(store.object_path("/etc/passwd").is_err());
        assert!(store.object_path("").is_err());
        assert!(store.object_path("uploads/ok.png").is_ok());
    }

    #[tokio::test]
    async fn test_public_url() {
        let (store, _temp) = create_test_store().await;
        assert_eq!(
            store.public_url("uploads/1-a.png"),
            "http://localhost:3000/storage/uploads/1-a.png"
        );
    }
}
