// src/storage/filesystem.rs
use async_trait::async_trait;
use object_store::local::LocalFileSystem;
use object_store::ObjectStore;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use super::{BucketStatus, StorageBackend};
use crate::config::validate_bucket_name;
use crate::error::{Error, Result};
use crate::table::TableLocation;

/// Local stand-in for an object store: each directory directly under `root`
/// is a bucket.
#[derive(Debug)]
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| io_error(root, e))?;
        // Delta needs absolute file:// URLs
        let root = std::fs::canonicalize(root).map_err(|e| io_error(root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_path(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }
}

fn io_error(path: &Path, e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::PermissionDenied => Error::Permission(format!("{}: {}", path.display(), e)),
        _ => Error::Connection(format!("{}: {}", path.display(), e)),
    }
}

#[async_trait]
impl StorageBackend for FilesystemStorage {
    async fn ensure_bucket(&self, bucket: &str) -> Result<BucketStatus> {
        validate_bucket_name(bucket).map_err(|e| Error::InvalidArgument(e.to_string()))?;
        let path = self.bucket_path(bucket);

        match tokio::fs::create_dir(&path).await {
            Ok(()) => {
                tracing::info!(bucket, "Bucket created");
                Ok(BucketStatus::Created)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => {
                tracing::info!(bucket, "Bucket already exists");
                Ok(BucketStatus::AlreadyExists)
            }
            Err(e) => {
                tracing::error!(bucket, error = %e, "Failed to check/create bucket");
                Err(io_error(&path, e))
            }
        }
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.bucket_path(bucket).is_dir())
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| io_error(&self.root, e))?;

        let mut buckets = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.root, e))?
        {
            if entry.path().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    buckets.push(name.to_string());
                }
            }
        }
        buckets.sort();
        Ok(buckets)
    }

    fn table_url(&self, location: &TableLocation) -> Result<Url> {
        let path = self
            .bucket_path(location.bucket())
            .join(location.prefix());
        Url::from_directory_path(&path).map_err(|_| {
            Error::InvalidArgument(format!("cannot build file URL for {}", path.display()))
        })
    }

    fn storage_options(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    fn object_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let store = LocalFileSystem::new_with_prefix(self.bucket_path(bucket))
            .map_err(|e| Error::Connection(e.to_string()))?;
        Ok(Arc::new(store))
    }
}
