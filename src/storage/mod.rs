// src/storage/mod.rs
use async_trait::async_trait;
use object_store::ObjectStore;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use url::Url;

use crate::config::StorageConfig;
use crate::error::Result;
use crate::table::TableLocation;

pub mod filesystem;
pub mod s3;

// Re-exports
pub use filesystem::FilesystemStorage;
pub use s3::S3Storage;

/// Shared connector handle passed to the table writer and reader.
pub type StorageRef = Arc<dyn StorageBackend>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketStatus {
    Created,
    AlreadyExists,
}

#[async_trait]
pub trait StorageBackend: Debug + Send + Sync {
    // Bucket management
    async fn ensure_bucket(&self, bucket: &str) -> Result<BucketStatus>;
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;
    async fn list_buckets(&self) -> Result<Vec<String>>;

    // Path construction
    fn table_url(&self, location: &TableLocation) -> Result<Url>;

    /// Options handed to deltalake when opening or creating a table.
    fn storage_options(&self) -> HashMap<String, String>;

    /// Object store rooted at `bucket`; paths are relative to the bucket.
    fn object_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>>;
}

/// Build the backend named by the configuration. S3 backends verify the
/// endpoint and credentials before returning.
pub async fn connect(config: &StorageConfig) -> Result<StorageRef> {
    match config {
        StorageConfig::S3(store) => Ok(Arc::new(S3Storage::connect(store).await?)),
        StorageConfig::Filesystem { root, .. } => Ok(Arc::new(FilesystemStorage::new(root)?)),
    }
}
