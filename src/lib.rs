pub mod config;
pub mod error;
pub mod generator;
pub mod logging;
pub mod row;
pub mod storage;
pub mod table;

pub use config::{AppConfig, StoreConfig};
pub use error::{Error, Result};
pub use generator::{generate, Generator};
pub use row::Row;
pub use storage::{BucketStatus, StorageBackend, StorageRef};
pub use table::{PartitionFilter, TableLocation, TableReader, TableWriter, WriteMode};
