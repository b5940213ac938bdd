//! Partitioned Delta table reads and table inspection.

use std::sync::Arc;

use datafusion::dataframe::DataFrame;
use datafusion::prelude::{col, lit, SessionContext};
use deltalake::DeltaTable;
use futures::TryStreamExt;
use object_store::path::Path as ObjectPath;
use serde::Serialize;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use super::{ensure_handlers_registered, PartitionFilter, TableLocation};
use crate::error::{Error, Result};
use crate::logging::current_dispatch;
use crate::row::{rows_from_batches, Row};
use crate::storage::{StorageBackend, StorageRef};

const DELTA_LOG_DIR: &str = "_delta_log";

/// Summary of a Delta table's current snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TableMetadata {
    pub version: i64,
    pub partition_columns: Vec<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Milliseconds since the epoch.
    pub created_time: Option<i64>,
    /// Arrow schema of the table, serialized as JSON.
    pub schema: serde_json::Value,
}

/// Reads Delta tables into DataFusion dataframes.
#[derive(Debug, Clone)]
pub struct TableReader {
    storage: StorageRef,
    dispatch: Dispatch,
}

impl TableReader {
    pub fn new(storage: StorageRef) -> Self {
        ensure_handlers_registered();
        Self {
            storage,
            dispatch: current_dispatch(),
        }
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Read the table, optionally restricted to one partition.
    pub async fn read(
        &self,
        location: &TableLocation,
        filter: Option<PartitionFilter>,
    ) -> Result<DataFrame> {
        async move {
            tracing::info!(%location, ?filter, "Reading Delta table");

            let result = self.try_read(location, filter).await;
            match &result {
                Ok(_) => tracing::info!(%location, "Delta table read successfully"),
                Err(e) => tracing::error!(%location, error = %e, "Error reading Delta table"),
            }
            result
        }
        .with_subscriber(self.dispatch.clone())
        .await
    }

    /// Read the table and collect it into rows.
    pub async fn read_rows(
        &self,
        location: &TableLocation,
        filter: Option<PartitionFilter>,
    ) -> Result<Vec<Row>> {
        let batches = self
            .read(location, filter)
            .await?
            .collect()
            .await
            .map_err(|e| Error::Read(e.to_string()))?;
        rows_from_batches(&batches)
    }

    pub async fn is_delta_table(&self, location: &TableLocation) -> Result<bool> {
        async move {
            tracing::info!(%location, "Checking for Delta table");

            let result = is_delta_table(self.storage.as_ref(), location).await;
            match &result {
                Ok(true) => tracing::info!(%location, "Location contains a valid Delta table"),
                Ok(false) => tracing::warn!(
                    %location,
                    "Location does not contain a Delta table or does not exist"
                ),
                Err(e) => tracing::error!(%location, error = %e, "Delta table check failed"),
            }
            result
        }
        .with_subscriber(self.dispatch.clone())
        .await
    }

    pub async fn metadata(&self, location: &TableLocation) -> Result<TableMetadata> {
        async move {
            let result = self.try_metadata(location).await;
            match &result {
                Ok(metadata) => tracing::info!(
                    %location,
                    version = metadata.version,
                    "Loaded Delta table metadata"
                ),
                Err(e) => {
                    tracing::error!(%location, error = %e, "Error reading Delta table metadata")
                }
            }
            result
        }
        .with_subscriber(self.dispatch.clone())
        .await
    }

    async fn try_read(
        &self,
        location: &TableLocation,
        filter: Option<PartitionFilter>,
    ) -> Result<DataFrame> {
        let table = self.load_existing(location).await?;

        let ctx = SessionContext::new();
        let mut df = ctx
            .read_table(Arc::new(table))
            .map_err(|e| Error::Read(e.to_string()))?;

        for (column, value) in filter.unwrap_or_default().predicates() {
            df = df
                .filter(col(column).eq(lit(value)))
                .map_err(|e| Error::Read(e.to_string()))?;
        }

        Ok(df)
    }

    async fn try_metadata(&self, location: &TableLocation) -> Result<TableMetadata> {
        let table = self.load_existing(location).await?;
        let version = table.version().unwrap_or(-1);

        let snapshot = table.snapshot().map_err(|e| Error::Read(e.to_string()))?;
        let metadata = snapshot.metadata();
        let partition_columns = metadata.partition_columns().to_vec();
        let name = metadata.name().map(str::to_string);
        let description = metadata.description().map(str::to_string);
        let created_time = metadata.created_time();

        let ctx = SessionContext::new();
        let df = ctx
            .read_table(Arc::new(table))
            .map_err(|e| Error::Read(e.to_string()))?;
        let schema = serde_json::to_value(df.schema().as_arrow())
            .map_err(|e| Error::Read(e.to_string()))?;

        Ok(TableMetadata {
            version,
            partition_columns,
            name,
            description,
            created_time,
            schema,
        })
    }

    async fn load_existing(&self, location: &TableLocation) -> Result<DeltaTable> {
        if !is_delta_table(self.storage.as_ref(), location)
            .await
            .map_err(into_read_error)?
        {
            return Err(Error::Read(format!("table not found at {}", location)));
        }
        let table = open_table(self.storage.as_ref(), location)
            .await
            .map_err(into_read_error)?;
        tracing::debug!(
            %location,
            version = table.version().unwrap_or(-1),
            "Loaded Delta table"
        );
        Ok(table)
    }
}

fn into_read_error(e: Error) -> Error {
    match e {
        Error::Permission(_) | Error::InvalidArgument(_) | Error::Read(_) => e,
        other => Error::Read(other.to_string()),
    }
}

/// A location holds a Delta table when its `_delta_log/` directory has at
/// least one entry.
pub(crate) async fn is_delta_table(
    storage: &dyn StorageBackend,
    location: &TableLocation,
) -> Result<bool> {
    if !storage.bucket_exists(location.bucket()).await? {
        return Ok(false);
    }

    let store = storage.object_store(location.bucket())?;
    let log_prefix = ObjectPath::from(format!("{}/{}", location.prefix(), DELTA_LOG_DIR));

    let first = store
        .list(Some(&log_prefix))
        .try_next()
        .await
        .map_err(|e| Error::Read(e.to_string()))?;
    Ok(first.is_some())
}

pub(crate) async fn open_table(
    storage: &dyn StorageBackend,
    location: &TableLocation,
) -> Result<DeltaTable> {
    let url = storage.table_url(location)?;
    deltalake::open_table_with_storage_options(url, storage.storage_options())
        .await
        .map_err(|e| Error::Read(e.to_string()))
}
