//! Partitioned Delta table writes.

use datafusion::arrow::record_batch::RecordBatch;
use datafusion::prelude::SessionContext;
use deltalake::kernel::engine::arrow_conversion::TryIntoKernel;
use deltalake::kernel::{DataType as DeltaType, StructField, StructType};
use deltalake::operations::create::CreateBuilder;
use deltalake::{DeltaOps, DeltaTable};
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use super::partition::{with_partition_columns, PARTITION_COLUMNS};
use super::reader::{is_delta_table, open_table};
use super::{ensure_handlers_registered, TableLocation, WriteMode, DEFAULT_DATE_COLUMN};
use crate::error::{Error, Result};
use crate::logging::current_dispatch;
use crate::row::{rows_to_record_batch, Row};
use crate::storage::StorageRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Table version created by this write.
    pub version: i64,
    pub rows_written: usize,
}

/// Writes batches into Delta tables partitioned by `year`/`month`/`day`.
#[derive(Debug, Clone)]
pub struct TableWriter {
    storage: StorageRef,
    date_column: String,
    dispatch: Dispatch,
}

impl TableWriter {
    pub fn new(storage: StorageRef) -> Self {
        ensure_handlers_registered();
        Self {
            storage,
            date_column: DEFAULT_DATE_COLUMN.to_string(),
            dispatch: current_dispatch(),
        }
    }

    pub fn with_date_column(mut self, column: impl Into<String>) -> Self {
        self.date_column = column.into();
        self
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub async fn write(
        &self,
        location: &TableLocation,
        rows: &[Row],
        mode: WriteMode,
    ) -> Result<WriteOutcome> {
        let batch = rows_to_record_batch(rows).map_err(|e| Error::Write(e.to_string()))?;
        self.write_batch(location, batch, mode).await
    }

    pub async fn write_batch(
        &self,
        location: &TableLocation,
        batch: RecordBatch,
        mode: WriteMode,
    ) -> Result<WriteOutcome> {
        async move {
            tracing::info!(%location, %mode, rows = batch.num_rows(), "Writing Delta table");

            let result = self.try_write(location, batch, mode).await;
            match &result {
                Ok(outcome) => tracing::info!(
                    %location,
                    version = outcome.version,
                    rows = outcome.rows_written,
                    "Delta table write successful"
                ),
                Err(e) => tracing::error!(%location, error = %e, "Error writing Delta table"),
            }
            result
        }
        .with_subscriber(self.dispatch.clone())
        .await
    }

    /// Merge `batch` into an existing table keyed on `id_column`: matching
    /// rows are updated, new rows inserted, and target rows missing from
    /// `batch` deleted.
    pub async fn upsert(
        &self,
        location: &TableLocation,
        batch: RecordBatch,
        id_column: &str,
    ) -> Result<WriteOutcome> {
        async move {
            tracing::info!(%location, id_column, "Initiating upsert on Delta table");

            let result = self.try_upsert(location, batch, id_column).await;
            match &result {
                Ok(outcome) => tracing::info!(
                    %location,
                    id_column,
                    version = outcome.version,
                    "Upsert completed"
                ),
                Err(e) => tracing::error!(%location, id_column, error = %e, "Upsert failed"),
            }
            result
        }
        .with_subscriber(self.dispatch.clone())
        .await
    }

    async fn try_write(
        &self,
        location: &TableLocation,
        batch: RecordBatch,
        mode: WriteMode,
    ) -> Result<WriteOutcome> {
        let batch = with_partition_columns(&batch, &self.date_column)?;
        self.storage
            .ensure_bucket(location.bucket())
            .await
            .map_err(into_write_error)?;

        let table = self.load_or_create(location, &batch).await?;
        let rows_written = batch.num_rows();

        let table = DeltaOps::from(table)
            .write(vec![batch])
            .with_save_mode(mode.save_mode())
            .with_partition_columns(PARTITION_COLUMNS)
            .await
            .map_err(|e| Error::Write(e.to_string()))?;

        Ok(WriteOutcome {
            version: table.version().unwrap_or(-1),
            rows_written,
        })
    }

    async fn try_upsert(
        &self,
        location: &TableLocation,
        batch: RecordBatch,
        id_column: &str,
    ) -> Result<WriteOutcome> {
        if batch.schema().column_with_name(id_column).is_none() {
            return Err(Error::InvalidArgument(format!(
                "id column '{}' not present in source batch",
                id_column
            )));
        }
        let batch = with_partition_columns(&batch, &self.date_column)?;

        if !is_delta_table(self.storage.as_ref(), location)
            .await
            .map_err(into_write_error)?
        {
            return Err(Error::Write(format!("table not found at {}", location)));
        }
        let table = open_table(self.storage.as_ref(), location)
            .await
            .map_err(into_write_error)?;

        let columns: Vec<String> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let rows_written = batch.num_rows();

        let ctx = SessionContext::new();
        let source = ctx
            .read_batch(batch)
            .map_err(|e| Error::Write(e.to_string()))?;

        let (table, metrics) = DeltaOps::from(table)
            .merge(source, format!("source.{0} = target.{0}", id_column))
            .with_source_alias("source")
            .with_target_alias("target")
            .when_matched_update(|update| {
                columns.iter().fold(update, |update, column| {
                    update.update(column.as_str(), format!("source.{}", column))
                })
            })
            .and_then(|merge| {
                merge.when_not_matched_insert(|insert| {
                    columns.iter().fold(insert, |insert, column| {
                        insert.set(column.as_str(), format!("source.{}", column))
                    })
                })
            })
            .and_then(|merge| merge.when_not_matched_by_source_delete(|delete| delete))
            .map_err(|e| Error::Write(e.to_string()))?
            .await
            .map_err(|e| Error::Write(e.to_string()))?;

        tracing::debug!(
            inserted = metrics.num_target_rows_inserted,
            updated = metrics.num_target_rows_updated,
            deleted = metrics.num_target_rows_deleted,
            "Merge metrics"
        );

        Ok(WriteOutcome {
            version: table.version().unwrap_or(-1),
            rows_written,
        })
    }

    async fn load_or_create(
        &self,
        location: &TableLocation,
        batch: &RecordBatch,
    ) -> Result<DeltaTable> {
        if is_delta_table(self.storage.as_ref(), location)
            .await
            .map_err(into_write_error)?
        {
            let table = open_table(self.storage.as_ref(), location)
                .await
                .map_err(into_write_error)?;
            tracing::debug!(
                %location,
                version = table.version().unwrap_or(-1),
                "Loaded existing Delta table"
            );
            return Ok(table);
        }

        let table_url = self.storage.table_url(location)?;
        tracing::info!(%location, url = %table_url, "Creating new Delta table");

        let schema = arrow_schema_to_delta(batch)?;
        CreateBuilder::new()
            .with_location(table_url.as_str())
            .with_columns(schema.fields().cloned())
            .with_partition_columns(PARTITION_COLUMNS)
            .with_storage_options(self.storage.storage_options())
            .await
            .map_err(|e| Error::Write(e.to_string()))
    }
}

/// Store failures during a write surface as write errors; permission and
/// argument errors keep their category.
fn into_write_error(e: Error) -> Error {
    match e {
        Error::Permission(_) | Error::InvalidArgument(_) | Error::Write(_) => e,
        other => Error::Write(other.to_string()),
    }
}

fn arrow_schema_to_delta(batch: &RecordBatch) -> Result<StructType> {
    let schema = batch.schema();
    let fields = schema
        .fields()
        .iter()
        .map(|field| {
            let delta_type: DeltaType = field
                .data_type()
                .try_into_kernel()
                .map_err(|e| Error::Write(format!("column '{}': {}", field.name(), e)))?;
            Ok(StructField::new(
                field.name(),
                delta_type,
                field.is_nullable(),
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    StructType::try_new(fields).map_err(|e| Error::Write(e.to_string()))
}
