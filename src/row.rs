//! The synthetic row type and its Arrow representation.

use std::sync::Arc;

use chrono::NaiveDate;
use datafusion::arrow::array::{Array, ArrayRef, Date32Array, RecordBatch, StringArray};
use datafusion::arrow::compute::cast;
use datafusion::arrow::datatypes::{DataType, Date32Type, Field, Schema, SchemaRef};

use crate::error::{Error, Result};

pub const VALUE_COLUMN: &str = "value";
pub const DATE_COLUMN: &str = "date";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Row {
    pub value: String,
    pub date: NaiveDate,
}

impl Row {
    pub fn new(value: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            value: value.into(),
            date,
        }
    }
}

pub fn row_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(VALUE_COLUMN, DataType::Utf8, false),
        Field::new(DATE_COLUMN, DataType::Date32, false),
    ]))
}

pub fn rows_to_record_batch(rows: &[Row]) -> Result<RecordBatch> {
    let values: ArrayRef = Arc::new(StringArray::from_iter_values(
        rows.iter().map(|r| r.value.as_str()),
    ));
    let dates: ArrayRef = Arc::new(Date32Array::from_iter_values(
        rows.iter().map(|r| Date32Type::from_naive_date(r.date)),
    ));

    RecordBatch::try_new(row_schema(), vec![values, dates])
        .map_err(|e| Error::InvalidArgument(e.to_string()))
}

/// Converts batches back into rows. String columns may come back as
/// `Utf8View` or `LargeUtf8` depending on the scan, so both columns are cast.
pub fn rows_from_batches(batches: &[RecordBatch]) -> Result<Vec<Row>> {
    let mut rows = Vec::with_capacity(batches.iter().map(|b| b.num_rows()).sum());

    for batch in batches {
        let values = column_as(batch, VALUE_COLUMN, &DataType::Utf8)?;
        let values = values
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| Error::Read(format!("column '{}' is not a string", VALUE_COLUMN)))?;

        let dates = column_as(batch, DATE_COLUMN, &DataType::Date32)?;
        let dates = dates
            .as_any()
            .downcast_ref::<Date32Array>()
            .ok_or_else(|| Error::Read(format!("column '{}' is not a date", DATE_COLUMN)))?;

        for i in 0..batch.num_rows() {
            if values.is_null(i) || dates.is_null(i) {
                return Err(Error::Read(format!("row {} contains nulls", i)));
            }
            let date = dates
                .value_as_date(i)
                .ok_or_else(|| Error::Read(format!("row {} has an out-of-range date", i)))?;
            rows.push(Row::new(values.value(i), date));
        }
    }

    Ok(rows)
}

fn column_as(batch: &RecordBatch, name: &str, data_type: &DataType) -> Result<ArrayRef> {
    let column = batch
        .column_by_name(name)
        .ok_or_else(|| Error::Read(format!("missing column '{}'", name)))?;
    cast(column, data_type).map_err(|e| Error::Read(format!("column '{}': {}", name, e)))
}
