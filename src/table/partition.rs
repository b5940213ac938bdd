//! Derivation of the `year`/`month`/`day` partition columns.

use std::sync::Arc;

use datafusion::arrow::array::{Array, ArrayRef};
use datafusion::arrow::compute::kernels::temporal::{date_part, DatePart};
use datafusion::arrow::datatypes::{DataType, Field, Schema};
use datafusion::arrow::record_batch::RecordBatch;

use crate::error::{Error, Result};

pub const PARTITION_COLUMNS: [&str; 3] = ["year", "month", "day"];

/// Returns `batch` with fresh `year`, `month` and `day` columns derived from
/// `date_column`. Existing partition columns are dropped first.
pub fn with_partition_columns(batch: &RecordBatch, date_column: &str) -> Result<RecordBatch> {
    let schema = batch.schema();
    let (index, field) = schema
        .column_with_name(date_column)
        .ok_or_else(|| Error::Write(format!("missing date column '{}'", date_column)))?;

    match field.data_type() {
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => {}
        other => {
            return Err(Error::Write(format!(
                "date column '{}' has unsupported type {}",
                date_column, other
            )))
        }
    }

    let dates = batch.column(index);
    if dates.null_count() > 0 {
        return Err(Error::Write(format!(
            "date column '{}' contains {} null value(s)",
            date_column,
            dates.null_count()
        )));
    }

    let mut fields: Vec<Field> = Vec::with_capacity(schema.fields().len() + 3);
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len() + 3);
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        if PARTITION_COLUMNS.contains(&field.name().as_str()) {
            continue;
        }
        fields.push(field.as_ref().clone());
        columns.push(column.clone());
    }

    for (name, part) in PARTITION_COLUMNS
        .iter()
        .zip([DatePart::Year, DatePart::Month, DatePart::Day])
    {
        let values = date_part(dates.as_ref(), part)
            .map_err(|e| Error::Write(format!("failed to derive {}: {}", name, e)))?;
        fields.push(Field::new(*name, DataType::Int32, false));
        columns.push(values);
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
        .map_err(|e| Error::Write(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::array::{Date32Array, Int32Array, StringArray};
    use datafusion::arrow::datatypes::Date32Type;

    fn date(y: i32, m: u32, d: u32) -> i32 {
        Date32Type::from_naive_date(chrono::NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn batch(dates: Vec<Option<i32>>) -> RecordBatch {
        let values: Vec<String> = (0..dates.len()).map(|i| format!("v{}", i)).collect();
        let schema = Arc::new(Schema::new(vec![
            Field::new("value", DataType::Utf8, false),
            Field::new("date", DataType::Date32, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(values)),
                Arc::new(Date32Array::from(dates)),
            ],
        )
        .unwrap()
    }

    fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> &'a Int32Array {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<Int32Array>()
            .unwrap()
    }

    #[test]
    fn test_derives_year_month_day() {
        let input = batch(vec![Some(date(2024, 1, 31)), Some(date(2023, 12, 1))]);
        let output = with_partition_columns(&input, "date").unwrap();

        assert_eq!(output.num_columns(), 5);
        assert_eq!(int_column(&output, "year").values().to_vec(), vec![2024, 2023]);
        assert_eq!(int_column(&output, "month").values().to_vec(), vec![1, 12]);
        assert_eq!(int_column(&output, "day").values().to_vec(), vec![31, 1]);
    }

    #[test]
    fn test_replaces_existing_partition_columns() {
        let input = with_partition_columns(&batch(vec![Some(date(2024, 5, 2))]), "date").unwrap();
        let again = with_partition_columns(&input, "date").unwrap();

        assert_eq!(again.num_columns(), 5);
        assert_eq!(int_column(&again, "day").values().to_vec(), vec![2]);
    }

    #[test]
    fn test_missing_date_column() {
        let input = batch(vec![Some(date(2024, 1, 1))]);
        let err = with_partition_columns(&input, "event_date").unwrap_err();
        assert!(matches!(err, Error::Write(_)));
        assert!(err.to_string().contains("event_date"));
    }

    #[test]
    fn test_null_dates_rejected() {
        let input = batch(vec![Some(date(2024, 1, 1)), None]);
        assert!(matches!(
            with_partition_columns(&input, "date"),
            Err(Error::Write(_))
        ));
    }

    #[test]
    fn test_wrong_date_type_rejected() {
        let input = batch(vec![Some(date(2024, 1, 1))]);
        assert!(matches!(
            with_partition_columns(&input, "value"),
            Err(Error::Write(_))
        ));
    }
}
