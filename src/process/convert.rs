use crate::process::{raw_table::RawTable, utils::coerce_number};
use arrow::{
    array::{Array, ArrayRef, Float64Builder, StringArray},
    compute::cast,
    datatypes::{DataType, Field, FieldRef, Schema},
    error::ArrowError,
    record_batch::RecordBatch,
};
use std::sync::Arc;
use tracing::debug;

/// A table whose non-key columns are all nullable `Float64`.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanTable {
    key_column: String,
    batch: RecordBatch,
}

impl CleanTable {
    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn into_batch(self) -> RecordBatch {
        self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }
}

/// Clean a freshly loaded table.
pub fn clean_raw(raw: &RawTable, key_column: &str) -> Result<CleanTable, ArrowError> {
    clean_batch(&raw.to_record_batch()?, key_column)
}

/// Coerce every non-key column to `Float64`.
///
/// Cells are rendered as text, stripped down to digits, `.` and `-`, and parsed;
/// anything that does not parse becomes null. Columns that are already
/// `Float64` pass through untouched, so cleaning a cleaned table is a no-op.
/// The key column is never modified and column order is preserved.
#[tracing::instrument(level = "info", skip(batch), fields(rows = batch.num_rows(), columns = batch.num_columns()))]
pub fn clean_batch(batch: &RecordBatch, key_column: &str) -> Result<CleanTable, ArrowError> {
    let mut fields: Vec<FieldRef> = Vec::with_capacity(batch.num_columns());
    let mut out: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());

    for (arr, fld) in batch.columns().iter().zip(batch.schema_ref().fields()) {
        if fld.name() == key_column {
            fields.push(Arc::clone(fld));
            out.push(Arc::clone(arr));
            continue;
        }

        let numeric = match arr.data_type() {
            DataType::Float64 => Arc::clone(arr),
            _ => coerce_column(arr)?,
        };
        debug!(
            column = %fld.name(),
            missing = numeric.null_count(),
            "coerced column"
        );

        fields.push(Arc::new(Field::new(fld.name(), DataType::Float64, true)));
        out.push(numeric);
    }

    let schema = Arc::new(Schema::new(fields));
    Ok(CleanTable {
        key_column: key_column.to_string(),
        batch: RecordBatch::try_new(schema, out)?,
    })
}

fn coerce_column(arr: &ArrayRef) -> Result<ArrayRef, ArrowError> {
    let text = cast(arr, &DataType::Utf8)?;
    let sarr = text
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| ArrowError::CastError("expected Utf8 after cast".into()))?;

    let mut b = Float64Builder::with_capacity(sarr.len());
    for opt in sarr.iter() {
        b.append_option(opt.and_then(coerce_number));
    }
    Ok(Arc::new(b.finish()) as ArrayRef)
}
