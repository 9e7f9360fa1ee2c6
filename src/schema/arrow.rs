// src/schema/arrow.rs

use arrow::{
    array::ArrayRef,
    datatypes::{DataType, Field, Schema, SchemaRef},
    error::ArrowError,
    record_batch::RecordBatch,
};
use std::sync::Arc;

/// Name of the month column in the long table.
pub const MONTH_COLUMN: &str = "month";

/// Long-format schema: key (Utf8), `month` (Utf8), then one nullable
/// Float64 column per metric, in the order given.
pub fn build_long_schema<S: AsRef<str>>(key_column: &str, metrics: &[S]) -> SchemaRef {
    let mut fields = Vec::with_capacity(metrics.len() + 2);
    fields.push(Field::new(key_column, DataType::Utf8, false));
    fields.push(Field::new(MONTH_COLUMN, DataType::Utf8, false));
    fields.extend(
        metrics
            .iter()
            .map(|m| Field::new(m.as_ref(), DataType::Float64, true)),
    );
    Arc::new(Schema::new(fields))
}

/// Set a nullable Float64 column on `batch`: replaced in place if a column
/// of that name exists, appended otherwise.
pub fn set_float_column(
    batch: &RecordBatch,
    name: &str,
    values: ArrayRef,
) -> Result<RecordBatch, ArrowError> {
    let schema = batch.schema_ref();
    let field = Arc::new(Field::new(name, DataType::Float64, true));

    let mut fields: Vec<_> = schema.fields().iter().cloned().collect();
    let mut columns = batch.columns().to_vec();

    match schema.index_of(name) {
        Ok(i) => {
            fields[i] = field;
            columns[i] = values;
        }
        Err(_) => {
            fields.push(field);
            columns.push(values);
        }
    }

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
}
