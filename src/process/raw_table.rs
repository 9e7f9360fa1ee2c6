use arrow::{
    array::{ArrayRef, StringArray},
    datatypes::{DataType, Field, Schema},
    error::ArrowError,
    record_batch::RecordBatch,
};
use std::sync::Arc;

use crate::process::load::SourceEncoding;

#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Column names, from the header row. Duplicates are kept as-is.
    pub headers: Vec<String>,
    /// Each data row, as a Vec of Strings (one per header).
    pub rows: Vec<Vec<String>>,
    /// The encoding that successfully decoded the source.
    pub encoding: SourceEncoding,
}

impl RawTable {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.headers.len()
    }

    /// View the table as an all-`Utf8` batch. Empty cells become nulls.
    pub fn to_record_batch(&self) -> Result<RecordBatch, ArrowError> {
        let fields: Vec<Field> = self
            .headers
            .iter()
            .map(|n| Field::new(n, DataType::Utf8, true))
            .collect();

        let columns: Vec<ArrayRef> = (0..self.headers.len())
            .map(|i| {
                let col: StringArray = self
                    .rows
                    .iter()
                    .map(|row| row.get(i).map(String::as_str).filter(|s| !s.is_empty()))
                    .collect();
                Arc::new(col) as ArrayRef
            })
            .collect();

        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
    }
}
