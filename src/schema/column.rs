// src/schema/column.rs

use arrow::datatypes::Schema;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::ReshapeError;

/// Month value for columns that carry no `YYYY년MM월_` prefix.
pub const SNAPSHOT: &str = "snapshot";

static MONTHLY_COLUMN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}년\d{2}월)_(.*)$").expect("monthly column regex"));

/// What a wide column name says about its values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// No month prefix: the whole name is the metric.
    Snapshot { metric: String },
    /// `2025년01월_총인구수` → month `2025년01월`, metric `총인구수`.
    Monthly { month: String, metric: String },
}

impl ColumnKind {
    pub fn classify(name: &str) -> Self {
        match MONTHLY_COLUMN.captures(name) {
            Some(caps) => ColumnKind::Monthly {
                month: caps[1].to_string(),
                metric: caps[2].to_string(),
            },
            None => ColumnKind::Snapshot {
                metric: name.to_string(),
            },
        }
    }

    pub fn month(&self) -> &str {
        match self {
            ColumnKind::Snapshot { .. } => SNAPSHOT,
            ColumnKind::Monthly { month, .. } => month,
        }
    }

    pub fn metric(&self) -> &str {
        match self {
            ColumnKind::Snapshot { metric } | ColumnKind::Monthly { metric, .. } => metric,
        }
    }
}

/// Classification of a table's columns around its key column.
#[derive(Debug, Clone)]
pub struct ColumnLayout {
    /// Index of the key column in the source schema.
    pub key_index: usize,
    /// Every other column: (source index, kind), in source order.
    pub values: Vec<(usize, ColumnKind)>,
}

/// Locate the key column and classify every other column once.
///
/// If the key name appears more than once, the first occurrence is the key
/// and the others are skipped.
pub fn classify_columns(schema: &Schema, key_column: &str) -> Result<ColumnLayout, ReshapeError> {
    let key_index = schema
        .index_of(key_column)
        .map_err(|_| ReshapeError::MissingKeyColumn(key_column.to_string()))?;

    let values = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| f.name() != key_column)
        .map(|(i, f)| {
            let kind = ColumnKind::classify(f.name());
            debug!(column = %f.name(), month = kind.month(), metric = kind.metric(), "classified column");
            (i, kind)
        })
        .collect();

    Ok(ColumnLayout { key_index, values })
}
