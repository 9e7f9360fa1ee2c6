// src/process/reshape.rs
use arrow::{
    array::{Array, ArrayRef, Float64Array, StringArray},
    compute::cast,
    datatypes::DataType,
    record_batch::RecordBatch,
};
use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};
use tracing::{debug, info, warn};

use crate::error::ReshapeError;
use crate::process::{
    convert::CleanTable,
    derive::{apply_derived, DerivedMetric},
};
use crate::schema::{build_long_schema, classify_columns, ColumnKind, MONTH_COLUMN};

/// One row per (region, month): key, `month`, then one Float64 column per metric.
#[derive(Debug, Clone, PartialEq)]
pub struct LongTable {
    key_column: String,
    batch: RecordBatch,
}

impl LongTable {
    pub(crate) fn new(key_column: impl Into<String>, batch: RecordBatch) -> Self {
        Self {
            key_column: key_column.into(),
            batch,
        }
    }

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

/// A single (key, value) cell of a wide column, tagged with its month and metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeltedRow<'a> {
    pub key: &'a str,
    pub month: &'a str,
    pub metric: &'a str,
    pub value: Option<f64>,
}

fn downcast_keys(arr: &ArrayRef) -> Result<Cow<'_, StringArray>, ReshapeError> {
    if let Some(s) = arr.as_any().downcast_ref::<StringArray>() {
        return Ok(Cow::Borrowed(s));
    }
    let cast = cast(arr, &DataType::Utf8)?;
    let owned = cast
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| arrow::error::ArrowError::CastError("key column is not Utf8".into()))?;
    Ok(Cow::Owned(owned))
}

fn downcast_values(arr: &ArrayRef) -> Result<Cow<'_, Float64Array>, ReshapeError> {
    if let Some(f) = arr.as_any().downcast_ref::<Float64Array>() {
        return Ok(Cow::Borrowed(f));
    }
    let cast = cast(arr, &DataType::Float64)?;
    let owned = cast
        .as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .ok_or_else(|| arrow::error::ArrowError::CastError("value column is not Float64".into()))?;
    Ok(Cow::Owned(owned))
}

/// Melt every non-key column into (key, month, metric, value) rows, column
/// by column in source order. Rows with a null key are dropped.
pub fn melt<'a>(
    keys: &'a StringArray,
    columns: &'a [(ColumnKind, Cow<'a, Float64Array>)],
) -> Vec<MeltedRow<'a>> {
    let mut rows = Vec::with_capacity(keys.len() * columns.len());
    let mut null_keys = 0usize;

    for (kind, values) in columns {
        for (key, value) in keys.iter().zip(values.iter()) {
            match key {
                Some(key) => rows.push(MeltedRow {
                    key,
                    month: kind.month(),
                    metric: kind.metric(),
                    value,
                }),
                None => null_keys += 1,
            }
        }
    }

    if null_keys > 0 {
        warn!(cells = null_keys, "dropped cells with a missing region key");
    }
    rows
}

/// Spread melted rows back into one column per metric, grouped by (key, month).
///
/// When several rows land on the same (key, month, metric) cell, the first
/// non-null value encountered is kept and later ones are discarded; nothing is
/// summed or averaged. This mirrors how the legacy dashboard pivoted and is
/// kept on purpose even though it can silently hide conflicting inputs.
///
/// (key, month) groups with no non-null value and metrics that are null
/// everywhere are pruned, so a trailing empty column adds nothing.
pub fn pivot(key_column: &str, rows: &[MeltedRow<'_>]) -> Result<RecordBatch, ReshapeError> {
    if rows.is_empty() {
        return Err(ReshapeError::Empty);
    }

    let mut metrics: BTreeSet<&str> = BTreeSet::new();
    let mut groups: BTreeMap<(&str, &str), HashMap<&str, f64>> = BTreeMap::new();
    let mut discarded = 0usize;

    for row in rows {
        metrics.insert(row.metric);
        let cells = groups.entry((row.key, row.month)).or_default();
        if let Some(v) = row.value {
            if cells.contains_key(row.metric) {
                discarded += 1;
            } else {
                cells.insert(row.metric, v);
            }
        }
    }

    if discarded > 0 {
        debug!(discarded, "kept first value for duplicate (key, month, metric) cells");
    }

    let before = groups.len();
    groups.retain(|_, cells| !cells.is_empty());
    let metrics: Vec<&str> = metrics
        .into_iter()
        .filter(|m| groups.values().any(|cells| cells.contains_key(m)))
        .collect();
    debug!(
        pruned_groups = before - groups.len(),
        metrics = metrics.len(),
        "pruned all-null groups and metrics"
    );

    if let Some(m) = metrics
        .iter()
        .find(|m| **m == key_column || **m == MONTH_COLUMN)
    {
        return Err(ReshapeError::ColumnCollision(m.to_string()));
    }

    let schema = build_long_schema(key_column, &metrics);

    let keys: StringArray = groups.keys().map(|(k, _)| Some(*k)).collect();
    let months: StringArray = groups.keys().map(|(_, m)| Some(*m)).collect();

    let mut columns: Vec<ArrayRef> = Vec::with_capacity(metrics.len() + 2);
    columns.push(Arc::new(keys));
    columns.push(Arc::new(months));
    for metric in &metrics {
        let col: Float64Array = groups.values().map(|cells| cells.get(metric).copied()).collect();
        columns.push(Arc::new(col));
    }

    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Reshape a cleaned wide table into long format and append derived metrics.
#[tracing::instrument(level = "info", skip(clean, derived), fields(rows = clean.num_rows()))]
pub fn reshape(clean: &CleanTable, derived: &[DerivedMetric]) -> Result<LongTable, ReshapeError> {
    let batch = clean.batch();
    let key_column = clean.key_column();
    let layout = classify_columns(batch.schema_ref(), key_column)?;

    let keys = downcast_keys(batch.column(layout.key_index))?;
    let mut columns = Vec::with_capacity(layout.values.len());
    for (i, kind) in layout.values {
        columns.push((kind, downcast_values(batch.column(i))?));
    }

    let melted = melt(&keys, &columns);
    debug!(melted = melted.len(), "melted wide columns");

    let pivoted = pivot(key_column, &melted)?;
    let long = apply_derived(pivoted, derived)?;
    info!(
        rows = long.num_rows(),
        columns = long.num_columns(),
        "reshaped to long format"
    );

    Ok(LongTable::new(key_column, long))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{
        convert::clean_raw,
        derive::AVERAGE_HOUSEHOLD_SIZE,
        load::SourceEncoding,
        raw_table::RawTable,
    };
    use crate::schema::SNAPSHOT;
    use anyhow::Result;

    const KEY: &str = "행정구역";

    fn clean(headers: &[&str], rows: &[&[&str]]) -> CleanTable {
        let raw = RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
            encoding: SourceEncoding::Utf8,
        };
        clean_raw(&raw, KEY).unwrap()
    }

    fn strings<'a>(batch: &'a RecordBatch, name: &str) -> Vec<&'a str> {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
            .iter()
            .map(|s| s.unwrap())
            .collect()
    }

    fn floats(batch: &RecordBatch, name: &str) -> Vec<Option<f64>> {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
            .iter()
            .collect()
    }

    #[test]
    fn monthly_round_trip_with_average_household_size() -> Result<()> {
        let table = clean(
            &[KEY, "2025년01월_총인구수", "2025년01월_세대수"],
            &[&["종로구", "139,417", "72,894"]],
        );

        let long = reshape(&table, &[DerivedMetric::average_household_size()])?;
        let batch = long.batch();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(strings(batch, MONTH_COLUMN), ["2025년01월"]);
        assert_eq!(floats(batch, "총인구수"), [Some(139417.0)]);
        assert_eq!(floats(batch, "세대수"), [Some(72894.0)]);
        assert_eq!(
            floats(batch, AVERAGE_HOUSEHOLD_SIZE),
            [Some(139417.0 / 72894.0)]
        );
        Ok(())
    }

    #[test]
    fn unprefixed_columns_land_in_snapshot_rows() -> Result<()> {
        let table = clean(
            &[KEY, "지역코드", "2025년01월_세대수"],
            &[&["종로구", "1111000000", "72,894"]],
        );

        let long = reshape(&table, &[])?;
        let batch = long.batch();
        assert_eq!(strings(batch, MONTH_COLUMN), ["2025년01월", SNAPSHOT]);
        assert_eq!(floats(batch, "지역코드"), [None, Some(1111000000.0)]);
        assert_eq!(floats(batch, "세대수"), [Some(72894.0), None]);
        Ok(())
    }

    #[test]
    fn rows_grouped_by_key_and_month() -> Result<()> {
        let table = clean(
            &[
                KEY,
                "2025년02월_세대수",
                "2025년01월_세대수",
                "2025년01월_총인구수",
            ],
            &[&["중구", "11", "10", "20"], &["종로구", "21", "20", "40"]],
        );

        let long = reshape(&table, &[])?;
        let batch = long.batch();
        assert_eq!(strings(batch, KEY), ["종로구", "종로구", "중구", "중구"]);
        assert_eq!(
            strings(batch, MONTH_COLUMN),
            ["2025년01월", "2025년02월", "2025년01월", "2025년02월"]
        );
        assert_eq!(
            floats(batch, "세대수"),
            [Some(20.0), Some(21.0), Some(10.0), Some(11.0)]
        );
        assert_eq!(floats(batch, "총인구수"), [Some(40.0), None, Some(20.0), None]);
        Ok(())
    }

    #[test]
    fn duplicate_cells_keep_the_first_value() -> Result<()> {
        let table = clean(
            &[KEY, "2025년01월_세대수", "2025년01월_세대수"],
            &[&["종로구", "100", "999"]],
        );

        let long = reshape(&table, &[])?;
        assert_eq!(long.num_rows(), 1);
        assert_eq!(floats(long.batch(), "세대수"), [Some(100.0)]);
        Ok(())
    }

    #[test]
    fn duplicate_regions_keep_the_first_row() -> Result<()> {
        let table = clean(
            &[KEY, "2025년01월_세대수"],
            &[&["종로구", "-"], &["종로구", "5"], &["종로구", "7"]],
        );

        // a missing value is not an encountered value
        let long = reshape(&table, &[])?;
        assert_eq!(long.num_rows(), 1);
        assert_eq!(floats(long.batch(), "세대수"), [Some(5.0)]);
        Ok(())
    }

    #[test]
    fn empty_table_is_a_reshape_error() {
        let table = clean(&[KEY, "2025년01월_세대수"], &[]);
        let err = reshape(&table, &[]).unwrap_err();
        assert!(matches!(err, ReshapeError::Empty));

        let key_only = clean(&[KEY], &[&["종로구"]]);
        let err = reshape(&key_only, &[]).unwrap_err();
        assert!(matches!(err, ReshapeError::Empty));
    }

    #[test]
    fn derived_metric_absent_without_both_inputs() -> Result<()> {
        let table = clean(&[KEY, "2025년01월_총인구수"], &[&["종로구", "10"]]);
        let long = reshape(&table, &[DerivedMetric::average_household_size()])?;
        assert!(long.batch().column_by_name(AVERAGE_HOUSEHOLD_SIZE).is_none());
        Ok(())
    }

    #[test]
    fn trailing_empty_column_adds_no_rows_or_metrics() -> Result<()> {
        let table = clean(
            &[KEY, "2025년01월_총인구수", "2025년01월_세대수", ""],
            &[&["종로구", "100", "40", ""], &["중구", "200", "50", ""]],
        );

        let long = reshape(&table, &[DerivedMetric::average_household_size()])?;
        let batch = long.batch();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(strings(batch, MONTH_COLUMN), ["2025년01월", "2025년01월"]);
        assert_eq!(
            long.metric_columns(),
            ["세대수", "총인구수", AVERAGE_HOUSEHOLD_SIZE]
        );
        Ok(())
    }

    #[test]
    fn all_null_metric_is_dropped_before_deriving() -> Result<()> {
        let table = clean(
            &[KEY, "2025년01월_총인구수", "2025년01월_세대수"],
            &[&["종로구", "100", "-"], &["중구", "200", ""]],
        );

        let long = reshape(&table, &[DerivedMetric::average_household_size()])?;
        let batch = long.batch();
        assert_eq!(long.metric_columns(), ["총인구수"]);
        assert!(batch.column_by_name(AVERAGE_HOUSEHOLD_SIZE).is_none());
        assert_eq!(floats(batch, "총인구수"), [Some(100.0), Some(200.0)]);
        Ok(())
    }

    #[test]
    fn all_null_region_month_is_dropped() -> Result<()> {
        let table = clean(
            &[KEY, "2025년01월_세대수", "2025년02월_세대수"],
            &[&["종로구", "10", "-"]],
        );

        let long = reshape(&table, &[])?;
        assert_eq!(long.num_rows(), 1);
        assert_eq!(strings(long.batch(), MONTH_COLUMN), ["2025년01월"]);
        Ok(())
    }

    #[test]
    fn metric_named_like_a_long_column_is_rejected() {
        let table = clean(&[KEY, "month", "2025년01월_세대수"], &[&["종로구", "1", "2"]]);
        let err = reshape(&table, &[]).unwrap_err();
        assert!(matches!(err, ReshapeError::ColumnCollision(m) if m == MONTH_COLUMN));

        let table = clean(&[KEY, "2025년01월_행정구역"], &[&["종로구", "1"]]);
        let err = reshape(&table, &[]).unwrap_err();
        assert!(matches!(err, ReshapeError::ColumnCollision(m) if m == KEY));
    }

    #[test]
    fn rows_without_a_region_key_are_dropped() -> Result<()> {
        let table = clean(
            &[KEY, "2025년01월_세대수"],
            &[&["종로구", "10"], &["", "99"], &["중구", "20"]],
        );

        let long = reshape(&table, &[])?;
        assert_eq!(long.num_rows(), 2);
        assert_eq!(strings(long.batch(), KEY), ["종로구", "중구"]);
        assert_eq!(floats(long.batch(), "세대수"), [Some(10.0), Some(20.0)]);
        Ok(())
    }

    #[test]
    fn missing_key_column_is_reported() {
        let raw = RawTable {
            headers: vec!["시군구".into(), "세대수".into()],
            rows: vec![vec!["종로구".into(), "1".into()]],
            encoding: SourceEncoding::Utf8,
        };
        let table = clean_raw(&raw, KEY).unwrap();
        let err = reshape(&table, &[]).unwrap_err();
        assert!(matches!(err, ReshapeError::MissingKeyColumn(_)));
    }
}
