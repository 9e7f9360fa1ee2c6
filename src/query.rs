//! Read-only views over a [`LongTable`], covering what the dashboard asks of
//! it: which months and regions exist, which metrics can be plotted, a
//! month/region slice, and a top-N ranking.

use arrow::{
    array::{Array, BooleanArray, Float64Array, StringArray},
    compute::filter_record_batch,
};
use std::collections::{BTreeSet, HashSet};

use crate::error::QueryError;
use crate::process::LongTable;
use crate::schema::MONTH_COLUMN;

impl LongTable {
    fn string_column(&self, name: &str) -> Result<&StringArray, QueryError> {
        self.batch()
            .column_by_name(name)
            .ok_or_else(|| QueryError::UnknownColumn(name.to_string()))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| QueryError::UnknownColumn(name.to_string()))
    }

    fn distinct(&self, name: &str) -> Vec<String> {
        match self.string_column(name) {
            Ok(col) => col
                .iter()
                .flatten()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(str::to_string)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Sorted distinct month values, `snapshot` included.
    pub fn months(&self) -> Vec<String> {
        self.distinct(MONTH_COLUMN)
    }

    /// Sorted distinct region keys.
    pub fn regions(&self) -> Vec<String> {
        self.distinct(self.key_column())
    }

    /// Every column except the key and `month`.
    pub fn metric_columns(&self) -> Vec<String> {
        self.batch()
            .schema_ref()
            .fields()
            .iter()
            .map(|f| f.name())
            .filter(|n| n.as_str() != self.key_column() && n.as_str() != MONTH_COLUMN)
            .cloned()
            .collect()
    }

    /// Rows for `month` whose region is one of `regions`.
    pub fn filter<I, S>(&self, month: &str, regions: I) -> Result<LongTable, QueryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: HashSet<String> = regions.into_iter().map(|s| s.as_ref().to_string()).collect();
        let keys = self.string_column(self.key_column())?;
        let months = self.string_column(MONTH_COLUMN)?;

        let mask: BooleanArray = keys
            .iter()
            .zip(months.iter())
            .map(|(k, m)| Some(m == Some(month) && k.is_some_and(|k| wanted.contains(k))))
            .collect();

        let batch = filter_record_batch(self.batch(), &mask)?;
        Ok(LongTable::new(self.key_column(), batch))
    }

    /// The `n` largest (region, value) pairs for `metric`, missing values dropped.
    pub fn top_n(&self, metric: &str, n: usize) -> Result<Vec<(String, f64)>, QueryError> {
        if metric == self.key_column() || metric == MONTH_COLUMN {
            return Err(QueryError::NotMetric(metric.to_string()));
        }
        let values = self
            .batch()
            .column_by_name(metric)
            .ok_or_else(|| QueryError::UnknownColumn(metric.to_string()))?
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| QueryError::NotMetric(metric.to_string()))?;
        let keys = self.string_column(self.key_column())?;

        let mut ranked: Vec<(String, f64)> = keys
            .iter()
            .zip(values.iter())
            .filter_map(|(k, v)| Some((k?.to_string(), v?)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(n);
        Ok(ranked)
    }

    /// Male/female metric columns: the last column whose name contains `남`
    /// and the last containing `여`. `None` unless both exist.
    pub fn gender_columns(&self) -> Option<(String, String)> {
        let mut male = None;
        let mut female = None;
        for field in self.batch().schema_ref().fields() {
            let name = field.name();
            if name.contains('남') {
                male = Some(name.clone());
            }
            if name.contains('여') {
                female = Some(name.clone());
            }
        }
        male.zip(female)
    }
}
