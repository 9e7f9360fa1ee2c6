use arrow::{
    array::{Array, ArrayRef, Float64Array},
    compute::cast,
    datatypes::DataType,
    error::ArrowError,
    record_batch::RecordBatch,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::schema::set_float_column;

pub const TOTAL_POPULATION: &str = "총인구수";
pub const HOUSEHOLD_COUNT: &str = "세대수";
pub const AVERAGE_HOUSEHOLD_SIZE: &str = "average_household_size";

/// A ratio column computed from two metric columns after reshaping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedMetric {
    pub name: String,
    pub numerator: String,
    pub denominator: String,
}

impl DerivedMetric {
    /// `average_household_size = 총인구수 / 세대수`
    pub fn average_household_size() -> Self {
        Self {
            name: AVERAGE_HOUSEHOLD_SIZE.to_string(),
            numerator: TOTAL_POPULATION.to_string(),
            denominator: HOUSEHOLD_COUNT.to_string(),
        }
    }
}

/// Null when either operand is missing, the denominator is zero, or the
/// quotient is not finite.
fn ratio(n: Option<f64>, d: Option<f64>) -> Option<f64> {
    match (n, d) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d).filter(|q| q.is_finite()),
        _ => None,
    }
}

fn float_column(batch: &RecordBatch, name: &str) -> Result<Option<ArrayRef>, ArrowError> {
    match batch.column_by_name(name) {
        Some(col) if col.data_type() == &DataType::Float64 => Ok(Some(Arc::clone(col))),
        Some(col) => cast(col, &DataType::Float64).map(Some),
        None => Ok(None),
    }
}

/// Append each derived metric whose inputs are both present; the others are
/// skipped entirely rather than added as all-null columns.
pub fn apply_derived(
    batch: RecordBatch,
    metrics: &[DerivedMetric],
) -> Result<RecordBatch, ArrowError> {
    let mut batch = batch;

    for metric in metrics {
        let (num, den) = match (
            float_column(&batch, &metric.numerator)?,
            float_column(&batch, &metric.denominator)?,
        ) {
            (Some(n), Some(d)) => (n, d),
            _ => {
                debug!(metric = %metric.name, "inputs missing, not derived");
                continue;
            }
        };

        let (num, den) = match (
            num.as_any().downcast_ref::<Float64Array>(),
            den.as_any().downcast_ref::<Float64Array>(),
        ) {
            (Some(n), Some(d)) => (n, d),
            _ => return Err(ArrowError::CastError(format!("{} inputs are not Float64", metric.name))),
        };

        let values: Float64Array = num
            .iter()
            .zip(den.iter())
            .map(|(n, d)| ratio(n, d))
            .collect();
        info!(
            metric = %metric.name,
            missing = values.null_count(),
            "derived metric"
        );

        batch = set_float_column(&batch, &metric.name, Arc::new(values))?;
    }

    Ok(batch)
}
