//! Error types for every pipeline stage.
//!
//! Only two kinds of failure abort an ingestion call: the loader running out of
//! encodings and the reshaper being handed nothing to melt. Per-cell coercion
//! failures and bad divisions degrade to nulls and never show up here.

use std::{io, path::PathBuf};

use arrow::error::ArrowError;
use thiserror::Error;

use crate::process::load::SourceEncoding;

/// Why a single encoding attempt was rejected.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("bytes are not valid {0}")]
    Undecodable(SourceEncoding),

    #[error("source has no header row")]
    NoHeader,

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("record {record} has {found} fields, header has {expected}")]
    TooManyFields {
        record: usize,
        found: usize,
        expected: usize,
    },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading source: {0}")]
    Io(#[from] io::Error),

    /// Every candidate encoding failed; `cause` is the last attempt's failure.
    #[error("no candidate encoding could parse the source (last tried {encoding}): {cause}")]
    Exhausted {
        encoding: SourceEncoding,
        #[source]
        cause: AttemptError,
    },

    #[error("no candidate encodings configured")]
    NoEncodings,
}

#[derive(Debug, Error)]
pub enum ReshapeError {
    /// The melt step produced zero rows.
    #[error("nothing to reshape: melting the table produced no rows")]
    Empty,

    #[error("key column `{0}` not found in table")]
    MissingKeyColumn(String),

    /// A metric name would duplicate the key or `month` column in the long table.
    #[error("metric `{0}` collides with a long-table column name")]
    ColumnCollision(String),

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("column `{0}` not found in long table")]
    UnknownColumn(String),

    #[error("column `{0}` is not a metric column")]
    NotMetric(String),

    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parsing config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Crate-wide error returned by the pipeline entry points.
#[derive(Debug, Error)]
pub enum Error {
    #[error("load failed: {0}")]
    Load(#[from] LoadError),

    #[error("reshape failed: {0}")]
    Reshape(#[from] ReshapeError),

    #[error("query failed: {0}")]
    Query(#[from] QueryError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
