//! Census population/household CSV ingestion.
//!
//! Loads a wide-format 주민등록 인구·세대 export in whichever of the candidate
//! encodings decodes it, coerces every metric cell to a number, and reshapes
//! the `YYYY년MM월_<metric>` columns into one row per (region, month) with a
//! column per metric, plus derived ratios such as average household size.

pub mod config;
pub mod error;
pub mod export;
pub mod process;
pub mod query;
pub mod schema;

pub use config::Config;
pub use error::{Error, Result};
pub use process::{CleanTable, LongTable, Pipeline, RawTable};
