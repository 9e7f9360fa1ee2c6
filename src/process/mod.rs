// src/process/mod.rs
pub mod convert;
pub mod derive;
pub mod load;
pub mod raw_table;
pub mod reshape;
pub mod utils;

use std::{
    io::{Read, Seek},
    path::Path,
};
use tracing::info;

use crate::config::Config;
use crate::error::Result;

pub use convert::{clean_batch, clean_raw, CleanTable};
pub use derive::DerivedMetric;
pub use load::{read_table, Loader, SourceEncoding};
pub use raw_table::RawTable;
pub use reshape::{melt, pivot, reshape, LongTable, MeltedRow};

/// Loader → Cleaner → Reshaper.
///
/// Owns the loader and its content-keyed cache, so cached tables live exactly
/// as long as the pipeline does.
#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    loader: Loader,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let loader = Loader::new(config.encodings.clone());
        Self { config, loader }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    #[tracing::instrument(level = "info", skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn run_path<P: AsRef<Path>>(&self, path: P) -> Result<LongTable> {
        let raw = self.loader.load_path(path)?;
        self.transform(&raw)
    }

    pub fn run_bytes(&self, bytes: &[u8]) -> Result<LongTable> {
        let raw = self.loader.load_bytes(bytes)?;
        self.transform(&raw)
    }

    pub fn run_reader<R: Read + Seek>(&self, reader: &mut R) -> Result<LongTable> {
        let raw = self.loader.load_reader(reader)?;
        self.transform(&raw)
    }

    /// Clean and reshape an already loaded table.
    pub fn transform(&self, raw: &RawTable) -> Result<LongTable> {
        let clean = clean_raw(raw, &self.config.key_column)?;
        let long = reshape(&clean, &self.config.derived)?;
        info!(
            rows = long.num_rows(),
            columns = long.batch().num_columns(),
            "pipeline complete"
        );
        Ok(long)
    }
}
