// src/process/load.rs
use csv::ReaderBuilder;
use encoding_rs::{EUC_KR, UTF_8};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    borrow::Cow,
    collections::HashMap,
    fmt, fs,
    io::{Cursor, Read, Seek, SeekFrom},
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, info, warn};

use crate::error::{AttemptError, LoadError};
use crate::process::raw_table::RawTable;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Candidate text encodings for census exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "euc-kr")]
    EucKr,
    #[serde(rename = "cp949")]
    Cp949,
    #[serde(rename = "latin1")]
    Latin1,
}

impl SourceEncoding {
    pub const DEFAULT_ORDER: [SourceEncoding; 4] = [
        SourceEncoding::Utf8,
        SourceEncoding::EucKr,
        SourceEncoding::Cp949,
        SourceEncoding::Latin1,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SourceEncoding::Utf8 => "utf-8",
            SourceEncoding::EucKr => "euc-kr",
            SourceEncoding::Cp949 => "cp949",
            SourceEncoding::Latin1 => "latin1",
        }
    }

    /// Strictly decode `bytes`; `None` if any sequence is invalid.
    ///
    /// encoding_rs implements EUC-KR as the WHATWG decoder, which is the
    /// windows-949 superset, so `EucKr` and `Cp949` decode identically.
    /// Latin-1 maps every byte to the code point of the same value and never fails.
    pub fn decode(self, bytes: &[u8]) -> Option<Cow<'_, str>> {
        match self {
            SourceEncoding::Utf8 => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                UTF_8.decode_without_bom_handling_and_without_replacement(body)
            }
            SourceEncoding::EucKr | SourceEncoding::Cp949 => {
                EUC_KR.decode_without_bom_handling_and_without_replacement(bytes)
            }
            SourceEncoding::Latin1 => Some(Cow::Owned(bytes.iter().copied().map(char::from).collect())),
        }
    }
}

impl fmt::Display for SourceEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Parse decoded text as a headed CSV.
///
/// Rows shorter than the header are padded with empty cells (nulls later on);
/// rows longer than the header reject the attempt.
fn parse_csv(text: &str, encoding: SourceEncoding) -> Result<RawTable, AttemptError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() {
        return Err(AttemptError::NoHeader);
    }

    let mut rows = Vec::new();
    let mut padded = 0usize;
    for (idx, result) in rdr.records().enumerate() {
        let record = result?;
        if record.len() > headers.len() {
            return Err(AttemptError::TooManyFields {
                record: idx + 1,
                found: record.len(),
                expected: headers.len(),
            });
        }
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        if row.len() < headers.len() {
            row.resize(headers.len(), String::new());
            padded += 1;
        }
        rows.push(row);
    }

    if padded > 0 {
        debug!(%encoding, rows = padded, "padded short records");
    }

    Ok(RawTable {
        headers,
        rows,
        encoding,
    })
}

/// Try each encoding in order, rewinding `reader` before every attempt.
///
/// Fails only once every encoding has been tried; the error carries the
/// last attempt's cause.
#[tracing::instrument(level = "debug", skip(reader, encodings))]
pub fn read_table<R: Read + Seek>(
    reader: &mut R,
    encodings: &[SourceEncoding],
) -> Result<RawTable, LoadError> {
    let mut last: Option<(SourceEncoding, AttemptError)> = None;
    let mut buf = Vec::new();

    for &encoding in encodings {
        reader.seek(SeekFrom::Start(0))?;
        buf.clear();
        reader.read_to_end(&mut buf)?;

        let attempt = match encoding.decode(&buf) {
            Some(text) => parse_csv(&text, encoding),
            None => Err(AttemptError::Undecodable(encoding)),
        };

        match attempt {
            Ok(table) => {
                debug!(%encoding, rows = table.num_rows(), "decoded source");
                return Ok(table);
            }
            Err(cause) => {
                debug!(%encoding, error = %cause, "encoding attempt failed");
                last = Some((encoding, cause));
            }
        }
    }

    match last {
        Some((encoding, cause)) => {
            warn!(%encoding, error = %cause, "all encodings exhausted");
            Err(LoadError::Exhausted { encoding, cause })
        }
        None => Err(LoadError::NoEncodings),
    }
}

/// Reads census CSVs into `RawTable`s, caching results by content digest.
///
/// The cache is keyed on the SHA-256 of the source bytes, so re-reading a path
/// whose content changed is a miss.
#[derive(Debug)]
pub struct Loader {
    encodings: Vec<SourceEncoding>,
    cache: Mutex<HashMap<String, Arc<RawTable>>>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(SourceEncoding::DEFAULT_ORDER.to_vec())
    }
}

impl Loader {
    pub fn new(encodings: Vec<SourceEncoding>) -> Self {
        Self {
            encodings,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn encodings(&self) -> &[SourceEncoding] {
        &self.encodings
    }

    #[tracing::instrument(level = "info", skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn load_path<P: AsRef<Path>>(&self, path: P) -> Result<Arc<RawTable>, LoadError> {
        let bytes = fs::read(path.as_ref())?;
        self.load_bytes(&bytes)
    }

    /// Load from a seekable stream; the stream is rewound first, so its
    /// current position does not matter.
    pub fn load_reader<R: Read + Seek>(&self, reader: &mut R) -> Result<Arc<RawTable>, LoadError> {
        reader.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.load_bytes(&bytes)
    }

    pub fn load_bytes(&self, bytes: &[u8]) -> Result<Arc<RawTable>, LoadError> {
        let digest = hex::encode(Sha256::digest(bytes));

        if let Some(hit) = self.lock_cache().get(&digest) {
            debug!(digest = %digest, "cache hit");
            return Ok(Arc::clone(hit));
        }

        let table = Arc::new(read_table(&mut Cursor::new(bytes), &self.encodings)?);
        info!(
            encoding = %table.encoding,
            rows = table.num_rows(),
            columns = table.num_columns(),
            "loaded source"
        );

        self.lock_cache().insert(digest, Arc::clone(&table));
        Ok(table)
    }

    pub fn cached_len(&self) -> usize {
        self.lock_cache().len()
    }

    pub fn clear_cache(&self) {
        self.lock_cache().clear();
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<RawTable>>> {
        // cached tables are immutable, so a poisoned map is still consistent
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
