// src/export.rs

use arrow::{csv::WriterBuilder, error::ArrowError};
use std::{fs, path::Path};
use tracing::info;

use crate::error::Result;
use crate::process::LongTable;

/// UTF-8 byte order mark, so spreadsheet tools detect the encoding.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Serialize the long table as BOM-prefixed UTF-8 CSV; nulls are empty fields.
pub fn to_csv_bytes(table: &LongTable) -> std::result::Result<Vec<u8>, ArrowError> {
    let mut buf = UTF8_BOM.to_vec();
    {
        let mut writer = WriterBuilder::new().with_header(true).build(&mut buf);
        writer.write(table.batch())?;
    }
    Ok(buf)
}

pub fn write_csv<P: AsRef<Path>>(table: &LongTable, path: P) -> Result<u64> {
    let bytes = to_csv_bytes(table)?;
    fs::write(path.as_ref(), &bytes)?;
    info!(
        path = %path.as_ref().display(),
        rows = table.num_rows(),
        bytes = bytes.len(),
        "wrote export"
    );
    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{Loader, Pipeline, SourceEncoding};
    use anyhow::Result;
    use tempfile::NamedTempFile;

    const CSV: &str = "행정구역,2025년01월_총인구수,2025년01월_세대수\n\
                       \"서울특별시 종로구, 청운효자동\",\"1,000\",\"400\"\n";

    #[test]
    fn export_is_bom_prefixed_csv() -> Result<()> {
        let long = Pipeline::default().run_bytes(CSV.as_bytes())?;
        let bytes = to_csv_bytes(&long)?;

        assert!(bytes.starts_with(UTF8_BOM));
        let text = std::str::from_utf8(&bytes[UTF8_BOM.len()..])?;
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("행정구역,month,세대수,총인구수,average_household_size")
        );
        let row = lines.next().expect("one data row");
        assert!(row.starts_with("\"서울특별시 종로구, 청운효자동\",2025년01월,"));
        assert_eq!(lines.next(), None);
        Ok(())
    }

    #[test]
    fn export_reads_back_through_the_loader() -> Result<()> {
        let long = Pipeline::default().run_bytes(CSV.as_bytes())?;
        let tmp = NamedTempFile::new()?;
        let written = write_csv(&long, tmp.path())?;
        assert!(written > UTF8_BOM.len() as u64);

        let raw = Loader::default().load_path(tmp.path())?;
        assert_eq!(raw.encoding, SourceEncoding::Utf8);
        assert_eq!(
            raw.headers,
            ["행정구역", "month", "세대수", "총인구수", "average_household_size"]
        );
        assert_eq!(raw.rows[0][1], "2025년01월");
        assert_eq!(raw.rows[0][3].parse::<f64>()?, 1000.0);
        Ok(())
    }
}
