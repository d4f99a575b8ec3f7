//! CSV export of the filtered table.

use polars::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const EXPORT_FILE_NAME: &str = "filtered_data.csv";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to encode CSV: {0}")]
    Csv(#[from] PolarsError),
    #[error("Failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

/// UTF-8 CSV bytes of `df`, header included.
pub fn export_csv(df: &DataFrame) -> Result<Vec<u8>, ExportError> {
    let mut buf = Vec::new();
    let mut df = df.clone();
    CsvWriter::new(&mut buf).include_header(true).finish(&mut df)?;
    Ok(buf)
}

/// Write the export into `dir` as `filtered_data.csv`.
pub fn write_export(df: &DataFrame, dir: &Path) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(EXPORT_FILE_NAME);
    std::fs::write(&path, export_csv(df)?)?;
    tracing::info!(path = %path.display(), rows = df.height(), "wrote export");
    Ok(path)
}
