//! Data Loader Module
//! Resolves a data source (default file or upload) into a raw table.

use super::cache::{Fingerprint, MemoCache};
use super::schema;
use super::xlsx::{self, SpreadsheetError};
use polars::prelude::*;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Dataset not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("Failed to read dataset: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to load CSV: {0}")]
    CsvError(#[from] PolarsError),
    #[error("Failed to load spreadsheet: {0}")]
    Spreadsheet(#[from] SpreadsheetError),
}

/// Non-fatal findings about a loaded table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    #[error("Missing columns: {missing:?}")]
    SchemaIncomplete { missing: Vec<String> },
}

/// A file handed over interactively. The name only decides the format.
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Arc<[u8]>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Path(PathBuf),
    Upload(Upload),
}

impl DataSource {
    fn name(&self) -> &str {
        match self {
            DataSource::Path(path) => path.to_str().unwrap_or_default(),
            DataSource::Upload(upload) => &upload.file_name,
        }
    }
}

/// How the bytes of a source are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited,
    Spreadsheet,
}

impl SourceFormat {
    /// `.xlsx` and `.xls` are spreadsheets, everything else is delimited text.
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            SourceFormat::Spreadsheet
        } else {
            SourceFormat::Delimited
        }
    }
}

/// Text codec for delimited sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// Every byte maps to the code point of the same value.
    Latin1,
    /// Invalid sequences become U+FFFD.
    Utf8Lossy,
}

impl TextEncoding {
    /// Bytes for the CSV reader and the codec it should apply to them.
    /// Polars has no Latin-1 codec, so that case is transcoded up front.
    fn prepare(self, bytes: &[u8]) -> (Vec<u8>, CsvEncoding) {
        match self {
            TextEncoding::Latin1 => {
                let text: String = bytes.iter().map(|&b| b as char).collect();
                (text.into_bytes(), CsvEncoding::Utf8)
            }
            TextEncoding::Utf8Lossy => (bytes.to_vec(), CsvEncoding::LossyUtf8),
        }
    }
}

/// A raw table plus what the loader noticed about it.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub frame: DataFrame,
    pub fingerprint: Fingerprint,
    pub warnings: Vec<LoadWarning>,
}

/// Loads data sources, remembering results per source fingerprint.
pub struct DataLoader {
    cache: MemoCache<LoadedTable>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            cache: MemoCache::default(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cache: MemoCache::new(capacity),
        }
    }

    /// Number of distinct sources currently remembered.
    pub fn cached_sources(&self) -> usize {
        self.cache.len()
    }

    /// Load a source, reusing the previous result when its fingerprint is unchanged.
    pub fn load(&mut self, source: &DataSource) -> Result<LoadedTable, LoaderError> {
        let fingerprint = Self::fingerprint(source)?;
        self.cache
            .get_or_try_insert_with(fingerprint, || Self::load_uncached(source, fingerprint))
    }

    /// Fingerprint a source. A missing path is `SourceNotFound`.
    pub fn fingerprint(source: &DataSource) -> Result<Fingerprint, LoaderError> {
        match source {
            DataSource::Path(path) => {
                let metadata = std::fs::metadata(path)
                    .map_err(|_| LoaderError::SourceNotFound(path.clone()))?;
                Ok(Fingerprint::of_file(path, &metadata))
            }
            DataSource::Upload(upload) => Ok(Fingerprint::of_upload(&upload.file_name, &upload.bytes)),
        }
    }

    #[instrument(level = "info", skip(source), fields(name = source.name()))]
    fn load_uncached(source: &DataSource, fingerprint: Fingerprint) -> Result<LoadedTable, LoaderError> {
        let mut frame = match source {
            DataSource::Path(path) => Self::read_path(path)?,
            DataSource::Upload(upload) => Self::decode(
                &upload.bytes,
                SourceFormat::from_name(&upload.file_name),
                TextEncoding::Utf8Lossy,
            )?,
        };

        Self::trim_column_names(&mut frame)?;

        let mut warnings = Vec::new();
        let missing = schema::missing_columns(&Self::column_names(&frame));
        if !missing.is_empty() {
            warn!(?missing, "dataset is missing expected columns");
            warnings.push(LoadWarning::SchemaIncomplete { missing });
        }

        debug!(rows = frame.height(), columns = frame.width(), "loaded dataset");
        Ok(LoadedTable {
            frame,
            fingerprint,
            warnings,
        })
    }

    fn read_path(path: &Path) -> Result<DataFrame, LoaderError> {
        if !path.exists() {
            return Err(LoaderError::SourceNotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        let name = path.to_string_lossy();
        Self::decode(&bytes, SourceFormat::from_name(&name), TextEncoding::Latin1)
    }

    /// Decode raw bytes into a table.
    pub fn decode(bytes: &[u8], format: SourceFormat, encoding: TextEncoding) -> Result<DataFrame, LoaderError> {
        match format {
            SourceFormat::Spreadsheet => Ok(xlsx::read_xlsx(bytes)?),
            SourceFormat::Delimited => Self::read_csv(bytes, encoding),
        }
    }

    /// Types are inferred over every row, so a late value that does not fit
    /// the early rows widens the column instead of being nulled.
    fn read_csv(bytes: &[u8], encoding: TextEncoding) -> Result<DataFrame, LoaderError> {
        let (bytes, codec) = encoding.prepare(bytes);
        let parse_options = CsvParseOptions::default()
            .with_encoding(codec)
            .with_missing_is_null(true);
        let df = CsvReadOptions::default()
            .with_parse_options(parse_options)
            .with_has_header(true)
            .with_infer_schema_length(None)
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()?;
        Ok(df)
    }

    fn trim_column_names(df: &mut DataFrame) -> PolarsResult<()> {
        let names = Self::column_names(df);
        if names.iter().all(|n| n.trim() == n.as_str()) {
            return Ok(());
        }
        df.set_column_names(names.iter().map(|n| n.trim()))
    }

    fn column_names(df: &DataFrame) -> Vec<String> {
        df.get_column_names().iter().map(|s| s.to_string()).collect()
    }
}
