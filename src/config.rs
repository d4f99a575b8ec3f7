//! Dashboard configuration, read from an optional JSON file.

use crate::data::cache::DEFAULT_CACHE_CAPACITY;
use crate::data::{DataSource, FilterSelection, Upload};
use crate::stats::DEFAULT_TOP_CUSTOMERS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "dashboard.json";
pub const DEFAULT_DATA_PATH: &str = "data/Global_Superstore.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Dataset read when no upload is given.
    pub data_path: PathBuf,
    /// File treated as an interactive upload, taking precedence over `data_path`.
    pub upload: Option<PathBuf>,
    pub filters: FilterSelection,
    /// Where `filtered_data.csv` goes. No export when unset.
    pub export_dir: Option<PathBuf>,
    pub cache_capacity: usize,
    pub preview_rows: usize,
    pub top_customers: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            upload: None,
            filters: FilterSelection::default(),
            export_dir: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            preview_rows: 50,
            top_customers: DEFAULT_TOP_CUSTOMERS,
        }
    }
}

impl DashboardConfig {
    /// Load from `path`, or from `dashboard.json` if it exists, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// The upload if one is configured, the default dataset path otherwise.
    pub fn source(&self) -> Result<DataSource> {
        match &self.upload {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("reading upload {}", path.display()))?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(DataSource::Upload(Upload::new(file_name, bytes)))
            }
            None => Ok(DataSource::Path(self.data_path.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = DashboardConfig::from_json(
            r#"{ "filters": { "regions": ["East"] }, "preview_rows": 10 }"#,
        )
        .unwrap();
        assert_eq!(config.data_path, PathBuf::from(DEFAULT_DATA_PATH));
        assert_eq!(config.preview_rows, 10);
        assert!(config.filters.regions.contains("East"));
        assert!(config.filters.categories.is_empty());
        assert_eq!(config.top_customers, 5);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(DashboardConfig::from_json("{ nope").is_err());
    }

    #[test]
    fn upload_takes_precedence() {
        let dir = tempdir().unwrap();
        let upload = dir.path().join("mine.xlsx");
        std::fs::write(&upload, b"PK").unwrap();
        let config = DashboardConfig {
            upload: Some(upload),
            ..Default::default()
        };
        match config.source().unwrap() {
            DataSource::Upload(u) => {
                assert_eq!(u.file_name, "mine.xlsx");
                assert_eq!(&*u.bytes, b"PK");
            }
            other => panic!("unexpected source: {:?}", other),
        }
        assert_eq!(
            DashboardConfig::default().source().unwrap(),
            DataSource::Path(PathBuf::from(DEFAULT_DATA_PATH))
        );
    }

    #[test]
    fn explicit_path_is_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        std::fs::write(&path, r#"{ "export_dir": "out" }"#).unwrap();
        let config = DashboardConfig::load(Some(&path)).unwrap();
        assert_eq!(config.export_dir, Some(PathBuf::from("out")));
    }
}
