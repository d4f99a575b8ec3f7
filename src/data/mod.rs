//! Data module - loading, normalization, filtering and export

pub mod cache;
pub mod datetime;
pub mod export;
pub mod filter;
pub mod loader;
pub mod normalizer;
pub mod schema;
mod xlsx;

pub use cache::MemoCache;
pub use export::{export_csv, write_export};
pub use filter::{DataFilter, FilterSelection};
pub use loader::{DataLoader, DataSource, LoadWarning, LoaderError, Upload};
pub use normalizer::{DataNormalizer, NormalizeError};
