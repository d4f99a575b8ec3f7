//! Superstore Dashboard - sales dataset ingestion and KPI report
//!
//! Loads the default dataset (or a configured upload), normalizes it, applies
//! the configured filters and prints the dashboard figures.

mod app;
mod config;
mod data;
mod report;
mod stats;

use anyhow::Result;
use app::{AppError, DashboardApp};
use config::DashboardConfig;
use data::{LoaderError, NormalizeError};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = DashboardConfig::load(config_path.as_deref())?;
    let source = config.source()?;

    let mut app = DashboardApp::new(config.cache_capacity, config.top_customers);
    let view = match app.refresh(&source, &config.filters) {
        Ok(view) => view,
        Err(AppError::Load(LoaderError::SourceNotFound(path))) => {
            info!(path = %path.display(), "dataset not found");
            println!("Upload dataset: set \"upload\" in {}.", config::DEFAULT_CONFIG_FILE);
            return Ok(());
        }
        Err(AppError::Normalize(NormalizeError::RequiredColumnMissing(column))) => {
            error!(%column, "required column missing");
            anyhow::bail!("Missing column '{}'", column);
        }
        Err(e) => return Err(e.into()),
    };

    for warning in &view.warnings {
        warn!("{}", warning);
    }

    print!("{}", report::Report::new(&view, config.preview_rows));

    if let Some(dir) = &config.export_dir {
        let path = data::write_export(&view.filtered, dir)?;
        println!("Exported {} rows to {}", view.filtered.height(), path.display());
    }

    Ok(())
}
