//! Dashboard Session
//! Runs load → normalize → filter → aggregate for each interaction, reusing
//! cached loads and normalizations while the source is unchanged.

use crate::data::{
    DataFilter, DataLoader, DataNormalizer, DataSource, FilterSelection, LoadWarning, LoaderError,
    MemoCache, NormalizeError,
};
use crate::stats::{DashboardSummary, KpiCalculator, StatsError};
use polars::prelude::*;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Load(#[from] LoaderError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error("Filter failed: {0}")]
    Filter(#[from] PolarsError),
}

/// What one refresh produces for the rendering surface.
#[derive(Debug, Clone)]
pub struct DashboardView {
    pub filtered: DataFrame,
    pub warnings: Vec<LoadWarning>,
    /// Full value domains of the normalized table, for the filter widgets.
    pub domains: FilterSelection,
    pub summary: DashboardSummary,
}

/// One user session.
pub struct DashboardApp {
    loader: DataLoader,
    normalized: MemoCache<DataFrame>,
    top_customers: usize,
}

impl DashboardApp {
    pub fn new(cache_capacity: usize, top_customers: usize) -> Self {
        Self {
            loader: DataLoader::with_capacity(cache_capacity),
            normalized: MemoCache::new(cache_capacity),
            top_customers,
        }
    }

    pub fn refresh(&mut self, source: &DataSource, selection: &FilterSelection) -> Result<DashboardView, AppError> {
        let loaded = self.loader.load(source)?;
        let normalized = self
            .normalized
            .get_or_try_insert_with(loaded.fingerprint, || DataNormalizer::normalize(&loaded.frame))?;

        let domains = FilterSelection::select_all(&normalized)?;
        let filtered = DataFilter::apply(&normalized, selection)?;
        info!(
            normalized = normalized.height(),
            filtered = filtered.height(),
            cached_sources = self.loader.cached_sources(),
            cached_normalized = self.normalized.len(),
            "refreshed dashboard"
        );
        let summary = KpiCalculator::summarize(&filtered, self.top_customers)?;

        Ok(DashboardView {
            filtered,
            warnings: loaded.warnings,
            domains,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{export_csv, Upload};
    use std::collections::BTreeSet;

    const CSV: &str = "Order Date,Ship Date,Region,Category,Sub-Category,Customer Name,Sales,Profit\n\
        11/08/2016,11/11/2016,South,Furniture,Bookcases,Claire Gute,261.96,41.9136\n\
        06/12/2016,06/16/2016,West,Office Supplies,Labels,Darrin Van Huff,14.62,6.8714\n\
        10/11/2015,10/18/2015,South,Furniture,Tables,Sean O'Donnell,957.5775,-383.031\n\
        bad,10/18/2015,East,Technology,Phones,Brosina Hoffman,10,1\n";

    fn upload(csv: &str) -> DataSource {
        DataSource::Upload(Upload::new("orders.csv", csv.as_bytes().to_vec()))
    }

    #[test]
    fn refresh_filters_and_summarizes() {
        let mut app = DashboardApp::new(4, 5);
        let selection = FilterSelection {
            regions: BTreeSet::from(["South".to_string()]),
            ..Default::default()
        };
        let view = app.refresh(&upload(CSV), &selection).unwrap();

        assert_eq!(view.filtered.height(), 2);
        assert_eq!(view.domains.regions, BTreeSet::from(["South".to_string(), "West".to_string()]));
        assert!((view.summary.kpis.total_sales - 1219.5375).abs() < 1e-9);
        assert_eq!(view.summary.sales_by_region.len(), 1);
        assert!(matches!(view.warnings.as_slice(), [LoadWarning::SchemaIncomplete { .. }]));
    }

    #[test]
    fn filter_changes_reuse_cached_stages() {
        let mut app = DashboardApp::new(4, 5);
        let source = upload(CSV);
        app.refresh(&source, &FilterSelection::default()).unwrap();
        app.refresh(
            &source,
            &FilterSelection {
                categories: BTreeSet::from(["Furniture".to_string()]),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(app.loader.cached_sources(), 1);
        assert_eq!(app.normalized.len(), 1);
    }

    #[test]
    fn missing_order_date_halts_the_pipeline() {
        let mut app = DashboardApp::new(4, 5);
        let err = app
            .refresh(&upload("Ship Date,Sales,Profit\n01/01/2016,1,1\n"), &FilterSelection::default())
            .unwrap_err();
        assert!(matches!(err, AppError::Normalize(NormalizeError::RequiredColumnMissing(_))));
        assert!(app.normalized.is_empty());
    }

    #[test]
    fn missing_default_file_is_source_not_found() {
        let mut app = DashboardApp::new(4, 5);
        let err = app
            .refresh(&DataSource::Path("does/not/exist.csv".into()), &FilterSelection::default())
            .unwrap_err();
        assert!(matches!(err, AppError::Load(LoaderError::SourceNotFound(_))));
    }

    #[test]
    fn empty_selection_exports_every_normalized_row() {
        let mut app = DashboardApp::new(4, 5);
        let view = app.refresh(&upload(CSV), &FilterSelection::default()).unwrap();
        assert_eq!(view.filtered.height(), 3);
        let text = String::from_utf8(export_csv(&view.filtered).unwrap()).unwrap();
        assert_eq!(text.lines().count(), 4);
    }
}
