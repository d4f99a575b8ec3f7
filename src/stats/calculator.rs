//! KPI Calculator Module
//! Totals and grouped sums the dashboard charts are drawn from.

use crate::data::schema::{CATEGORY, CUSTOMER_NAME, ORDER_DAY, PROFIT, REGION, SALES, SUB_CATEGORY};
use chrono::NaiveDate;
use polars::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
}

pub const DEFAULT_TOP_CUSTOMERS: usize = 5;

/// Headline figures for the filtered rows.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Kpis {
    pub total_sales: f64,
    pub total_profit: f64,
    /// Profit as a percentage of sales; `0` when there are no sales.
    pub margin_pct: f64,
}

/// Sales and profit summed over one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTotal {
    pub key: String,
    pub sales: f64,
    pub profit: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailySales {
    pub date: NaiveDate,
    pub sales: f64,
}

/// Everything the rendering surface needs besides the table itself.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DashboardSummary {
    pub kpis: Kpis,
    pub sales_by_region: Vec<GroupTotal>,
    pub profit_by_category: Vec<GroupTotal>,
    pub sales_over_time: Vec<DailySales>,
    pub top_customers: Vec<GroupTotal>,
    pub sub_category_performance: Vec<GroupTotal>,
}

/// Order of a grouped result.
#[derive(Debug, Clone, Copy)]
enum SortBy {
    SalesDesc,
    ProfitDesc,
    KeyAsc,
}

pub struct KpiCalculator;

impl KpiCalculator {
    fn has(df: &DataFrame, name: &str) -> bool {
        df.get_column_index(name).is_some()
    }

    fn column_sum(df: &DataFrame, name: &str) -> Result<f64, StatsError> {
        if !Self::has(df, name) {
            return Ok(0.0);
        }
        let values = df.column(name)?.cast(&DataType::Float64)?;
        Ok(values.f64()?.sum().unwrap_or(0.0))
    }

    pub fn compute_kpis(df: &DataFrame) -> Result<Kpis, StatsError> {
        let total_sales = Self::column_sum(df, SALES)?;
        let total_profit = Self::column_sum(df, PROFIT)?;
        let margin_pct = if total_sales != 0.0 {
            total_profit / total_sales * 100.0
        } else {
            0.0
        };
        Ok(Kpis {
            total_sales,
            total_profit,
            margin_pct,
        })
    }

    /// Sum sales and profit per value of `key`. Null keys are left out.
    fn grouped(df: &DataFrame, key: &str, sort: SortBy, limit: Option<u32>) -> Result<DataFrame, StatsError> {
        let mut lazy = df
            .clone()
            .lazy()
            .filter(col(key).is_not_null())
            .group_by([col(key)])
            .agg([
                col(SALES).cast(DataType::Float64).sum().alias(SALES),
                col(PROFIT).cast(DataType::Float64).sum().alias(PROFIT),
            ]);
        // Ties on the measure fall back to the key so repeated runs agree.
        let stable = |descending: bool| {
            SortMultipleOptions::default()
                .with_order_descending_multi([descending, false])
                .with_maintain_order(true)
        };
        lazy = match sort {
            SortBy::SalesDesc => lazy.sort([SALES, key], stable(true)),
            SortBy::ProfitDesc => lazy.sort([PROFIT, key], stable(true)),
            SortBy::KeyAsc => lazy.sort([key], SortMultipleOptions::default().with_maintain_order(true)),
        };
        if let Some(n) = limit {
            lazy = lazy.limit(n);
        }
        Ok(lazy.collect()?)
    }

    fn totals(grouped: &DataFrame, key: &str) -> Result<Vec<GroupTotal>, StatsError> {
        let keys = grouped.column(key)?.cast(&DataType::String)?;
        let sales = grouped.column(SALES)?.cast(&DataType::Float64)?;
        let profit = grouped.column(PROFIT)?.cast(&DataType::Float64)?;
        Ok(keys
            .str()?
            .into_iter()
            .zip(sales.f64()?.into_iter())
            .zip(profit.f64()?.into_iter())
            .map(|((k, s), p)| GroupTotal {
                key: k.unwrap_or_default().to_string(),
                sales: s.unwrap_or(0.0),
                profit: p.unwrap_or(0.0),
            })
            .collect())
    }

    fn group_totals(df: &DataFrame, key: &str, sort: SortBy, limit: Option<u32>) -> Result<Vec<GroupTotal>, StatsError> {
        if !Self::has(df, key) {
            return Ok(Vec::new());
        }
        Self::totals(&Self::grouped(df, key, sort, limit)?, key)
    }

    pub fn sales_by_region(df: &DataFrame) -> Result<Vec<GroupTotal>, StatsError> {
        Self::group_totals(df, REGION, SortBy::SalesDesc, None)
    }

    pub fn profit_by_category(df: &DataFrame) -> Result<Vec<GroupTotal>, StatsError> {
        Self::group_totals(df, CATEGORY, SortBy::ProfitDesc, None)
    }

    pub fn top_customers(df: &DataFrame, n: usize) -> Result<Vec<GroupTotal>, StatsError> {
        let n = u32::try_from(n).unwrap_or(u32::MAX);
        Self::group_totals(df, CUSTOMER_NAME, SortBy::SalesDesc, Some(n))
    }

    pub fn sub_category_performance(df: &DataFrame) -> Result<Vec<GroupTotal>, StatsError> {
        Self::group_totals(df, SUB_CATEGORY, SortBy::SalesDesc, None)
    }

    /// Daily sales totals in date order.
    pub fn sales_over_time(df: &DataFrame) -> Result<Vec<DailySales>, StatsError> {
        if !Self::has(df, ORDER_DAY) {
            return Ok(Vec::new());
        }
        let grouped = Self::grouped(df, ORDER_DAY, SortBy::KeyAsc, None)?;
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
        let days = grouped.column(ORDER_DAY)?.cast(&DataType::Int32)?;
        let sales = grouped.column(SALES)?.cast(&DataType::Float64)?;
        Ok(days
            .i32()?
            .into_iter()
            .zip(sales.f64()?.into_iter())
            .filter_map(|(d, s)| {
                let date = epoch.checked_add_signed(chrono::Duration::days(d? as i64))?;
                Some(DailySales {
                    date,
                    sales: s.unwrap_or(0.0),
                })
            })
            .collect())
    }

    /// All dashboard aggregates for the filtered table.
    pub fn summarize(df: &DataFrame, top_n: usize) -> Result<DashboardSummary, StatsError> {
        Ok(DashboardSummary {
            kpis: Self::compute_kpis(df)?,
            sales_by_region: Self::sales_by_region(df)?,
            profit_by_category: Self::profit_by_category(df)?,
            sales_over_time: Self::sales_over_time(df)?,
            top_customers: Self::top_customers(df, top_n)?,
            sub_category_performance: Self::sub_category_performance(df)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::normalizer::DataNormalizer;

    fn normalized() -> DataFrame {
        let raw = df!(
            "Order Date" => ["01/02/2016", "01/02/2016", "01/03/2016", "01/05/2016", "01/05/2016", "01/06/2016"],
            "Ship Date" => ["01/04/2016", "01/04/2016", "01/05/2016", "01/07/2016", "01/07/2016", "01/08/2016"],
            "Customer Name" => ["Ann", "Bob", "Ann", "Cy", "Dee", "Eve"],
            "Region" => ["East", "West", "East", "South", "West", "Central"],
            "Category" => ["Furniture", "Technology", "Technology", "Office Supplies", "Furniture", "Technology"],
            "Sub-Category" => ["Chairs", "Phones", "Phones", "Paper", "Tables", "Copiers"],
            "Sales" => [100.0, 200.0, 50.0, 10.0, 300.0, 40.0],
            "Profit" => [10.0, -20.0, 5.0, 1.0, 30.0, 4.0]
        )
        .unwrap();
        DataNormalizer::normalize(&raw).unwrap()
    }

    #[test]
    fn kpis_and_margin() {
        let kpis = KpiCalculator::compute_kpis(&normalized()).unwrap();
        assert_eq!(kpis.total_sales, 700.0);
        assert_eq!(kpis.total_profit, 30.0);
        assert!((kpis.margin_pct - 30.0 / 700.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn zero_sales_means_zero_margin() {
        let empty = normalized().head(Some(0));
        let kpis = KpiCalculator::compute_kpis(&empty).unwrap();
        assert_eq!(kpis, Kpis::default());
    }

    #[test]
    fn region_totals_sorted_by_sales() {
        let totals = KpiCalculator::sales_by_region(&normalized()).unwrap();
        let keys: Vec<&str> = totals.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["West", "East", "Central", "South"]);
        assert_eq!(totals[0].sales, 500.0);
    }

    #[test]
    fn category_totals_sorted_by_profit() {
        let totals = KpiCalculator::profit_by_category(&normalized()).unwrap();
        let keys: Vec<&str> = totals.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["Furniture", "Office Supplies", "Technology"]);
        assert_eq!(totals[2].profit, -11.0);
    }

    #[test]
    fn top_customers_are_limited() {
        let top = KpiCalculator::top_customers(&normalized(), 2).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].key, "Dee");
        assert_eq!(top[1].key, "Bob");
    }

    #[test]
    fn tied_customers_rank_by_name() {
        let raw = df!(
            "Order Date" => ["01/02/2016", "01/02/2016", "01/02/2016", "01/02/2016"],
            "Ship Date" => ["01/04/2016", "01/04/2016", "01/04/2016", "01/04/2016"],
            "Customer Name" => ["Zoe", "Max", "Ada", "Lee"],
            "Sales" => [50.0, 50.0, 50.0, 10.0],
            "Profit" => [1.0, 1.0, 1.0, 1.0]
        )
        .unwrap();
        let df = DataNormalizer::normalize(&raw).unwrap();
        for _ in 0..5 {
            let top = KpiCalculator::top_customers(&df, 2).unwrap();
            let keys: Vec<&str> = top.iter().map(|t| t.key.as_str()).collect();
            assert_eq!(keys, vec!["Ada", "Max"]);
        }
    }

    #[test]
    fn daily_sales_in_date_order() {
        let series = KpiCalculator::sales_over_time(&normalized()).unwrap();
        let dates: Vec<NaiveDate> = series.iter().map(|d| d.date).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2016, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2016, 1, 3).unwrap(),
                NaiveDate::from_ymd_opt(2016, 1, 5).unwrap(),
                NaiveDate::from_ymd_opt(2016, 1, 6).unwrap(),
            ]
        );
        assert_eq!(series[0].sales, 300.0);
        assert_eq!(series[2].sales, 310.0);
    }

    #[test]
    fn absent_dimensions_are_skipped() {
        let df = normalized().drop("Customer Name").unwrap();
        let summary = KpiCalculator::summarize(&df, DEFAULT_TOP_CUSTOMERS).unwrap();
        assert!(summary.top_customers.is_empty());
        assert_eq!(summary.sub_category_performance.len(), 5);
    }
}
