//! Plain-text rendering of a dashboard view.

use crate::app::DashboardView;
use crate::stats::GroupTotal;
use std::collections::BTreeSet;
use std::fmt;

/// `1234567.891` → `$1,234,567.89`
pub fn format_currency(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let cents = format!("{:.2}", value.abs());
    let (whole, frac) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));
    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}${}.{}", sign, grouped, frac)
}

/// Dashboard figures for one refresh, printable with `{}`.
pub struct Report<'a> {
    view: &'a DashboardView,
    preview_rows: usize,
}

impl<'a> Report<'a> {
    pub fn new(view: &'a DashboardView, preview_rows: usize) -> Self {
        Self { view, preview_rows }
    }
}

fn section(f: &mut fmt::Formatter<'_>, title: &str, rows: &[GroupTotal], with_profit: bool) -> fmt::Result {
    if rows.is_empty() {
        return Ok(());
    }
    writeln!(f, "\n{}", title)?;
    for row in rows {
        if with_profit {
            writeln!(
                f,
                "  {:<24} {:>16} {:>16}",
                row.key,
                format_currency(row.sales),
                format_currency(row.profit)
            )?;
        } else {
            writeln!(f, "  {:<24} {:>16}", row.key, format_currency(row.sales))?;
        }
    }
    Ok(())
}

fn domain(f: &mut fmt::Formatter<'_>, label: &str, values: &BTreeSet<String>) -> fmt::Result {
    if values.is_empty() {
        return Ok(());
    }
    let joined: Vec<&str> = values.iter().map(String::as_str).collect();
    writeln!(f, "  {:<14} {}", label, joined.join(", "))
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let view = self.view;
        let summary = &view.summary;

        writeln!(f, "Total Sales    {}", format_currency(summary.kpis.total_sales))?;
        writeln!(f, "Total Profit   {}", format_currency(summary.kpis.total_profit))?;
        writeln!(f, "Profit Margin  {:.2}%", summary.kpis.margin_pct)?;

        writeln!(f, "\nFilters available")?;
        domain(f, "Region", &view.domains.regions)?;
        domain(f, "Category", &view.domains.categories)?;
        domain(f, "Sub-Category", &view.domains.sub_categories)?;

        section(f, "Sales by Region", &summary.sales_by_region, false)?;

        if !summary.profit_by_category.is_empty() {
            writeln!(f, "\nProfit by Category")?;
            for row in &summary.profit_by_category {
                writeln!(f, "  {:<24} {:>16}", row.key, format_currency(row.profit))?;
            }
        }

        if let (Some(first), Some(last)) = (summary.sales_over_time.first(), summary.sales_over_time.last()) {
            writeln!(
                f,
                "\nSales Over Time: {} days from {} to {}",
                summary.sales_over_time.len(),
                first.date,
                last.date
            )?;
        }

        section(f, "Top Customers", &summary.top_customers, false)?;
        section(f, "Sub-Category Performance", &summary.sub_category_performance, true)?;

        writeln!(f, "\nRaw Data Preview\n{}", view.filtered.head(Some(self.preview_rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::DashboardApp;
    use crate::data::{DataSource, FilterSelection, Upload};

    #[test]
    fn currency_grouping() {
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(999.999), "$1,000.00");
        assert_eq!(format_currency(1234567.891), "$1,234,567.89");
        assert_eq!(format_currency(-383.031), "-$383.03");
    }

    #[test]
    fn report_lists_figures_and_filter_values() {
        let csv = "Order Date,Ship Date,Region,Category,Sub-Category,Customer Name,Sales,Profit\n\
            11/08/2016,11/11/2016,South,Furniture,Bookcases,Claire Gute,261.96,41.9136\n\
            06/12/2016,06/16/2016,West,Office Supplies,Labels,Darrin Van Huff,14.62,6.8714\n";
        let source = DataSource::Upload(Upload::new("orders.csv", csv.as_bytes().to_vec()));
        let view = DashboardApp::new(2, 5)
            .refresh(&source, &FilterSelection::default())
            .unwrap();

        let text = Report::new(&view, 1).to_string();
        assert!(text.starts_with("Total Sales    $276.58\n"));
        assert!(text.contains("  Region         South, West\n"));
        assert!(text.contains("  Sub-Category   Bookcases, Labels\n"));
        assert!(text.contains("Top Customers\n  Claire Gute"));
    }
}
