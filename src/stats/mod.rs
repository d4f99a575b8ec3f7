//! Stats module - KPIs and grouped aggregates

mod calculator;

pub use calculator::{
    DashboardSummary, GroupTotal, KpiCalculator, StatsError, DEFAULT_TOP_CUSTOMERS,
};
