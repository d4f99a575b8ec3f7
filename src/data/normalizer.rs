//! Data Normalizer Module
//! Turns a raw table into an analysis-ready one: typed dates, numeric
//! measures and no rows missing a mandatory field.

use super::datetime::{self, DateOrder};
use super::schema::{
    DATE_COLUMNS, MANDATORY_COLUMNS, NUMERIC_COLUMNS, ORDER_DATE, ORDER_DAY, PROFIT, SALES,
};
use polars::prelude::*;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("Missing column '{0}'")]
    RequiredColumnMissing(String),
    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
}

/// Storage type of every parsed date column.
pub fn datetime_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, None)
}

pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float32
            | DataType::Float64
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Stateless normalization of raw tables.
pub struct DataNormalizer;

impl DataNormalizer {
    /// Normalize a raw table.
    ///
    /// Parses `Order Date` and `Ship Date`, coerces the numeric measures,
    /// drops rows without an order date, sales or profit, and appends
    /// `Order Date (Date)`. Unknown columns pass through untouched. The input
    /// is never modified.
    #[instrument(level = "debug", skip(raw), fields(rows = raw.height()))]
    pub fn normalize(raw: &DataFrame) -> Result<DataFrame, NormalizeError> {
        for name in DATE_COLUMNS {
            Self::require(raw, name)?;
        }
        for name in [SALES, PROFIT] {
            Self::require(raw, name)?;
        }

        let mut df = raw.clone();

        for name in DATE_COLUMNS {
            let parsed = Self::parse_dates(df.column(name)?)?;
            df.replace(name, parsed)?;
        }

        for name in NUMERIC_COLUMNS {
            if df.get_column_index(name).is_none() {
                continue;
            }
            let coerced = Self::coerce_numeric(df.column(name)?)?;
            df.replace(name, coerced)?;
        }

        let before = df.height();
        let mut df = Self::drop_incomplete_rows(&df)?;
        if df.height() < before {
            info!(
                dropped = before - df.height(),
                kept = df.height(),
                "dropped rows missing order date, sales or profit"
            );
        }

        let order_day = df
            .column(ORDER_DATE)?
            .as_materialized_series()
            .cast(&DataType::Date)?
            .with_name(ORDER_DAY.into());
        df.with_column(order_day)?;

        Ok(df)
    }

    fn require(df: &DataFrame, name: &str) -> Result<(), NormalizeError> {
        match df.get_column_index(name) {
            Some(_) => Ok(()),
            None => Err(NormalizeError::RequiredColumnMissing(name.to_string())),
        }
    }

    /// Parse a date column. Already-typed dates are only re-cast.
    fn parse_dates(column: &Column) -> PolarsResult<Series> {
        let name = column.name().clone();
        if matches!(column.dtype(), DataType::Datetime(_, _) | DataType::Date) {
            return column.as_materialized_series().cast(&datetime_dtype());
        }

        let text = column.cast(&DataType::String)?;
        let parsed = datetime::parse_column(text.str()?.into_iter());
        debug!(
            column = %name,
            day_first = parsed.order == DateOrder::DayFirst,
            nulls = parsed.null_count(),
            "parsed date column"
        );

        let millis: Vec<Option<i64>> = parsed
            .values
            .iter()
            .map(|v| v.map(|dt| dt.and_utc().timestamp_millis()))
            .collect();
        Series::new(name, millis).cast(&datetime_dtype())
    }

    /// Coerce a column to numbers. Unparseable text and NaN become null.
    fn coerce_numeric(column: &Column) -> PolarsResult<Series> {
        let name = column.name().clone();
        let series = column.as_materialized_series();
        match column.dtype() {
            DataType::Float32 | DataType::Float64 => {
                let floats = series.cast(&DataType::Float64)?;
                let ca = floats.f64()?;
                if ca.into_iter().any(|v| v.is_some_and(f64::is_nan)) {
                    let cleaned: Vec<Option<f64>> =
                        ca.into_iter().map(|v| v.filter(|x| !x.is_nan())).collect();
                    Ok(Series::new(name, cleaned))
                } else {
                    Ok(series.clone())
                }
            }
            dtype if is_numeric_dtype(dtype) => Ok(series.clone()),
            DataType::Boolean => Ok(series.clone()),
            DataType::String => {
                let values: Vec<Option<f64>> = series
                    .str()?
                    .into_iter()
                    .map(|v| {
                        v.and_then(|s| s.trim().parse::<f64>().ok())
                            .filter(|x| !x.is_nan())
                    })
                    .collect();
                Ok(Series::new(name, values))
            }
            _ => series.cast(&DataType::Float64),
        }
    }

    fn drop_incomplete_rows(df: &DataFrame) -> PolarsResult<DataFrame> {
        let mut keep = BooleanChunked::full("keep".into(), true, df.height());
        for name in MANDATORY_COLUMNS {
            let present = df.column(name)?.as_materialized_series().is_not_null();
            keep = &keep & &present;
        }
        df.filter(&keep)
    }
}
