//! Row filtering by region, category and sub-category.

use super::schema::{CATEGORY, REGION, SUB_CATEGORY};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Selected values per dimension. An empty set places no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSelection {
    pub regions: BTreeSet<String>,
    pub categories: BTreeSet<String>,
    pub sub_categories: BTreeSet<String>,
}

impl FilterSelection {
    /// Every value present in the table, per dimension.
    pub fn select_all(df: &DataFrame) -> PolarsResult<Self> {
        Ok(Self {
            regions: domain_values(df, REGION)?,
            categories: domain_values(df, CATEGORY)?,
            sub_categories: domain_values(df, SUB_CATEGORY)?,
        })
    }

    fn dimensions(&self) -> [(&'static str, &BTreeSet<String>); 3] {
        [
            (REGION, &self.regions),
            (CATEGORY, &self.categories),
            (SUB_CATEGORY, &self.sub_categories),
        ]
    }
}

/// Distinct non-null values of `column`, sorted. Empty when the column is absent.
pub fn domain_values(df: &DataFrame, column: &str) -> PolarsResult<BTreeSet<String>> {
    if df.get_column_index(column).is_none() {
        return Ok(BTreeSet::new());
    }
    let text = df.column(column)?.cast(&DataType::String)?;
    Ok(text.str()?.into_iter().flatten().map(str::to_owned).collect())
}

pub struct DataFilter;

impl DataFilter {
    /// Rows whose region, category and sub-category are in the selection.
    ///
    /// Dimensions with an empty selection, or whose column is absent, are
    /// skipped. Nulls never match a non-empty selection.
    pub fn apply(df: &DataFrame, selection: &FilterSelection) -> PolarsResult<DataFrame> {
        let mut mask = BooleanChunked::full("mask".into(), true, df.height());
        for (column, selected) in selection.dimensions() {
            if selected.is_empty() || df.get_column_index(column).is_none() {
                continue;
            }
            let text = df.column(column)?.cast(&DataType::String)?;
            let member: Vec<bool> = text
                .str()?
                .into_iter()
                .map(|v| v.is_some_and(|v| selected.contains(v)))
                .collect();
            mask = &mask & &BooleanChunked::from_slice(column.into(), &member);
        }
        df.filter(&mask)
    }
}
