//! Column names of the superstore dataset.

pub const ORDER_DATE: &str = "Order Date";
pub const SHIP_DATE: &str = "Ship Date";
pub const ORDER_DAY: &str = "Order Date (Date)";
pub const SALES: &str = "Sales";
pub const PROFIT: &str = "Profit";
pub const DISCOUNT: &str = "Discount";
pub const QUANTITY: &str = "Quantity";
pub const REGION: &str = "Region";
pub const CATEGORY: &str = "Category";
pub const SUB_CATEGORY: &str = "Sub-Category";
pub const CUSTOMER_NAME: &str = "Customer Name";

/// Columns a complete dataset carries, in file order.
pub const EXPECTED_COLUMNS: [&str; 21] = [
    "Row ID",
    "Order ID",
    ORDER_DATE,
    SHIP_DATE,
    "Ship Mode",
    "Customer ID",
    CUSTOMER_NAME,
    "Segment",
    "Country",
    "City",
    "State",
    "Postal Code",
    REGION,
    "Product ID",
    CATEGORY,
    SUB_CATEGORY,
    "Product Name",
    SALES,
    QUANTITY,
    DISCOUNT,
    PROFIT,
];

/// Date columns parsed during normalization. Both must be present.
pub const DATE_COLUMNS: [&str; 2] = [ORDER_DATE, SHIP_DATE];

/// Columns coerced to numbers when present.
pub const NUMERIC_COLUMNS: [&str; 4] = [SALES, PROFIT, DISCOUNT, QUANTITY];

/// A row missing any of these is dropped.
pub const MANDATORY_COLUMNS: [&str; 3] = [ORDER_DATE, SALES, PROFIT];

/// Expected columns absent from `present`, in schema order.
pub fn missing_columns<S: AsRef<str>>(present: &[S]) -> Vec<String> {
    EXPECTED_COLUMNS
        .iter()
        .filter(|expected| !present.iter().any(|p| p.as_ref() == **expected))
        .map(|c| c.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_header_has_nothing_missing() {
        assert!(missing_columns(&EXPECTED_COLUMNS).is_empty());
    }

    #[test]
    fn reports_missing_in_schema_order() {
        let present: Vec<&str> = EXPECTED_COLUMNS
            .iter()
            .copied()
            .filter(|c| *c != "Postal Code" && *c != "Row ID")
            .collect();
        assert_eq!(missing_columns(&present), vec!["Row ID", "Postal Code"]);
    }
}
