//! Date parsing with month-first / day-first disambiguation.
//!
//! A column is parsed month-first. When more than half of its cells come out
//! null, the whole column is parsed again day-first. The decision is made once
//! per column, never per cell.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Fraction of nulls above which the month-first parse is rejected.
pub const DAY_FIRST_THRESHOLD: f64 = 0.5;

/// Field order assumed for ambiguous numeric dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    MonthFirst,
    DayFirst,
}

/// Unambiguous year-first forms, valid under both orders.
const ISO_DATETIME: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
];
const ISO_DATE: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

/// Month names are unambiguous too.
const NAMED_DATE: &[&str] = &[
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%d-%b-%y",
    "%d-%b-%Y",
];

// Two-digit years are tried first; `%y` rejects a four-digit year outright,
// while `%Y` would accept "16" as year 16.
const MONTH_FIRST_DATE: &[&str] = &[
    "%m/%d/%y", "%m/%d/%Y", "%m-%d-%y", "%m-%d-%Y", "%m.%d.%y", "%m.%d.%Y",
];
const DAY_FIRST_DATE: &[&str] = &[
    "%d/%m/%y", "%d/%m/%Y", "%d-%m-%y", "%d-%m-%Y", "%d.%m.%y", "%d.%m.%Y",
];

const TIME_SUFFIXES: &[&str] = &[" %H:%M:%S%.f", " %H:%M", " %I:%M:%S %p", " %I:%M %p"];

impl DateOrder {
    fn numeric_formats(self) -> &'static [&'static str] {
        match self {
            DateOrder::MonthFirst => MONTH_FIRST_DATE,
            DateOrder::DayFirst => DAY_FIRST_DATE,
        }
    }
}

fn parse_date_only(s: &str, formats: &[&str]) -> Option<NaiveDateTime> {
    formats
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        .map(|d| d.and_time(NaiveTime::MIN))
}

fn parse_with_time(s: &str, date_formats: &[&str]) -> Option<NaiveDateTime> {
    date_formats.iter().find_map(|date| {
        TIME_SUFFIXES.iter().find_map(|time| {
            let format = format!("{}{}", date, time);
            NaiveDateTime::parse_from_str(s, &format).ok()
        })
    })
}

/// `%Y` takes any digit count, so year-first forms are only tried on a
/// four-digit leading year. Otherwise "13-04-16" would parse as year 13.
fn starts_with_year(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() > 4 && b[..4].iter().all(u8::is_ascii_digit) && !b[4].is_ascii_digit()
}

/// Parse one cell under the given order. Blank or unparseable text is `None`.
pub fn parse_datetime(raw: &str, order: DateOrder) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let iso = if starts_with_year(s) {
        ISO_DATETIME
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
            .or_else(|| parse_date_only(s, ISO_DATE))
    } else {
        None
    };
    iso.or_else(|| parse_date_only(s, order.numeric_formats()))
        .or_else(|| parse_date_only(s, NAMED_DATE))
        .or_else(|| {
            // Only attempt the time-bearing forms when there is something after the date.
            if s.contains(' ') {
                parse_with_time(s, order.numeric_formats())
            } else {
                None
            }
        })
}

/// Result of parsing a whole column.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDates {
    pub values: Vec<Option<NaiveDateTime>>,
    pub order: DateOrder,
}

impl ParsedDates {
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }
}

fn null_fraction(values: &[Option<NaiveDateTime>]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().filter(|v| v.is_none()).count() as f64 / values.len() as f64
}

/// Parse a column month-first, falling back to day-first when more than
/// half the month-first results are null. Null input cells count as failures.
pub fn parse_column<'a, I>(cells: I) -> ParsedDates
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let cells: Vec<Option<&str>> = cells.into_iter().collect();
    let parse = |order: DateOrder| -> Vec<Option<NaiveDateTime>> {
        cells
            .iter()
            .map(|c| c.and_then(|s| parse_datetime(s, order)))
            .collect()
    };

    let month_first = parse(DateOrder::MonthFirst);
    if null_fraction(&month_first) > DAY_FIRST_THRESHOLD {
        ParsedDates {
            values: parse(DateOrder::DayFirst),
            order: DateOrder::DayFirst,
        }
    } else {
        ParsedDates {
            values: month_first,
            order: DateOrder::MonthFirst,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_time(NaiveTime::MIN)
    }

    #[test]
    fn numeric_dates_follow_order() {
        assert_eq!(parse_datetime("03/04/2016", DateOrder::MonthFirst), Some(ymd(2016, 3, 4)));
        assert_eq!(parse_datetime("03/04/2016", DateOrder::DayFirst), Some(ymd(2016, 4, 3)));
        assert_eq!(parse_datetime("3/4/16", DateOrder::MonthFirst), Some(ymd(2016, 3, 4)));
        assert_eq!(parse_datetime("13/04/2016", DateOrder::MonthFirst), None);
        assert_eq!(parse_datetime("13-04-2016", DateOrder::DayFirst), Some(ymd(2016, 4, 13)));
        assert_eq!(parse_datetime("13-04-16", DateOrder::DayFirst), Some(ymd(2016, 4, 13)));
    }

    #[test]
    fn unambiguous_forms_parse_under_both_orders() {
        for order in [DateOrder::MonthFirst, DateOrder::DayFirst] {
            assert_eq!(parse_datetime("2016-03-04", order), Some(ymd(2016, 3, 4)));
            assert_eq!(
                parse_datetime("2016-03-04 10:30:00.000", order),
                ymd(2016, 3, 4).date().and_hms_opt(10, 30, 0)
            );
            assert_eq!(parse_datetime("2016-03-04T10:30:00", order), ymd(2016, 3, 4).date().and_hms_opt(10, 30, 0));
            assert_eq!(parse_datetime("March 4, 2016", order), Some(ymd(2016, 3, 4)));
            assert_eq!(parse_datetime("04-Mar-2016", order), Some(ymd(2016, 3, 4)));
        }
    }

    #[test]
    fn time_of_day_is_kept() {
        assert_eq!(
            parse_datetime("11/08/2016 14:05", DateOrder::MonthFirst),
            ymd(2016, 11, 8).date().and_hms_opt(14, 5, 0)
        );
        assert_eq!(
            parse_datetime("08/11/2016 2:05:09 PM", DateOrder::DayFirst),
            ymd(2016, 11, 8).date().and_hms_opt(14, 5, 9)
        );
    }

    #[test]
    fn garbage_and_blank_are_none() {
        assert_eq!(parse_datetime("", DateOrder::MonthFirst), None);
        assert_eq!(parse_datetime("   ", DateOrder::DayFirst), None);
        assert_eq!(parse_datetime("not a date", DateOrder::MonthFirst), None);
        assert_eq!(parse_datetime("31/04/2016", DateOrder::DayFirst), None);
    }

    #[test]
    fn majority_failures_switch_to_day_first() {
        let parsed = parse_column([Some("13/01/2016"), Some("25/12/2016"), Some("03/04/2016")]);
        assert_eq!(parsed.order, DateOrder::DayFirst);
        assert_eq!(
            parsed.values,
            vec![Some(ymd(2016, 1, 13)), Some(ymd(2016, 12, 25)), Some(ymd(2016, 4, 3))]
        );
    }

    #[test]
    fn half_failures_keep_month_first() {
        // Day-first would parse all four, but exactly half fail month-first.
        let parsed = parse_column([
            Some("13/01/2016"),
            Some("25/12/2016"),
            Some("03/04/2016"),
            Some("01/02/2016"),
        ]);
        assert_eq!(parsed.order, DateOrder::MonthFirst);
        assert_eq!(parsed.null_count(), 2);
        assert_eq!(parsed.values[2], Some(ymd(2016, 3, 4)));
    }

    #[test]
    fn null_cells_count_towards_threshold() {
        let parsed = parse_column([None, None, Some("01/02/2016")]);
        assert_eq!(parsed.order, DateOrder::DayFirst);
        assert_eq!(parsed.values, vec![None, None, Some(ymd(2016, 2, 1))]);
    }

    #[test]
    fn empty_column_keeps_month_first() {
        let parsed = parse_column(std::iter::empty());
        assert_eq!(parsed.order, DateOrder::MonthFirst);
        assert!(parsed.values.is_empty());
    }
}
