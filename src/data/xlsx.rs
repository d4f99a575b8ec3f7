//! Spreadsheet Decoder Module
//! Reads the first worksheet of an OOXML (`.xlsx`) package into a DataFrame.
//!
//! The package is a ZIP of XML parts, so this works on the archive directly
//! instead of going through a full spreadsheet library. Element names may
//! carry a namespace prefix (`<x:row>`), as some OpenXML SDK writers emit.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use std::sync::OnceLock;
use thiserror::Error;
use ::zip::result::ZipError;
use ::zip::ZipArchive;

#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Not an OOXML spreadsheet: {0}")]
    NotOoxml(ZipError),
    #[error("Spreadsheet archive error: {0}")]
    Archive(#[from] ZipError),
    #[error("Spreadsheet part missing: {0}")]
    MissingPart(String),
    #[error("Failed to read spreadsheet part: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to build table: {0}")]
    Polars(#[from] PolarsError),
}

const WORKBOOK: &str = "xl/workbook.xml";
const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const STYLES: &str = "xl/styles.xml";
const FALLBACK_SHEET: &str = "xl/worksheets/sheet1.xml";

/// A decoded worksheet cell.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    fn to_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Number(v) => Some(format_number(*v)),
            Cell::Text(s) => Some(s.clone()),
            Cell::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
            Cell::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

fn pattern(cell: &'static OnceLock<Regex>, source: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(source).expect("static pattern compiles"))
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    pattern(&RE, r#"([\w:]+)\s*=\s*"([^"]*)""#)
}

fn text_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    pattern(&RE, r"(?s)<(?:\w+:)?t\b[^>]*>(.*?)</(?:\w+:)?t>")
}

/// Value of attribute `name` in a raw attribute list.
fn attribute(attrs: &str, name: &str) -> Option<String> {
    attr_re()
        .captures_iter(attrs)
        .find(|c| &c[1] == name)
        .map(|c| unescape(&c[2]))
}

fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';') else {
            break;
        };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Concatenated text runs of a string item, skipping phonetic hints.
fn collect_text(fragment: &str) -> String {
    static PHONETIC: OnceLock<Regex> = OnceLock::new();
    let fragment = pattern(&PHONETIC, r"(?s)<(?:\w+:)?rPh\b.*?</(?:\w+:)?rPh>").replace_all(fragment, "");
    text_re()
        .captures_iter(&fragment)
        .map(|c| unescape(&c[1]))
        .collect()
}

fn read_part(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<Option<String>, SpreadsheetError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)?;
    Ok(Some(xml))
}

/// Path of the first worksheet in workbook order.
fn first_sheet_path(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<String, SpreadsheetError> {
    static SHEET: OnceLock<Regex> = OnceLock::new();
    static REL: OnceLock<Regex> = OnceLock::new();

    let workbook = read_part(archive, WORKBOOK)?;
    let rels = read_part(archive, WORKBOOK_RELS)?;
    if let (Some(workbook), Some(rels)) = (workbook, rels) {
        let rel_id = pattern(&SHEET, r"<(?:\w+:)?sheet\b([^>]*)")
            .captures(&workbook)
            .and_then(|c| attribute(&c[1], "r:id"));
        if let Some(rel_id) = rel_id {
            let target = pattern(&REL, r"<(?:\w+:)?Relationship\b([^>]*)")
                .captures_iter(&rels)
                .find(|c| attribute(&c[1], "Id").as_deref() == Some(rel_id.as_str()))
                .and_then(|c| attribute(&c[1], "Target"));
            if let Some(target) = target {
                return Ok(match target.strip_prefix('/') {
                    Some(absolute) => absolute.to_string(),
                    None => format!("xl/{}", target),
                });
            }
        }
    }
    Ok(FALLBACK_SHEET.to_string())
}

fn shared_strings(xml: &str) -> Vec<String> {
    static ITEM: OnceLock<Regex> = OnceLock::new();
    pattern(&ITEM, r"(?s)<(?:\w+:)?si\b[^>]*>(.*?)</(?:\w+:)?si>|<(?:\w+:)?si\s*/>")
        .captures_iter(xml)
        .map(|c| c.get(1).map(|m| collect_text(m.as_str())).unwrap_or_default())
        .collect()
}

fn is_date_code(code: &str) -> bool {
    let mut in_quote = false;
    let mut in_bracket = false;
    let mut escaped = false;
    for ch in code.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_quote = !in_quote,
            '[' if !in_quote => in_bracket = true,
            ']' if !in_quote => in_bracket = false,
            'd' | 'D' | 'm' | 'M' | 'y' | 'Y' | 'h' | 'H' | 's' | 'S'
                if !in_quote && !in_bracket =>
            {
                return true
            }
            _ => {}
        }
    }
    false
}

/// For each cell style index, whether it formats numbers as dates.
fn date_styles(xml: &str) -> Vec<bool> {
    static NUM_FMT: OnceLock<Regex> = OnceLock::new();
    static CELL_XFS: OnceLock<Regex> = OnceLock::new();
    static XF: OnceLock<Regex> = OnceLock::new();

    let custom: HashMap<u32, String> = pattern(&NUM_FMT, r"<(?:\w+:)?numFmt\b([^>]*)")
        .captures_iter(xml)
        .filter_map(|c| {
            let id = attribute(&c[1], "numFmtId")?.parse().ok()?;
            Some((id, attribute(&c[1], "formatCode")?))
        })
        .collect();

    let Some(xfs) = pattern(&CELL_XFS, r"(?s)<(?:\w+:)?cellXfs\b[^>]*>(.*?)</(?:\w+:)?cellXfs>").captures(xml) else {
        return Vec::new();
    };
    pattern(&XF, r"<(?:\w+:)?xf\b([^>]*)")
        .captures_iter(&xfs[1])
        .map(|c| {
            let id: u32 = attribute(&c[1], "numFmtId")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            match id {
                14..=22 | 45..=47 => true,
                _ => custom.get(&id).is_some_and(|code| is_date_code(code)),
            }
        })
        .collect()
}

/// Excel 1900 date system serial to a date-time.
fn from_serial(serial: f64) -> Option<NaiveDateTime> {
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round();
    if !millis.is_finite() || millis.abs() > i64::MAX as f64 {
        return None;
    }
    base.checked_add_signed(Duration::milliseconds(millis as i64))
}

/// Zero-based column index from a reference like `BC12`.
fn column_index(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for b in letters {
        index = index * 26 + (b.to_ascii_uppercase() - b'A' + 1) as usize;
    }
    Some(index - 1)
}

fn decode_cell(attrs: &str, body: &str, shared: &[String], date_styles: &[bool]) -> Cell {
    static VALUE: OnceLock<Regex> = OnceLock::new();
    static INLINE: OnceLock<Regex> = OnceLock::new();

    let kind = attribute(attrs, "t").unwrap_or_default();
    if kind == "inlineStr" {
        return pattern(&INLINE, r"(?s)<(?:\w+:)?is\b[^>]*>(.*?)</(?:\w+:)?is>")
            .captures(body)
            .map(|c| Cell::Text(collect_text(&c[1])))
            .unwrap_or(Cell::Empty);
    }
    let Some(raw) = pattern(&VALUE, r"(?s)<(?:\w+:)?v\b[^>]*>(.*?)</(?:\w+:)?v>")
        .captures(body)
        .map(|c| unescape(&c[1]))
    else {
        return Cell::Empty;
    };

    match kind.as_str() {
        "s" => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i))
            .map(|s| Cell::Text(s.clone()))
            .unwrap_or(Cell::Empty),
        "b" => Cell::Bool(raw.trim() == "1"),
        "str" | "e" | "d" => Cell::Text(raw),
        _ => match raw.trim().parse::<f64>() {
            Ok(v) => {
                let is_date = attribute(attrs, "s")
                    .and_then(|s| s.parse::<usize>().ok())
                    .and_then(|s| date_styles.get(s).copied())
                    .unwrap_or(false);
                match (is_date, from_serial(v)) {
                    (true, Some(dt)) => Cell::DateTime(dt),
                    _ => Cell::Number(v),
                }
            }
            Err(_) => Cell::Text(raw),
        },
    }
}

fn parse_rows(sheet: &str, shared: &[String], date_styles: &[bool]) -> Vec<Vec<Cell>> {
    static ROW: OnceLock<Regex> = OnceLock::new();
    static CELL: OnceLock<Regex> = OnceLock::new();

    let cell_re = pattern(&CELL, r"(?s)<(?:\w+:)?c\b([^>]*?)(?:/>|>(.*?)</(?:\w+:)?c>)");
    pattern(&ROW, r"(?s)<(?:\w+:)?row\b[^>]*>(.*?)</(?:\w+:)?row>")
        .captures_iter(sheet)
        .map(|row| {
            let mut cells: Vec<Cell> = Vec::new();
            for c in cell_re.captures_iter(&row[1]) {
                let attrs = &c[1];
                let body = c.get(2).map(|m| m.as_str()).unwrap_or("");
                let index = attribute(attrs, "r")
                    .and_then(|r| column_index(&r))
                    .unwrap_or(cells.len());
                if index >= cells.len() {
                    cells.resize(index + 1, Cell::Empty);
                }
                cells[index] = decode_cell(attrs, body, shared, date_styles);
            }
            cells
        })
        .filter(|cells| cells.iter().any(|c| *c != Cell::Empty))
        .collect()
}

fn header_names(header: &[Cell], width: usize) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    (0..width)
        .map(|i| {
            let base = header
                .get(i)
                .and_then(Cell::to_text)
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| format!("Unnamed: {}", i));
            let mut name = base.clone();
            let mut n = 1;
            while !seen.insert(name.clone()) {
                name = format!("{}.{}", base, n);
                n += 1;
            }
            name
        })
        .collect()
}

fn build_column(name: &str, cells: &[&Cell]) -> PolarsResult<Column> {
    let filled: Vec<&Cell> = cells.iter().copied().filter(|c| **c != Cell::Empty).collect();
    let name: PlSmallStr = name.into();

    let series = if !filled.is_empty() && filled.iter().all(|c| matches!(c, Cell::Number(_))) {
        let numbers: Vec<Option<f64>> = cells
            .iter()
            .map(|c| match c {
                Cell::Number(v) => Some(*v),
                _ => None,
            })
            .collect();
        let integral = numbers
            .iter()
            .flatten()
            .all(|v| v.fract() == 0.0 && v.abs() < 9.0e15);
        if integral {
            let ints: Vec<Option<i64>> = numbers.iter().map(|v| v.map(|v| v as i64)).collect();
            Series::new(name, ints)
        } else {
            Series::new(name, numbers)
        }
    } else if !filled.is_empty() && filled.iter().all(|c| matches!(c, Cell::DateTime(_))) {
        let millis: Vec<Option<i64>> = cells
            .iter()
            .map(|c| match c {
                Cell::DateTime(dt) => Some(dt.and_utc().timestamp_millis()),
                _ => None,
            })
            .collect();
        Series::new(name, millis).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
    } else if !filled.is_empty() && filled.iter().all(|c| matches!(c, Cell::Bool(_))) {
        let bools: Vec<Option<bool>> = cells
            .iter()
            .map(|c| match c {
                Cell::Bool(b) => Some(*b),
                _ => None,
            })
            .collect();
        Series::new(name, bools)
    } else {
        let texts: Vec<Option<String>> = cells.iter().map(|c| c.to_text()).collect();
        Series::new(name, texts)
    };
    Ok(Column::from(series))
}

/// Decode the first worksheet of an `.xlsx` payload.
pub fn read_xlsx(bytes: &[u8]) -> Result<DataFrame, SpreadsheetError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(SpreadsheetError::NotOoxml)?;

    let sheet_path = first_sheet_path(&mut archive)?;
    let sheet = read_part(&mut archive, &sheet_path)?
        .ok_or_else(|| SpreadsheetError::MissingPart(sheet_path.clone()))?;
    let shared = read_part(&mut archive, SHARED_STRINGS)?
        .map(|xml| shared_strings(&xml))
        .unwrap_or_default();
    let styles = read_part(&mut archive, STYLES)?
        .map(|xml| date_styles(&xml))
        .unwrap_or_default();

    let rows = parse_rows(&sheet, &shared, &styles);
    let Some((header, body)) = rows.split_first() else {
        return Ok(DataFrame::empty());
    };
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let names = header_names(header, width);

    let empty = Cell::Empty;
    let columns = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let cells: Vec<&Cell> = body.iter().map(|row| row.get(i).unwrap_or(&empty)).collect();
            build_column(name, &cells)
        })
        .collect::<PolarsResult<Vec<Column>>>()?;

    tracing::debug!(sheet = %sheet_path, rows = body.len(), columns = width, "decoded worksheet");
    Ok(DataFrame::new(columns)?)
}
