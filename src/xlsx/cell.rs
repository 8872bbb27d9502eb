//! Cell references and the conversion of `Value`s into SpreadsheetML cell contents.

use crate::model::Value;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;

/// The largest number of columns a worksheet can hold.
pub(super) const MAX_COLUMNS: usize = 16_384;

/// The largest number of rows a worksheet can hold.
pub(super) const MAX_ROWS: usize = 1_048_576;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Integers above this magnitude do not survive the round trip through an IEEE double.
const MAX_EXACT_INT: u64 = 1 << 53;

/// The significant digits an IEEE double keeps for every decimal.
const MAX_EXACT_DIGITS: usize = 15;

/// The index of a cell format in the `cellXfs` list of `styles.xml`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(super) enum Style {
    General = 0,
    Date = 1,
    DateTime = 2,
    Time = 3,
}

/// What gets written for one cell.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum CellContent {
    /// Nothing is written for the cell.
    Empty,
    Bool(bool),
    /// A numeric literal exactly as it goes into `<v>`.
    Number(String, Style),
    /// An inline string.
    Text(String),
}

impl From<&Value> for CellContent {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => CellContent::Empty,
            Value::Bool(b) => CellContent::Bool(*b),
            Value::Int(n) if n.unsigned_abs() <= MAX_EXACT_INT => {
                CellContent::Number(n.to_string(), Style::General)
            }
            Value::Int(n) => CellContent::Text(n.to_string()),
            Value::Float(n) if n.is_finite() => CellContent::Number(n.to_string(), Style::General),
            Value::Float(n) => CellContent::Text(n.to_string()),
            Value::Decimal(d) => {
                let d = d.normalize();
                if significant_digits(&d) <= MAX_EXACT_DIGITS {
                    CellContent::Number(d.to_string(), Style::General)
                } else {
                    CellContent::Text(d.to_string())
                }
            }
            Value::Text(s) => CellContent::Text(xml_safe(s)),
            Value::Date(d) => match date_serial(*d) {
                Some(serial) => CellContent::Number(serial.to_string(), Style::Date),
                None => CellContent::Text(value.to_string()),
            },
            Value::DateTime(dt) => match datetime_serial(*dt) {
                Some(serial) => CellContent::Number(serial.to_string(), Style::DateTime),
                None => CellContent::Text(value.to_string()),
            },
            Value::Time(t) => CellContent::Number(time_fraction(*t).to_string(), Style::Time),
        }
    }
}

fn significant_digits(d: &Decimal) -> usize {
    let mantissa = d.mantissa().unsigned_abs().to_string();
    mantissa.trim_end_matches('0').len()
}

/// The column letters for a zero-based column index: 0 is `A`, 25 is `Z`, 26 is `AA`.
pub(super) fn column_name(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// The A1-style reference for a zero-based column index and a one-based row number.
pub(super) fn reference(column: usize, row: usize) -> String {
    format!("{}{row}", column_name(column))
}

/// The Excel serial day number of `date` in the 1900 date system, or `None` for dates before
/// 1900-01-01 which the format cannot express.
///
/// Excel counts the nonexistent 1900-02-29, so serials from 1900-03-01 on are days since
/// 1899-12-30 and earlier ones are one less.
fn date_serial(date: NaiveDate) -> Option<i64> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let days = (date - epoch).num_days();
    match days {
        d if d < 2 => None,
        d if d < 61 => Some(d - 1),
        d => Some(d),
    }
}

fn datetime_serial(dt: NaiveDateTime) -> Option<f64> {
    let days = date_serial(dt.date())?;
    Some(days as f64 + time_fraction(dt.time()))
}

/// The time of day as a fraction of a day.
fn time_fraction(t: NaiveTime) -> f64 {
    let seconds = f64::from(t.num_seconds_from_midnight()) + f64::from(t.nanosecond()) / 1e9;
    seconds / SECONDS_PER_DAY
}

/// Drops characters that XML 1.0 does not allow in documents.
fn xml_safe(s: &str) -> String {
    s.chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || c >= ' ')
        .filter(|&c| !matches!(c, '\u{FFFE}' | '\u{FFFF}'))
        .collect()
}
