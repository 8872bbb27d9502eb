//! Decodes PostgreSQL rows into `Record`s.
//!
//! sqlx reads result columns in PostgreSQL's binary format, so every type needs its own decoder.
//! The decoder is chosen once per value from the column type: built-in types by name, enums as
//! text, domains by their base type and arrays by their element type. Types without a decoder are
//! left empty with a warning.

use crate::error::Res;
use crate::model::{Record, Value};
use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::types::{Oid, PgInterval, PgMoney, PgTimeTz};
use sqlx::postgres::{PgRow, PgTypeInfo, PgTypeKind, PgValueFormat, PgValueRef, Postgres};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};
use tracing::warn;

/// Digits after the decimal point of a `money` value, as in the default `lc_monetary`.
const MONEY_SCALE: u32 = 2;

/// Converts every column of `row` into a field of a `Record`, keeping column order.
pub(super) fn record(row: &PgRow) -> Res<Record> {
    let mut record = Record::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = value(row, i)
            .with_context(|| format!("Unable to decode column '{}'", column.name()))?;
        record.push(column.name(), value);
    }
    Ok(record)
}

/// How the values of a column are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoder {
    Scalar(Scalar),
    /// An array of the scalar, written as text in PostgreSQL's `{a,b}` notation.
    Array(Scalar),
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    Bool,
    Int2,
    Int4,
    Int8,
    Oid,
    Float4,
    Float8,
    Numeric,
    Money,
    Text,
    Bytea,
    Date,
    Timestamp,
    Timestamptz,
    Time,
    TimeTz,
    Interval,
    Uuid,
    Json,
    Inet,
}

fn decoder_for(type_info: &PgTypeInfo) -> Decoder {
    match type_info.kind() {
        // Enum values travel as their label.
        PgTypeKind::Enum(_) => Decoder::Scalar(Scalar::Text),
        PgTypeKind::Domain(base) => decoder_for(base),
        PgTypeKind::Array(element) => match decoder_for(element) {
            Decoder::Scalar(scalar) => Decoder::Array(scalar),
            _ => Decoder::Unsupported,
        },
        _ => decoder_for_name(type_info.name()),
    }
}

/// The decoder for a built-in type, by the name sqlx reports for it.
fn decoder_for_name(name: &str) -> Decoder {
    match name.strip_suffix("[]") {
        Some(element) => scalar_for_name(element).map_or(Decoder::Unsupported, Decoder::Array),
        None => scalar_for_name(name).map_or(Decoder::Unsupported, Decoder::Scalar),
    }
}

fn scalar_for_name(name: &str) -> Option<Scalar> {
    let scalar = match name {
        "BOOL" => Scalar::Bool,
        "INT2" => Scalar::Int2,
        "INT4" => Scalar::Int4,
        "INT8" => Scalar::Int8,
        "OID" => Scalar::Oid,
        "FLOAT4" => Scalar::Float4,
        "FLOAT8" => Scalar::Float8,
        "NUMERIC" => Scalar::Numeric,
        "MONEY" => Scalar::Money,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => Scalar::Text,
        "BYTEA" => Scalar::Bytea,
        "DATE" => Scalar::Date,
        "TIMESTAMP" => Scalar::Timestamp,
        "TIMESTAMPTZ" => Scalar::Timestamptz,
        "TIME" => Scalar::Time,
        "TIMETZ" => Scalar::TimeTz,
        "INTERVAL" => Scalar::Interval,
        "UUID" => Scalar::Uuid,
        "JSON" | "JSONB" => Scalar::Json,
        "INET" | "CIDR" => Scalar::Inet,
        _ => return None,
    };
    Some(scalar)
}

fn value(row: &PgRow, i: usize) -> Res<Value> {
    let raw = row.try_get_raw(i)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_info = raw.type_info().into_owned();
    match decoder_for(&type_info) {
        Decoder::Scalar(Scalar::Numeric) => match decode(row, i, Scalar::Numeric, false) {
            Ok(value) => Ok(value),
            // NaN and values beyond 28 significant digits do not fit a `Decimal`.
            Err(e) => Ok(numeric_fallback(&raw, e)),
        },
        Decoder::Scalar(scalar) => decode(row, i, scalar, false),
        Decoder::Array(Scalar::Numeric) => match decode(row, i, Scalar::Numeric, true) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("Leaving a {} value empty: {e:#}", type_info.name());
                Ok(Value::Null)
            }
        },
        Decoder::Array(scalar) => decode(row, i, scalar, true),
        Decoder::Unsupported => {
            warn!(
                "Leaving a value of unsupported type {} empty",
                type_info.name()
            );
            Ok(Value::Null)
        }
    }
}

fn decode(row: &PgRow, i: usize, scalar: Scalar, array: bool) -> Res<Value> {
    match scalar {
        Scalar::Bool => read(row, i, array, Value::Bool),
        Scalar::Int2 => read(row, i, array, |n: i16| Value::Int(i64::from(n))),
        Scalar::Int4 => read(row, i, array, |n: i32| Value::Int(i64::from(n))),
        Scalar::Int8 => read(row, i, array, Value::Int),
        Scalar::Oid => read(row, i, array, |oid: Oid| Value::Int(i64::from(oid.0))),
        Scalar::Float4 => read(row, i, array, |n: f32| Value::Float(f64::from(n))),
        Scalar::Float8 => read(row, i, array, Value::Float),
        Scalar::Numeric => read(row, i, array, Value::Decimal),
        Scalar::Money => read(row, i, array, |m: PgMoney| {
            Value::Decimal(m.to_decimal(MONEY_SCALE))
        }),
        Scalar::Text => read(row, i, array, Value::Text),
        Scalar::Bytea => read(row, i, array, |b: Vec<u8>| Value::Text(bytea_text(&b))),
        Scalar::Date => read::<NaiveDate, _>(row, i, array, Value::Date),
        Scalar::Timestamp => read::<NaiveDateTime, _>(row, i, array, Value::DateTime),
        Scalar::Timestamptz => read(row, i, array, |dt: DateTime<Utc>| {
            Value::DateTime(dt.naive_utc())
        }),
        Scalar::Time => read::<NaiveTime, _>(row, i, array, Value::Time),
        Scalar::TimeTz => read(row, i, array, |t: PgTimeTz<NaiveTime, FixedOffset>| {
            Value::Text(format!("{}{}", t.time, t.offset))
        }),
        Scalar::Interval => read(row, i, array, |iv: PgInterval| {
            Value::Text(interval_text(&iv))
        }),
        Scalar::Uuid => read(row, i, array, |id: uuid::Uuid| Value::Text(id.to_string())),
        Scalar::Json => read(row, i, array, |json: serde_json::Value| {
            Value::Text(json.to_string())
        }),
        Scalar::Inet => read(row, i, array, |net: IpNetwork| Value::Text(net.to_string())),
    }
}

/// Reads column `i` as a `T`, or as an array of `T` rendered as `{a,b,NULL}`, and converts it.
///
/// The decoder was picked from the column type, so sqlx's own compatibility check is skipped. That
/// check rejects domains and enums whose type differs from the Rust type's declared one.
fn read<T, F>(row: &PgRow, i: usize, array: bool, convert: F) -> Res<Value>
where
    T: for<'a> Decode<'a, Postgres> + Type<Postgres>,
    F: Fn(T) -> Value,
{
    if !array {
        return Ok(convert(row.try_get_unchecked::<T, _>(i)?));
    }
    let items = row
        .try_get_unchecked::<Vec<Option<T>>, _>(i)?
        .into_iter()
        .map(|item| match item {
            Some(item) => convert(item).to_string(),
            None => "NULL".to_string(),
        })
        .collect::<Vec<_>>();
    Ok(Value::Text(format!("{{{}}}", items.join(","))))
}

/// Writes a `numeric` that did not decode as a `Decimal` as text, or leaves it empty.
fn numeric_fallback(raw: &PgValueRef<'_>, error: anyhow::Error) -> Value {
    let text = match (raw.format(), raw.as_bytes()) {
        (PgValueFormat::Binary, Ok(bytes)) => numeric_text(bytes),
        (PgValueFormat::Text, Ok(bytes)) => std::str::from_utf8(bytes).ok().map(str::to_string),
        (_, Err(_)) => None,
    };
    match text {
        Some(text) => Value::Text(text),
        None => {
            warn!("Leaving a NUMERIC value empty: {error:#}");
            Value::Null
        }
    }
}

/// Formats a `numeric` in PostgreSQL's binary format the way PostgreSQL prints it.
///
/// The format is a header of four 16-bit fields (digit count, weight, sign, display scale) then
/// the base-10000 digits, most significant first. The weight is the power of 10000 of the first
/// digit.
fn numeric_text(bytes: &[u8]) -> Option<String> {
    let field = |n: usize| -> Option<[u8; 2]> { bytes.get(n * 2..n * 2 + 2)?.try_into().ok() };
    let ndigits = usize::from(u16::from_be_bytes(field(0)?));
    let weight = i64::from(i16::from_be_bytes(field(1)?));
    let sign = u16::from_be_bytes(field(2)?);
    let scale = usize::from(u16::from_be_bytes(field(3)?));
    let digits = (0..ndigits)
        .map(|k| field(4 + k).map(u16::from_be_bytes))
        .collect::<Option<Vec<u16>>>()?;
    let digit = |k: i64| -> u16 {
        usize::try_from(k)
            .ok()
            .and_then(|k| digits.get(k).copied())
            .unwrap_or(0)
    };

    let mut text = match sign {
        0x0000 => String::new(),
        0x4000 => "-".to_string(),
        0xC000 => return Some("NaN".to_string()),
        0xD000 => return Some("Infinity".to_string()),
        0xF000 => return Some("-Infinity".to_string()),
        _ => return None,
    };
    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&digit(0).to_string());
        for k in 1..=weight {
            text.push_str(&format!("{:04}", digit(k)));
        }
    }
    if scale > 0 {
        let mut fraction = String::new();
        let mut k = weight + 1;
        while fraction.len() < scale {
            fraction.push_str(&format!("{:04}", digit(k)));
            k += 1;
        }
        fraction.truncate(scale);
        text.push('.');
        text.push_str(&fraction);
    }
    Some(text)
}

/// Formats an `interval` the way PostgreSQL prints it, e.g. `1 year 2 mons 3 days 04:05:06`.
fn interval_text(interval: &PgInterval) -> String {
    let unit = |n: i32, name: &str| {
        if n.abs() == 1 {
            format!("{n} {name}")
        } else {
            format!("{n} {name}s")
        }
    };
    let mut parts = Vec::new();
    let (years, months) = (interval.months / 12, interval.months % 12);
    if years != 0 {
        parts.push(unit(years, "year"));
    }
    if months != 0 {
        parts.push(unit(months, "mon"));
    }
    if interval.days != 0 {
        parts.push(unit(interval.days, "day"));
    }
    if interval.microseconds != 0 || parts.is_empty() {
        let sign = if interval.microseconds < 0 { "-" } else { "" };
        let micros = interval.microseconds.unsigned_abs();
        let secs = micros / 1_000_000;
        let mut time = format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let fraction = micros % 1_000_000;
        if fraction != 0 {
            time.push('.');
            time.push_str(format!("{fraction:06}").trim_end_matches('0'));
        }
        parts.push(time);
    }
    parts.join(" ")
}

fn bytea_text(bytes: &[u8]) -> String {
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("\\x{hex}")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a binary `numeric` from its header fields and base-10000 digits.
    fn numeric(weight: i16, sign: u16, scale: u16, digits: &[u16]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(digits.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&weight.to_be_bytes());
        bytes.extend_from_slice(&sign.to_be_bytes());
        bytes.extend_from_slice(&scale.to_be_bytes());
        for digit in digits {
            bytes.extend_from_slice(&digit.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn test_decoder_for_name() {
        assert_eq!(Decoder::Scalar(Scalar::Money), decoder_for_name("MONEY"));
        assert_eq!(Decoder::Scalar(Scalar::Interval), decoder_for_name("INTERVAL"));
        assert_eq!(Decoder::Scalar(Scalar::Inet), decoder_for_name("CIDR"));
        assert_eq!(Decoder::Scalar(Scalar::TimeTz), decoder_for_name("TIMETZ"));
        assert_eq!(Decoder::Scalar(Scalar::Text), decoder_for_name("BPCHAR"));
        assert_eq!(Decoder::Array(Scalar::Int4), decoder_for_name("INT4[]"));
        assert_eq!(Decoder::Array(Scalar::Text), decoder_for_name("TEXT[]"));
        assert_eq!(Decoder::Array(Scalar::Numeric), decoder_for_name("NUMERIC[]"));
    }

    #[test]
    fn test_unknown_types_are_unsupported() {
        assert_eq!(Decoder::Unsupported, decoder_for_name("BIT"));
        assert_eq!(Decoder::Unsupported, decoder_for_name("VARBIT[]"));
        assert_eq!(Decoder::Unsupported, decoder_for_name("TSVECTOR"));
        assert_eq!(Decoder::Unsupported, decoder_for_name("POINT"));
    }

    #[test]
    fn test_numeric_text() {
        // 1000000000000000000000000000000.5 has 32 significant digits.
        let big = numeric(7, 0x0000, 1, &[100, 0, 0, 0, 0, 0, 0, 0, 5000]);
        assert_eq!(
            Some("1000000000000000000000000000000.5".to_string()),
            numeric_text(&big)
        );
        assert_eq!(
            Some("-12.50".to_string()),
            numeric_text(&numeric(0, 0x4000, 2, &[12, 5000]))
        );
        assert_eq!(
            Some("0.05".to_string()),
            numeric_text(&numeric(-1, 0x0000, 2, &[500]))
        );
        assert_eq!(
            Some("120000".to_string()),
            numeric_text(&numeric(1, 0x0000, 0, &[12]))
        );
        assert_eq!(
            Some("0".to_string()),
            numeric_text(&numeric(0, 0x0000, 0, &[]))
        );
    }

    #[test]
    fn test_numeric_text_special_values() {
        assert_eq!(
            Some("NaN".to_string()),
            numeric_text(&numeric(0, 0xC000, 0, &[]))
        );
        assert_eq!(
            Some("-Infinity".to_string()),
            numeric_text(&numeric(0, 0xF000, 0, &[]))
        );
        assert_eq!(None, numeric_text(&numeric(0, 0x1234, 0, &[1])));
        // The header announces two digits but only one follows.
        let mut truncated = numeric(0, 0x0000, 0, &[1, 2]);
        truncated.truncate(10);
        assert_eq!(None, numeric_text(&truncated));
    }

    #[test]
    fn test_interval_text() {
        let interval = PgInterval {
            months: 14,
            days: 3,
            microseconds: (4 * 3600 + 5 * 60 + 6) * 1_000_000 + 500_000,
        };
        assert_eq!("1 year 2 mons 3 days 04:05:06.5", interval_text(&interval));
        let interval = PgInterval {
            months: 0,
            days: 1,
            microseconds: 0,
        };
        assert_eq!("1 day", interval_text(&interval));
        let interval = PgInterval {
            months: 0,
            days: 0,
            microseconds: -90_000_000,
        };
        assert_eq!("-00:01:30", interval_text(&interval));
        let interval = PgInterval {
            months: 0,
            days: 0,
            microseconds: 0,
        };
        assert_eq!("00:00:00", interval_text(&interval));
    }

    #[test]
    fn test_bytea_text() {
        assert_eq!("\\xde00ff", bytea_text(&[0xde, 0x00, 0xff]));
        assert_eq!("\\x", bytea_text(&[]));
    }
}
