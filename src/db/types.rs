//! Mapping from driver column types to [`ScalarValue`].
//!
//! # Architecture
//!
//! Decoding uses a two-phase approach:
//! 1. `TypeCategory` classifies the driver's column type name
//! 2. Backend-specific decoders extract the value for that category
//!
//! PostgreSQL sends text-format values for simple queries and binary-format
//! values for prepared ones. Typed decoders cover both; types without one are
//! rendered to match PostgreSQL's own text output.

use std::fmt::Write as _;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::error::BoxDynError;
use sqlx::postgres::types::{Oid, PgInterval, PgMoney, PgTimeTz};
use sqlx::types::BigDecimal;
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueFormat, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Postgres, Row, Type, TypeInfo, ValueRef};

use uuid::Uuid;

use crate::models::{ColumnMetadata, ResultRow, ScalarValue};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Numeric,
    Boolean,
    Text,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Json,
    Uuid,
    Binary,
    Unknown,
}

/// Classify a driver type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.trim().to_lowercase();

    // Arrays (`INT4[]`, `_int4`) render through the text fallback.
    if lower.ends_with("[]") || lower.starts_with('_') {
        return TypeCategory::Unknown;
    }

    match lower.as_str() {
        "timestamptz" | "timestamp with time zone" => return TypeCategory::TimestampTz,
        "timestamp" | "timestamp without time zone" | "datetime" => {
            return TypeCategory::Timestamp;
        }
        "date" => return TypeCategory::Date,
        "time" | "timetz" | "time with time zone" | "time without time zone" => {
            return TypeCategory::Time;
        }
        "bool" | "boolean" => return TypeCategory::Boolean,
        "json" | "jsonb" => return TypeCategory::Json,
        "uuid" => return TypeCategory::Uuid,
        "oid" => return TypeCategory::Integer,
        "bytea" | "blob" => return TypeCategory::Binary,
        "real" | "float4" | "float8" | "double precision" => return TypeCategory::Float,
        // Geometric and interval types share substrings with the numeric names.
        "interval" | "point" => return TypeCategory::Text,
        _ => {}
    }

    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Numeric;
    }
    if lower.starts_with("int") || lower.ends_with("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }
    if lower.contains("float") || lower.contains("double") {
        return TypeCategory::Float;
    }
    if lower.contains("binary") {
        return TypeCategory::Binary;
    }
    if lower.contains("char")
        || lower.contains("text")
        || lower.contains("clob")
        || lower == "name"
        || lower == "bpchar"
    {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// PostgreSQL text renderings
// =============================================================================

/// Text rendering of a value with no typed decoder (enums, domains, ranges).
///
/// Text-format payloads are PostgreSQL's own output. Binary payloads are kept
/// when they are plain text, otherwise base64-encoded so the value is never lost.
#[derive(Debug)]
pub struct RawText(pub String);

impl Type<Postgres> for RawText {
    fn type_info() -> PgTypeInfo {
        <String as Type<Postgres>>::type_info()
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

impl<'r> Decode<'r, Postgres> for RawText {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        match value.format() {
            PgValueFormat::Text => Ok(RawText(
                <&str as Decode<Postgres>>::decode(value)?.to_string(),
            )),
            PgValueFormat::Binary => {
                let bytes = <&[u8] as Decode<Postgres>>::decode(value)?;
                Ok(RawText(binary_to_text(bytes)))
            }
        }
    }
}

fn binary_to_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if !s.chars().any(char::is_control) => s.to_string(),
        _ => encode_binary(bytes),
    }
}

/// Render an interval the way PostgreSQL's default `postgres` style does,
/// e.g. `1 year 2 mons -3 days +04:05:06.5`.
pub fn format_interval(interval: &PgInterval) -> String {
    let mut out = String::new();
    let mut prev_negative = false;

    let fields = [
        (interval.months / 12, "year"),
        (interval.months % 12, "mon"),
        (interval.days, "day"),
    ];
    for (value, unit) in fields {
        if value == 0 {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        if prev_negative && value > 0 {
            out.push('+');
        }
        let suffix = if value == 1 { "" } else { "s" };
        let _ = write!(out, "{} {}{}", value, unit, suffix);
        prev_negative = value < 0;
    }

    let micros = interval.microseconds;
    if out.is_empty() || micros != 0 {
        if !out.is_empty() {
            out.push(' ');
        }
        if micros < 0 {
            out.push('-');
        } else if prev_negative {
            out.push('+');
        }
        let abs = micros.unsigned_abs();
        let secs = abs / 1_000_000;
        let _ = write!(
            out,
            "{:02}:{:02}:{:02}",
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let fraction = abs % 1_000_000;
        if fraction != 0 {
            let digits = format!("{:06}", fraction);
            out.push('.');
            out.push_str(digits.trim_end_matches('0'));
        }
    }

    out
}

/// Render a one-dimensional array as a PostgreSQL array literal, e.g. `{x,"a b",NULL}`.
pub fn format_array<I>(items: I) -> String
where
    I: IntoIterator<Item = Option<String>>,
{
    let elements: Vec<String> = items
        .into_iter()
        .map(|item| match item {
            None => "NULL".to_string(),
            Some(v) if array_element_needs_quotes(&v) => {
                format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\""))
            }
            Some(v) => v,
        })
        .collect();
    format!("{{{}}}", elements.join(","))
}

fn array_element_needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value.eq_ignore_ascii_case("null")
        || value.chars().any(|c| {
            matches!(c, '"' | '\\' | '{' | '}' | ',' | '\x0B') || c.is_ascii_whitespace()
        })
}

/// `inet` drops a full-length prefix; `cidr` always shows it.
pub fn format_network(network: &IpNetwork, is_cidr: bool) -> String {
    let host_prefix = if network.is_ipv4() { 32 } else { 128 };
    if !is_cidr && network.prefix() == host_prefix {
        network.ip().to_string()
    } else {
        network.to_string()
    }
}

/// Standard base64, used for BYTEA and BLOB values.
pub fn encode_binary(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

// =============================================================================
// Row decoding
// =============================================================================

/// Decode a driver row into the closed scalar set.
pub trait DecodeRow {
    fn column_metadata(&self) -> Vec<ColumnMetadata>;
    fn decode_row(&self) -> ResultRow;
}

impl DecodeRow for PgRow {
    fn column_metadata(&self) -> Vec<ColumnMetadata> {
        self.columns()
            .iter()
            .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
            .collect()
    }

    fn decode_row(&self) -> ResultRow {
        let mut row = ResultRow::new();
        for (idx, col) in self.columns().iter().enumerate() {
            let type_name = col.type_info().name();
            row.push(col.name(), postgres::decode_column(self, idx, type_name));
        }
        row
    }
}

impl DecodeRow for SqliteRow {
    fn column_metadata(&self) -> Vec<ColumnMetadata> {
        self.columns()
            .iter()
            .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
            .collect()
    }

    fn decode_row(&self) -> ResultRow {
        let mut row = ResultRow::new();
        for (idx, col) in self.columns().iter().enumerate() {
            let declared = col.type_info();
            row.push(col.name(), sqlite::decode_column(self, idx, declared));
        }
        row
    }
}

fn undecodable(idx: usize, type_name: &str, err: &dyn std::fmt::Display) -> ScalarValue {
    tracing::warn!(column = idx, type_name, error = %err, "Failed to decode column value");
    ScalarValue::Null
}

// =============================================================================
// Backend-Specific Decoders
// =============================================================================

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> ScalarValue {
        match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return ScalarValue::Null,
            Ok(_) => {}
            Err(e) => return undecodable(idx, type_name, &e),
        }

        let decoded = match categorize_type(type_name) {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Numeric => decode_numeric(row, idx).map(ScalarValue::Text),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).map(ScalarValue::Boolean),
            TypeCategory::Timestamp => row
                .try_get::<NaiveDateTime, _>(idx)
                .map(|v| ScalarValue::Timestamp(v.and_utc())),
            TypeCategory::TimestampTz => row
                .try_get::<DateTime<Utc>, _>(idx)
                .map(ScalarValue::Timestamp),
            TypeCategory::Date => row
                .try_get::<NaiveDate, _>(idx)
                .map(|v| ScalarValue::Text(v.to_string())),
            TypeCategory::Time => decode_time(row, idx),
            TypeCategory::Json => row
                .try_get::<serde_json::Value, _>(idx)
                .map(|v| ScalarValue::Text(v.to_string())),
            TypeCategory::Uuid => row
                .try_get::<Uuid, _>(idx)
                .map(|v| ScalarValue::Text(v.to_string())),
            TypeCategory::Binary => row
                .try_get::<Vec<u8>, _>(idx)
                .map(|v| ScalarValue::Text(encode_binary(&v))),
            TypeCategory::Text | TypeCategory::Unknown => {
                decode_other(row, idx, type_name).map(ScalarValue::Text)
            }
        };

        decoded.unwrap_or_else(|e| undecodable(idx, type_name, &e))
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Result<ScalarValue, sqlx::Error> {
        row.try_get::<i64, _>(idx)
            .or_else(|_| row.try_get::<i32, _>(idx).map(i64::from))
            .or_else(|_| row.try_get::<i16, _>(idx).map(i64::from))
            .or_else(|_| row.try_get::<Oid, _>(idx).map(|v| i64::from(v.0)))
            .map(ScalarValue::Integer)
    }

    /// Exact decimal text, keeping the column's display scale (`12.50`, not `12.5000`).
    fn decode_numeric(row: &PgRow, idx: usize) -> Result<String, sqlx::Error> {
        let raw = row.try_get_raw(idx)?;
        if matches!(raw.format(), PgValueFormat::Text) {
            return row.try_get::<RawText, _>(idx).map(|v| v.0);
        }

        // sqlx drops the display scale; it sits in bytes 6..8 of the NUMERIC header.
        let scale = raw
            .as_bytes()
            .ok()
            .and_then(|b| b.get(6..8))
            .map(|b| i64::from(u16::from_be_bytes([b[0], b[1]])));

        row.try_get::<BigDecimal, _>(idx)
            .map(|v| match scale {
                Some(scale) => v.with_scale(scale).to_string(),
                None => v.to_string(),
            })
            .or_else(|_| row.try_get::<RawText, _>(idx).map(|v| v.0))
    }

    /// Text rendering for types outside the scalar categories.
    fn decode_other(row: &PgRow, idx: usize, type_name: &str) -> Result<String, sqlx::Error> {
        // Simple queries already carry PostgreSQL's own text output.
        if matches!(row.try_get_raw(idx)?.format(), PgValueFormat::Text) {
            return row.try_get::<RawText, _>(idx).map(|v| v.0);
        }

        let upper = type_name.to_ascii_uppercase();
        let rendered = match upper.as_str() {
            "INTERVAL" => row
                .try_get::<PgInterval, _>(idx)
                .map(|v| format_interval(&v)),
            "INET" | "CIDR" => row
                .try_get::<IpNetwork, _>(idx)
                .map(|v| format_network(&v, upper == "CIDR")),
            "MONEY" => row
                .try_get::<PgMoney, _>(idx)
                .map(|v| v.to_bigdecimal(2).to_string()),
            name if name.ends_with("[]") => decode_array(row, idx),
            _ => row.try_get::<String, _>(idx),
        };
        rendered.or_else(|_| row.try_get::<RawText, _>(idx).map(|v| v.0))
    }

    fn decode_array(row: &PgRow, idx: usize) -> Result<String, sqlx::Error> {
        fn render<T: ToString>(items: Vec<Option<T>>) -> String {
            format_array(items.into_iter().map(|item| item.map(|v| v.to_string())))
        }

        row.try_get::<Vec<Option<String>>, _>(idx)
            .map(format_array)
            .or_else(|_| row.try_get::<Vec<Option<i64>>, _>(idx).map(render))
            .or_else(|_| row.try_get::<Vec<Option<i32>>, _>(idx).map(render))
            .or_else(|_| row.try_get::<Vec<Option<i16>>, _>(idx).map(render))
            .or_else(|_| row.try_get::<Vec<Option<f64>>, _>(idx).map(render))
            .or_else(|_| row.try_get::<Vec<Option<f32>>, _>(idx).map(render))
            .or_else(|_| row.try_get::<Vec<Option<BigDecimal>>, _>(idx).map(render))
            .or_else(|_| row.try_get::<Vec<Option<Uuid>>, _>(idx).map(render))
            .or_else(|_| row.try_get::<Vec<Option<NaiveDate>>, _>(idx).map(render))
            .or_else(|_| {
                row.try_get::<Vec<Option<bool>>, _>(idx).map(|items| {
                    format_array(
                        items
                            .into_iter()
                            .map(|b| b.map(|b| if b { "t" } else { "f" }.to_string())),
                    )
                })
            })
    }

    fn decode_float(row: &PgRow, idx: usize) -> Result<ScalarValue, sqlx::Error> {
        row.try_get::<f64, _>(idx)
            .or_else(|_| row.try_get::<f32, _>(idx).map(f64::from))
            .map(ScalarValue::Float)
    }

    fn decode_time(row: &PgRow, idx: usize) -> Result<ScalarValue, sqlx::Error> {
        row.try_get::<NaiveTime, _>(idx)
            .map(|v| v.to_string())
            .or_else(|_| {
                row.try_get::<PgTimeTz<NaiveTime, FixedOffset>, _>(idx)
                    .map(|v| format!("{}{}", v.time, v.offset))
            })
            .or_else(|_| row.try_get::<RawText, _>(idx).map(|v| v.0))
            .map(ScalarValue::Text)
    }
}

mod sqlite {
    use super::*;
    use sqlx::sqlite::SqliteTypeInfo;

    pub fn decode_column(row: &SqliteRow, idx: usize, declared: &SqliteTypeInfo) -> ScalarValue {
        let raw = match row.try_get_raw(idx) {
            Ok(raw) => raw,
            Err(e) => return undecodable(idx, declared.name(), &e),
        };
        if raw.is_null() {
            return ScalarValue::Null;
        }

        // Expressions carry no declared type; fall back to the storage class.
        let storage = raw.type_info().name().to_string();
        let mut category = categorize_type(declared.name());
        if declared.is_null() || category == TypeCategory::Unknown {
            category = categorize_type(&storage);
        }

        let decoded = match category {
            TypeCategory::Integer => row.try_get::<i64, _>(idx).map(ScalarValue::Integer),
            TypeCategory::Float => row.try_get::<f64, _>(idx).map(ScalarValue::Float),
            // NUMERIC affinity stores integers or reals.
            TypeCategory::Numeric => match storage.as_str() {
                "INTEGER" => row.try_get::<i64, _>(idx).map(ScalarValue::Integer),
                "REAL" => row.try_get::<f64, _>(idx).map(ScalarValue::Float),
                _ => decode_text(row, idx),
            },
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).map(ScalarValue::Boolean),
            TypeCategory::Timestamp | TypeCategory::TimestampTz => row
                .try_get::<DateTime<Utc>, _>(idx)
                .or_else(|_| row.try_get::<NaiveDateTime, _>(idx).map(|v| v.and_utc()))
                .map(ScalarValue::Timestamp)
                .or_else(|_| decode_text(row, idx)),
            TypeCategory::Date => row
                .try_get::<NaiveDate, _>(idx)
                .map(|v| ScalarValue::Text(v.to_string()))
                .or_else(|_| decode_text(row, idx)),
            TypeCategory::Time => row
                .try_get::<NaiveTime, _>(idx)
                .map(|v| ScalarValue::Text(v.to_string()))
                .or_else(|_| decode_text(row, idx)),
            TypeCategory::Binary => row
                .try_get::<Vec<u8>, _>(idx)
                .map(|v| ScalarValue::Text(encode_binary(&v))),
            TypeCategory::Json
            | TypeCategory::Uuid
            | TypeCategory::Text
            | TypeCategory::Unknown => decode_text(row, idx),
        };

        // Column affinity does not bind storage: an INTEGER column may hold text.
        decoded
            .or_else(|_| decode_text(row, idx))
            .unwrap_or_else(|e| undecodable(idx, declared.name(), &e))
    }

    fn decode_text(row: &SqliteRow, idx: usize) -> Result<ScalarValue, sqlx::Error> {
        row.try_get_unchecked::<String, _>(idx).map(ScalarValue::Text)
    }
}
