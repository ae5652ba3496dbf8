//! PostgreSQL conversions for cell values

use crate::error::AppError;
use crate::value::{CellValue, ResultSet};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use postgres_types::{to_sql_checked, FromSql, IsNull, Kind, ToSql, Type};
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt;
use tokio_postgres::{Row, Statement};
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

impl ToSql for CellValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            CellValue::Null => Ok(IsNull::Yes),
            CellValue::Bool(v) => v.to_sql(ty, out),
            CellValue::Int(v) => match *ty {
                Type::INT2 => i16::try_from(*v)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            CellValue::Float(v) => v.to_sql(ty, out),
            // text also covers user-defined enums, whose binary form is the label
            CellValue::Text(v) => v.as_str().to_sql(ty, out),
            CellValue::Date(v) => v.to_sql(ty, out),
            CellValue::Timestamp(v) => v.to_sql(ty, out),
            CellValue::Time(v) => v.to_sql(ty, out),
            CellValue::Decimal(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Undecoded column bytes, handed to `decode` together with the column type
struct RawValue<'a>(&'a [u8]);

impl<'a> FromSql<'a> for RawValue<'a> {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(RawValue(raw))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// `interval` in its binary layout: microseconds, days, months
struct Interval {
    micros: i64,
    days: i32,
    months: i32,
}

impl<'a> FromSql<'a> for Interval {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        if raw.len() != 16 {
            return Err("invalid message length: interval".into());
        }
        Ok(Interval {
            micros: i64::from_be_bytes(raw[..8].try_into()?),
            days: i32::from_be_bytes(raw[8..12].try_into()?),
            months: i32::from_be_bytes(raw[12..].try_into()?),
        })
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

/// Rendered the way the server prints intervals: `1 year 2 mons 3 days 04:05:06`
impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (value, unit) in [
            (self.months / 12, "year"),
            (self.months % 12, "mon"),
            (self.days, "day"),
        ] {
            if value != 0 {
                let plural = if value == 1 { "" } else { "s" };
                parts.push(format!("{} {}{}", value, unit, plural));
            }
        }

        if self.micros != 0 || parts.is_empty() {
            let sign = if self.micros < 0 {
                "-"
            } else if self.months < 0 || self.days < 0 {
                "+"
            } else {
                ""
            };
            let total = self.micros.unsigned_abs();
            let secs = total / 1_000_000;
            let mut clock = format!(
                "{}{:02}:{:02}:{:02}",
                sign,
                secs / 3600,
                secs / 60 % 60,
                secs % 60
            );
            let frac = total % 1_000_000;
            if frac != 0 {
                clock.push_str(format!(".{:06}", frac).trim_end_matches('0'));
            }
            parts.push(clock);
        }
        f.write_str(&parts.join(" "))
    }
}

/// `\x` followed by lowercase hex, the server's default bytea output
fn bytea_hex(raw: &[u8]) -> String {
    let mut out = String::with_capacity(2 + raw.len() * 2);
    out.push_str("\\x");
    for byte in raw {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// One array element in `{...}` literal syntax
fn array_element(cell: &CellValue) -> String {
    let text = match cell {
        CellValue::Null => return "NULL".to_string(),
        other => other.to_string(),
    };
    let needs_quotes = text.is_empty()
        || text.eq_ignore_ascii_case("NULL")
        || text
            .chars()
            .any(|c| matches!(c, ',' | '{' | '}' | '"' | '\\') || c.is_whitespace());
    if needs_quotes {
        format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        text
    }
}

/// Decode a binary column value according to its type.
///
/// Types without a mapping are an error rather than a guess at their bytes.
pub fn decode(ty: &Type, raw: Option<&[u8]>) -> Result<CellValue, BoxError> {
    let Some(raw) = raw else {
        return Ok(CellValue::Null);
    };

    let cell = match *ty {
        Type::BOOL => CellValue::Bool(bool::from_sql(ty, raw)?),
        Type::INT2 => CellValue::Int(i16::from_sql(ty, raw)?.into()),
        Type::INT4 => CellValue::Int(i32::from_sql(ty, raw)?.into()),
        Type::INT8 => CellValue::Int(i64::from_sql(ty, raw)?),
        Type::OID => CellValue::Int(u32::from_sql(ty, raw)?.into()),
        Type::FLOAT4 => CellValue::Float(f32::from_sql(ty, raw)?.into()),
        Type::FLOAT8 => CellValue::Float(f64::from_sql(ty, raw)?),
        Type::NUMERIC => CellValue::Decimal(Decimal::from_sql(ty, raw)?),
        Type::DATE => CellValue::Date(NaiveDate::from_sql(ty, raw)?),
        Type::TIMESTAMP => CellValue::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
        Type::TIMESTAMPTZ => CellValue::Timestamp(DateTime::<Utc>::from_sql(ty, raw)?.naive_utc()),
        Type::TIME => CellValue::Time(NaiveTime::from_sql(ty, raw)?),
        Type::CHAR => CellValue::Text(char::from(i8::from_sql(ty, raw)? as u8).to_string()),
        Type::UUID => CellValue::Text(Uuid::from_sql(ty, raw)?.to_string()),
        Type::JSON | Type::JSONB => CellValue::Text(serde_json::Value::from_sql(ty, raw)?.to_string()),
        Type::INTERVAL => CellValue::Text(Interval::from_sql(ty, raw)?.to_string()),
        Type::BYTEA => CellValue::Text(bytea_hex(raw)),
        ref text if <String as FromSql<'_>>::accepts(text) => CellValue::Text(String::from_sql(ty, raw)?),
        _ => match ty.kind() {
            // enum labels travel as their UTF-8 text
            Kind::Enum(_) => CellValue::Text(std::str::from_utf8(raw)?.to_string()),
            Kind::Domain(base) => return decode(base, Some(raw)),
            Kind::Array(member) => {
                let items = Vec::<Option<RawValue>>::from_sql(ty, raw)?;
                let rendered = items
                    .into_iter()
                    .map(|item| decode(member, item.map(|v| v.0)).map(|cell| array_element(&cell)))
                    .collect::<Result<Vec<_>, _>>()?;
                CellValue::Text(format!("{{{}}}", rendered.join(",")))
            }
            _ => return Err(format!("unsupported column type {}", ty).into()),
        },
    };
    Ok(cell)
}

/// Decode one column of a row according to its reported type
pub fn cell_from_row(row: &Row, idx: usize) -> Result<CellValue, AppError> {
    let column = &row.columns()[idx];
    let raw = row.try_get::<_, Option<RawValue>>(idx)?;
    decode(column.type_(), raw.map(|v| v.0)).map_err(|e| {
        AppError::Internal(format!(
            "Cannot read column '{}' of type {}: {}",
            column.name(),
            column.type_(),
            e
        ))
    })
}

/// Decode every column of a row
pub fn cells_from_row(row: &Row) -> Result<Vec<CellValue>, AppError> {
    (0..row.len()).map(|i| cell_from_row(row, i)).collect()
}

/// Turn the rows of a prepared statement into a result set; column names
/// come from the statement so empty results keep their header
pub fn result_set(statement: &Statement, rows: &[Row]) -> Result<ResultSet, AppError> {
    let columns = statement
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    let rows = rows.iter().map(cells_from_row).collect::<Result<Vec<_>, _>>()?;
    Ok(ResultSet::new(columns, rows))
}
