//! Cell values and result sets
//!
//! Every row that crosses the store boundary, whether it comes from a table
//! read or from a routine call, is carried as positional `CellValue`s.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::fmt;

/// Date rendering used for exports and session snapshots
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Timestamp rendering shared by JSON responses and exports
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Time rendering used for exports and CSV ingestion
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// A single scalar value read from or written to the store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    #[serde(serialize_with = "serialize_timestamp")]
    Timestamp(NaiveDateTime),
    Time(NaiveTime),
    Decimal(Decimal),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Make the value safe to keep in a session snapshot.
    ///
    /// Dates and timestamps become `YYYY-MM-DD` text and decimals their exact
    /// string form; everything else passes through unchanged.
    pub fn normalized(self) -> Self {
        match self {
            CellValue::Date(d) => CellValue::Text(d.format(DATE_FORMAT).to_string()),
            CellValue::Timestamp(ts) => CellValue::Text(ts.format(DATE_FORMAT).to_string()),
            CellValue::Decimal(d) => CellValue::Text(d.to_string()),
            other => other,
        }
    }

    /// Text used when the value is written into a CSV cell or a form input
    pub fn to_csv_field(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            other => other.to_string(),
        }
    }
}

fn serialize_timestamp<S: Serializer>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "NULL"),
            CellValue::Bool(v) => write!(f, "{}", v),
            CellValue::Int(v) => write!(f, "{}", v),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Text(v) => write!(f, "{}", v),
            CellValue::Date(v) => write!(f, "{}", v.format(DATE_FORMAT)),
            CellValue::Timestamp(v) => write!(f, "{}", v.format(TIMESTAMP_FORMAT)),
            CellValue::Time(v) => write!(f, "{}", v.format(TIME_FORMAT)),
            CellValue::Decimal(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

/// Shared `Null` handed out for missing positions
pub static NULL: CellValue = CellValue::Null;

/// One stored row, positionally aligned with its table's field descriptors
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record(pub Vec<CellValue>);

impl Record {
    pub fn values(&self) -> &[CellValue] {
        &self.0
    }

    pub fn get(&self, index: usize) -> &CellValue {
        self.0.get(index).unwrap_or(&NULL)
    }

    /// The primary key is always the first field
    pub fn key(&self) -> &CellValue {
        self.get(0)
    }
}

impl AsRef<[CellValue]> for Record {
    fn as_ref(&self) -> &[CellValue] {
        &self.0
    }
}

/// Column names plus positional rows
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { columns, rows }
    }

    /// Normalize every cell, see [`CellValue::normalized`]
    pub fn normalized(self) -> Self {
        Self {
            columns: self.columns,
            rows: self
                .rows
                .into_iter()
                .map(|row| row.into_iter().map(CellValue::normalized).collect())
                .collect(),
        }
    }
}
