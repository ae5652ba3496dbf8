//! Schema Registry
//!
//! Compile-time description of every table the service administers. All
//! generic operations (forms, CRUD, export, import, DDL) are driven from
//! these descriptors instead of per-table code paths.

mod ddl;
mod tables;

pub use ddl::create_statements;
pub use tables::{BROWSE_ORDER, IMPORT_ORDER, TABLES};

use crate::error::AppError;
use crate::value::{CellValue, Record, NULL};
use serde::Serialize;

/// Valid values of a check status column or routine parameter
pub const STATUS_CHOICES: &[&str] = &["Start", "Success", "Failure"];

/// Semantic type of a stored field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldType {
    Text { max_length: usize },
    Integer,
    Date,
    Time,
    Status,
}

/// Default applied when a field is left out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Text(&'static str),
    Int(i64),
}

impl DefaultValue {
    pub fn to_cell(self) -> CellValue {
        match self {
            DefaultValue::Text(v) => CellValue::text(v),
            DefaultValue::Int(v) => CellValue::Int(v),
        }
    }
}

/// One field of a table
#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    /// Storage column; `None` for the synthetic `id`
    pub column: Option<&'static str>,
    pub field_type: FieldType,
    pub label: &'static str,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    /// Owning table; rows are removed together with their owner
    pub references: Option<&'static str>,
}

impl FieldDescriptor {
    /// Column name as it exists in the database
    pub fn storage_column(&self) -> &'static str {
        self.column.unwrap_or(self.name)
    }
}

/// How a table identifies its rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPolicy {
    /// Business attribute (nickname, title) used as a string key
    Natural,
    /// Auto-incremented integer `id`
    Synthetic,
}

/// Table-level validation, run after every field is clean
pub type CleanRule = fn(&TableDescriptor, &Record) -> Result<(), String>;

/// Full description of one table
#[derive(Debug)]
pub struct TableDescriptor {
    pub name: &'static str,
    pub verbose_name: &'static str,
    /// Declaration order; the primary key is always first
    pub fields: &'static [FieldDescriptor],
    pub key_policy: KeyPolicy,
    /// Field names that must be unique together
    pub unique_together: &'static [&'static str],
    pub clean: Option<CleanRule>,
}

impl TableDescriptor {
    pub fn primary_key(&self) -> &FieldDescriptor {
        &self.fields[0]
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Value of a named field in a record of this table
    pub fn value_of<'r>(&self, record: &'r Record, name: &str) -> &'r CellValue {
        match self.field_index(name) {
            Some(i) => record.get(i),
            None => &NULL,
        }
    }

    /// Fields the user edits; the synthetic `id` is assigned by the store
    pub fn editable_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        let skip = usize::from(self.key_policy == KeyPolicy::Synthetic);
        self.fields.iter().skip(skip)
    }

    /// Header used for CSV export and expected by CSV ingestion
    pub fn csv_header(&self) -> Vec<&'static str> {
        match self.key_policy {
            KeyPolicy::Natural => self.fields.iter().map(|f| f.storage_column()).collect(),
            KeyPolicy::Synthetic => std::iter::once("ID")
                .chain(self.fields.iter().filter_map(|f| f.column))
                .collect(),
        }
    }

    /// Coerce a raw key from a URL into this table's key type
    pub fn parse_key(&self, raw: &str) -> Result<RecordKey, AppError> {
        match self.key_policy {
            KeyPolicy::Natural => Ok(RecordKey::Text(raw.to_string())),
            KeyPolicy::Synthetic => raw.trim().parse::<i64>().map(RecordKey::Id).map_err(|_| {
                AppError::InvalidKeyFormat(format!(
                    "'{}' is not a valid id for table {}",
                    raw, self.name
                ))
            }),
        }
    }

    /// Tables whose rows are owned by this one, with the owning field
    #[cfg(test)]
    pub fn dependents(&self) -> impl Iterator<Item = (&'static TableDescriptor, &'static FieldDescriptor)> + '_ {
        TABLES.iter().copied().flat_map(move |table| {
            table
                .fields
                .iter()
                .filter(move |f| f.references == Some(self.name))
                .map(move |f| (table, f))
        })
    }
}

/// Primary key value, tagged by the table's key policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    Text(String),
    Id(i64),
}

impl RecordKey {
    pub fn to_cell(&self) -> CellValue {
        match self {
            RecordKey::Text(v) => CellValue::Text(v.clone()),
            RecordKey::Id(v) => CellValue::Int(*v),
        }
    }

    /// Key pointing at the row a foreign-key value refers to
    pub fn from_cell(value: &CellValue) -> Option<Self> {
        match value {
            CellValue::Text(v) => Some(RecordKey::Text(v.clone())),
            CellValue::Int(v) => Some(RecordKey::Id(*v)),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKey::Text(v) => write!(f, "{}", v),
            RecordKey::Id(v) => write!(f, "{}", v),
        }
    }
}

/// Look up a table by name (case-insensitive)
pub fn describe(table_name: &str) -> Result<&'static TableDescriptor, AppError> {
    TABLES
        .iter()
        .copied()
        .find(|t| t.name.eq_ignore_ascii_case(table_name))
        .ok_or_else(|| AppError::UnknownTable(table_name.to_string()))
}

/// Field descriptors of a table in declaration order
pub fn fields_of(table_name: &str) -> Result<&'static [FieldDescriptor], AppError> {
    describe(table_name).map(|t| t.fields)
}

/// Table names in the order they are browsed
pub fn table_names() -> Vec<&'static str> {
    BROWSE_ORDER.to_vec()
}
