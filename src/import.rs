//! Bulk CSV ingestion and the bootstrap script
//!
//! Fixture files use the export layout of their table. Rows are inserted
//! only when their key is not present yet, so ingestion can be repeated.

use crate::db::store::Store;
use crate::error::AppError;
use crate::schema::{describe, FieldDescriptor, FieldType, RecordKey, TableDescriptor, IMPORT_ORDER};
use crate::value::{CellValue, Record, DATE_FORMAT, TIME_FORMAT};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of ingesting one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub table: &'static str,
    pub rows: usize,
    pub created: usize,
}

pub struct Importer {
    store: Arc<dyn Store>,
    data_dir: PathBuf,
    bootstrap_sql: PathBuf,
}

fn parse_value(field: &FieldDescriptor, raw: &str) -> Result<CellValue, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return if field.nullable {
            Ok(CellValue::Null)
        } else {
            Err(format!("{} is required", field.storage_column()))
        };
    }

    match field.field_type {
        FieldType::Text { .. } | FieldType::Status => Ok(CellValue::text(raw)),
        FieldType::Integer => raw
            .parse()
            .map(CellValue::Int)
            .map_err(|_| format!("'{}' is not an integer", raw)),
        FieldType::Date => NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map(CellValue::Date)
            .map_err(|_| format!("'{}' is not a date (YYYY-MM-DD)", raw)),
        FieldType::Time => NaiveTime::parse_from_str(raw, TIME_FORMAT)
            .map(CellValue::Time)
            .map_err(|_| format!("'{}' is not a time (HH:MM:SS)", raw)),
    }
}

fn parse_row(table: &TableDescriptor, row: &csv::StringRecord) -> Result<Record, String> {
    if row.len() != table.fields.len() {
        return Err(format!(
            "expected {} columns, found {}",
            table.fields.len(),
            row.len()
        ));
    }
    table
        .fields
        .iter()
        .zip(row.iter())
        .map(|(field, raw)| parse_value(field, raw))
        .collect::<Result<Vec<_>, _>>()
        .map(Record)
}

impl Importer {
    pub fn new(store: Arc<dyn Store>, data_dir: impl Into<PathBuf>, bootstrap_sql: impl Into<PathBuf>) -> Self {
        Self {
            store,
            data_dir: data_dir.into(),
            bootstrap_sql: bootstrap_sql.into(),
        }
    }

    /// Ingest `<data_dir>/<Table>.csv`, stopping at the first bad row
    pub async fn import_table(&self, table_name: &str) -> Result<ImportReport, AppError> {
        let table = describe(table_name)?;
        let path = self.data_dir.join(format!("{}.csv", table.name));
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => AppError::ImportFailed(format!("{} does not exist", path.display())),
            _ => AppError::Io(e),
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(bytes.as_slice());

        let mut report = ImportReport {
            table: table.name,
            rows: 0,
            created: 0,
        };
        for row in reader.records() {
            let row = row.map_err(|e| AppError::ImportFailed(format!("{}: {}", table.name, e)))?;
            let line = row.position().map_or(0, |p| p.line());
            let fail = |detail: String| AppError::ImportFailed(format!("{} line {}: {}", table.name, line, detail));

            let record = parse_row(table, &row).map_err(fail)?;
            self.check_owners(table, &record).await.map_err(fail)?;
            let created = self
                .store
                .get_or_create(table, &record)
                .await
                .map_err(|e| fail(e.to_string()))?;

            report.rows += 1;
            report.created += usize::from(created);
        }

        self.store.sync_sequence(table).await?;
        info!(
            "Imported {}: {} rows read, {} created",
            table.name, report.rows, report.created
        );
        Ok(report)
    }

    /// Ingest every table, owners first, then run the bootstrap script
    pub async fn import_all(&self) -> Result<Vec<ImportReport>, AppError> {
        let mut reports = Vec::with_capacity(IMPORT_ORDER.len());
        for table_name in IMPORT_ORDER {
            reports.push(self.import_table(table_name).await?);
        }
        self.run_bootstrap().await?;
        Ok(reports)
    }

    /// Execute the bootstrap script that provisions routines
    pub async fn run_bootstrap(&self) -> Result<(), AppError> {
        let script = tokio::fs::read_to_string(&self.bootstrap_sql).await.map_err(|e| {
            warn!("Cannot read {}: {}", self.bootstrap_sql.display(), e);
            AppError::ImportFailed(format!("{}: {}", self.bootstrap_sql.display(), e))
        })?;
        self.store.run_script(&script).await?;
        info!("Bootstrap script {} executed", self.bootstrap_sql.display());
        Ok(())
    }

    async fn check_owners(&self, table: &TableDescriptor, record: &Record) -> Result<(), String> {
        for (i, field) in table.fields.iter().enumerate() {
            let Some(owner) = field.references else {
                continue;
            };
            let Some(key) = RecordKey::from_cell(record.get(i)) else {
                continue;
            };
            let owner_table = describe(owner).map_err(|e| e.to_string())?;
            let found = self
                .store
                .fetch_one(owner_table, &key)
                .await
                .map_err(|e| e.to_string())?;
            if found.is_none() {
                return Err(format!(
                    "{} {} does not exist in {}",
                    field.storage_column(),
                    key,
                    owner
                ));
            }
        }
        Ok(())
    }
}
