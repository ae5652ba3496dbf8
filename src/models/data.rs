//! Table data DTOs

use crate::forms::FormSpec;
use crate::import::ImportReport;
use serde::Serialize;

/// Names of the administered tables
#[derive(Debug, Serialize)]
pub struct TableNamesResponse {
    pub tables: Vec<&'static str>,
}

/// A form to render for a table
#[derive(Debug, Serialize)]
pub struct TableFormResponse {
    pub table: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub form: FormSpec,
}

/// Result of clearing a table
#[derive(Debug, Serialize)]
pub struct ClearTableResponse {
    pub table: &'static str,
    pub removed: u64,
}

/// Result of ingesting every fixture
#[derive(Debug, Serialize)]
pub struct ImportAllResponse {
    pub tables: Vec<ImportReport>,
}
