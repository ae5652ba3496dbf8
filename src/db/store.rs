//! Persistence seam
//!
//! Everything the dispatcher, the importer and the routine pipeline need
//! from the database goes through [`Store`]. Cascading deletes, key
//! conflicts and cursor lifetimes are the store's responsibility.

use crate::error::AppError;
use crate::routines::RoutineKind;
use crate::schema::{RecordKey, TableDescriptor};
use crate::value::{CellValue, Record, ResultSet};
use async_trait::async_trait;

/// One row of the routine catalog
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub kind: RoutineKind,
    pub name: String,
    pub parameters: String,
    pub return_type: Option<String>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Every row of a table, ordered by key
    async fn fetch_all(&self, table: &'static TableDescriptor) -> Result<Vec<Record>, AppError>;

    async fn fetch_one(
        &self,
        table: &'static TableDescriptor,
        key: &RecordKey,
    ) -> Result<Option<Record>, AppError>;

    /// Insert a row; a `Null` synthetic id is assigned by the store
    async fn insert(&self, table: &'static TableDescriptor, record: &Record) -> Result<Record, AppError>;

    /// Insert unless a row with the same key exists; returns whether it was created
    async fn get_or_create(&self, table: &'static TableDescriptor, record: &Record) -> Result<bool, AppError>;

    /// Overwrite a row in one statement; returns whether it existed
    async fn update(
        &self,
        table: &'static TableDescriptor,
        key: &RecordKey,
        record: &Record,
    ) -> Result<bool, AppError>;

    /// Remove a row and everything it owns; returns whether it existed
    async fn delete(&self, table: &'static TableDescriptor, key: &RecordKey) -> Result<bool, AppError>;

    /// Remove every row of a table and everything they own
    async fn clear(&self, table: &'static TableDescriptor) -> Result<u64, AppError>;

    /// Move the id sequence past explicitly imported ids
    async fn sync_sequence(&self, table: &'static TableDescriptor) -> Result<(), AppError>;

    /// Execute a multi-statement script
    async fn run_script(&self, sql: &str) -> Result<(), AppError>;

    async fn list_routines(&self) -> Result<Vec<CatalogEntry>, AppError>;

    /// Run an arbitrary query and capture its result
    async fn query(&self, sql: &str) -> Result<ResultSet, AppError>;

    /// `SELECT * FROM name(args)`
    async fn call_function(&self, name: &str, args: &[CellValue]) -> Result<ResultSet, AppError>;

    /// Open a transaction for statements that must share it
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, AppError>;
}

/// An open transaction. Dropping it without `commit` rolls it back.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn call_procedure(&mut self, name: &str, args: &[CellValue]) -> Result<(), AppError>;

    /// Read everything from a cursor opened inside this transaction
    async fn fetch_cursor(&mut self, cursor: &str) -> Result<ResultSet, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}
