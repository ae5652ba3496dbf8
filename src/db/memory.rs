//! In-memory store used by unit tests
//!
//! Mirrors what the PostgreSQL schema enforces: key and unique-together
//! conflicts, owner existence, cascading deletes and cursors that only live
//! inside the transaction that opened them. Every transactional statement is
//! appended to a journal so tests can assert the call sequence.

use super::queries::SqlBuilder;
use super::store::{CatalogEntry, Store, StoreTransaction};
use crate::error::AppError;
use crate::schema::{describe, KeyPolicy, RecordKey, TableDescriptor};
use crate::value::{CellValue, Record, ResultSet};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct State {
    rows: HashMap<&'static str, Vec<Record>>,
    next_id: HashMap<&'static str, i64>,
    functions: HashMap<String, ResultSet>,
    procedures: HashMap<String, ResultSet>,
    /// Procedures that commit or roll back inside their body
    ending_transaction: HashSet<String>,
    queries: HashMap<String, ResultSet>,
    catalog: Vec<CatalogEntry>,
    scripts: Vec<String>,
    journal: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

fn failure(message: impl Into<String>) -> AppError {
    AppError::Internal(message.into())
}

fn key_order(a: &CellValue, b: &CellValue) -> Ordering {
    match (a, b) {
        (CellValue::Int(x), CellValue::Int(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("memory store lock")
    }

    /// Register a function and the rows it returns
    pub fn with_function(self, name: &str, result: ResultSet) -> Self {
        self.lock().functions.insert(name.to_string(), result);
        self
    }

    /// Register a procedure and the rows it writes into its cursor
    pub fn with_procedure(self, name: &str, result: ResultSet) -> Self {
        self.lock().procedures.insert(name.to_string(), result);
        self
    }

    /// Register a procedure that ends the surrounding transaction, which
    /// closes every cursor it opened
    pub fn with_procedure_ending_transaction(self, name: &str, result: ResultSet) -> Self {
        {
            let mut state = self.lock();
            state.procedures.insert(name.to_string(), result);
            state.ending_transaction.insert(name.to_string());
        }
        self
    }

    /// Register the result of an ad-hoc query
    pub fn with_query(self, sql: &str, result: ResultSet) -> Self {
        self.lock().queries.insert(sql.to_string(), result);
        self
    }

    pub fn with_routine(self, entry: CatalogEntry) -> Self {
        self.lock().catalog.push(entry);
        self
    }

    pub fn journal(&self) -> Vec<String> {
        self.lock().journal.clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.lock().scripts.clone()
    }

    /// Rows of a table, ordered by key
    pub fn rows(&self, table: &str) -> Vec<Record> {
        let name = match describe(table) {
            Ok(t) => t.name,
            Err(_) => return Vec::new(),
        };
        let mut rows = self.lock().rows.get(name).cloned().unwrap_or_default();
        rows.sort_by(|a, b| key_order(a.key(), b.key()));
        rows
    }
}

impl State {
    fn contains(&self, table: &str, key: &CellValue) -> bool {
        self.rows
            .get(table)
            .is_some_and(|rows| rows.iter().any(|r| r.key() == key))
    }

    fn check_owners(&self, table: &TableDescriptor, record: &Record) -> Result<(), AppError> {
        for (i, field) in table.fields.iter().enumerate() {
            let (Some(owner), value) = (field.references, record.get(i)) else {
                continue;
            };
            if !value.is_null() && !self.contains(owner, value) {
                return Err(AppError::Conflict(format!(
                    "{} refers to a missing row: {} = {}",
                    table.verbose_name,
                    field.storage_column(),
                    value
                )));
            }
        }
        Ok(())
    }

    fn check_unique(&self, table: &TableDescriptor, record: &Record, skip: Option<&CellValue>) -> Result<(), AppError> {
        let indexes: Vec<usize> = table
            .unique_together
            .iter()
            .filter_map(|name| table.field_index(name))
            .collect();
        if indexes.is_empty() {
            return Ok(());
        }
        let clash = self.rows.get(table.name).is_some_and(|rows| {
            rows.iter()
                .filter(|r| Some(r.key()) != skip)
                .any(|r| indexes.iter().all(|&i| r.get(i) == record.get(i)))
        });
        if clash {
            return Err(AppError::Conflict(format!(
                "{} with these values already exists",
                table.verbose_name
            )));
        }
        Ok(())
    }

    fn insert(&mut self, table: &'static TableDescriptor, record: &Record) -> Result<Record, AppError> {
        let mut record = record.clone();
        if table.key_policy == KeyPolicy::Synthetic {
            let next = self.next_id.entry(table.name).or_insert(1);
            match record.key().clone() {
                CellValue::Null => {
                    record.0[0] = CellValue::Int(*next);
                    *next += 1;
                }
                CellValue::Int(id) => *next = (*next).max(id + 1),
                other => return Err(failure(format!("invalid id {}", other))),
            }
        }

        if self.contains(table.name, record.key()) {
            return Err(AppError::Conflict(format!(
                "{} with this key already exists",
                table.verbose_name
            )));
        }
        self.check_owners(table, &record)?;
        self.check_unique(table, &record, None)?;

        self.rows.entry(table.name).or_default().push(record.clone());
        Ok(record)
    }

    /// Remove rows owned by any of `keys`, following ownership transitively
    fn cascade(&mut self, table: &'static TableDescriptor, keys: &[CellValue]) {
        for (dependent, field) in table.dependents() {
            let Some(idx) = dependent.field_index(field.name) else {
                continue;
            };
            let Some(rows) = self.rows.get_mut(dependent.name) else {
                continue;
            };
            let (removed, kept): (Vec<Record>, Vec<Record>) =
                rows.drain(..).partition(|r| keys.contains(r.get(idx)));
            *rows = kept;
            if !removed.is_empty() {
                let removed_keys: Vec<CellValue> = removed.iter().map(|r| r.key().clone()).collect();
                self.cascade(dependent, &removed_keys);
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_all(&self, table: &'static TableDescriptor) -> Result<Vec<Record>, AppError> {
        Ok(self.rows(table.name))
    }

    async fn fetch_one(
        &self,
        table: &'static TableDescriptor,
        key: &RecordKey,
    ) -> Result<Option<Record>, AppError> {
        let key = key.to_cell();
        Ok(self
            .lock()
            .rows
            .get(table.name)
            .and_then(|rows| rows.iter().find(|r| *r.key() == key).cloned()))
    }

    async fn insert(&self, table: &'static TableDescriptor, record: &Record) -> Result<Record, AppError> {
        self.lock().insert(table, record)
    }

    async fn get_or_create(&self, table: &'static TableDescriptor, record: &Record) -> Result<bool, AppError> {
        let mut state = self.lock();
        if !record.key().is_null() && state.contains(table.name, record.key()) {
            return Ok(false);
        }
        state.insert(table, record)?;
        Ok(true)
    }

    async fn update(
        &self,
        table: &'static TableDescriptor,
        key: &RecordKey,
        record: &Record,
    ) -> Result<bool, AppError> {
        let key = key.to_cell();
        let mut state = self.lock();
        if !state.contains(table.name, &key) {
            return Ok(false);
        }

        let mut record = record.clone();
        if table.key_policy == KeyPolicy::Synthetic {
            record.0[0] = key.clone();
        } else if *record.key() != key && state.contains(table.name, record.key()) {
            return Err(AppError::Conflict(format!(
                "{} with this key already exists",
                table.verbose_name
            )));
        }
        state.check_owners(table, &record)?;
        state.check_unique(table, &record, Some(&key))?;

        if let Some(row) = state
            .rows
            .get_mut(table.name)
            .and_then(|rows| rows.iter_mut().find(|r| *r.key() == key))
        {
            *row = record;
        }
        Ok(true)
    }

    async fn delete(&self, table: &'static TableDescriptor, key: &RecordKey) -> Result<bool, AppError> {
        let key = key.to_cell();
        let mut state = self.lock();
        let Some(rows) = state.rows.get_mut(table.name) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|r| *r.key() != key);
        if rows.len() == before {
            return Ok(false);
        }
        state.cascade(table, &[key]);
        Ok(true)
    }

    async fn clear(&self, table: &'static TableDescriptor) -> Result<u64, AppError> {
        let mut state = self.lock();
        let removed = state.rows.remove(table.name).unwrap_or_default();
        let keys: Vec<CellValue> = removed.iter().map(|r| r.key().clone()).collect();
        state.cascade(table, &keys);
        Ok(keys.len() as u64)
    }

    async fn sync_sequence(&self, table: &'static TableDescriptor) -> Result<(), AppError> {
        if table.key_policy != KeyPolicy::Synthetic {
            return Ok(());
        }
        let mut state = self.lock();
        let max = state
            .rows
            .get(table.name)
            .into_iter()
            .flatten()
            .filter_map(|r| match r.key() {
                CellValue::Int(id) => Some(*id),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        state.next_id.insert(table.name, max + 1);
        Ok(())
    }

    async fn run_script(&self, sql: &str) -> Result<(), AppError> {
        self.lock().scripts.push(sql.to_string());
        Ok(())
    }

    async fn list_routines(&self) -> Result<Vec<CatalogEntry>, AppError> {
        Ok(self.lock().catalog.clone())
    }

    async fn query(&self, sql: &str) -> Result<ResultSet, AppError> {
        self.lock()
            .queries
            .get(sql)
            .cloned()
            .ok_or_else(|| failure(format!("syntax error at or near \"{}\"", sql)))
    }

    async fn call_function(&self, name: &str, args: &[CellValue]) -> Result<ResultSet, AppError> {
        let mut state = self.lock();
        state.journal.push(SqlBuilder::call_function(name, args));
        state
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| failure(format!("function {}() does not exist", name)))
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, AppError> {
        self.lock().journal.push("BEGIN".to_string());
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            cursors: HashMap::new(),
            open: true,
        }))
    }
}

struct MemoryTransaction {
    store: MemoryStore,
    cursors: HashMap<String, ResultSet>,
    open: bool,
}

impl MemoryTransaction {
    fn finish(&mut self, statement: &str) {
        self.open = false;
        self.cursors.clear();
        self.store.lock().journal.push(statement.to_string());
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn call_procedure(&mut self, name: &str, args: &[CellValue]) -> Result<(), AppError> {
        let (result, ends_transaction) = {
            let mut state = self.store.lock();
            state.journal.push(SqlBuilder::call_procedure(name, args));
            (
                state.procedures.get(name).cloned(),
                state.ending_transaction.contains(name),
            )
        };
        let result = result.ok_or_else(|| failure(format!("procedure {}() does not exist", name)))?;
        if ends_transaction {
            self.cursors.clear();
        } else if let Some(CellValue::Text(cursor)) = args.last() {
            self.cursors.insert(cursor.clone(), result);
        }
        Ok(())
    }

    async fn fetch_cursor(&mut self, cursor: &str) -> Result<ResultSet, AppError> {
        self.store.lock().journal.push(SqlBuilder::fetch_cursor(cursor));
        self.cursors
            .get(cursor)
            .cloned()
            .ok_or_else(|| failure(format!("cursor \"{}\" does not exist", cursor)))
    }

    async fn commit(mut self: Box<Self>) -> Result<(), AppError> {
        self.finish("COMMIT");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), AppError> {
        self.finish("ROLLBACK");
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.open {
            self.finish("ROLLBACK");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::describe;
    use pretty_assertions::assert_eq;

    fn peer(nickname: &str) -> Record {
        Record(vec![CellValue::text(nickname), CellValue::Null])
    }

    #[tokio::test]
    async fn test_delete_cascades_through_owned_rows() {
        let store = MemoryStore::new();
        let peers = describe("Peers").unwrap();
        let tasks = describe("Tasks").unwrap();
        let checks = describe("Checks").unwrap();
        let xp = describe("XP").unwrap();

        store.insert(peers, &peer("alice")).await.unwrap();
        store.insert(peers, &peer("bob")).await.unwrap();
        store
            .insert(tasks, &Record(vec!["C2_s21_bash".into(), "0".into(), CellValue::Int(250)]))
            .await
            .unwrap();
        let check = store
            .insert(checks, &Record(vec![CellValue::Null, "alice".into(), "C2_s21_bash".into(), CellValue::Null]))
            .await
            .unwrap();
        assert_eq!(*check.key(), CellValue::Int(1));
        store
            .insert(xp, &Record(vec![CellValue::Null, CellValue::Int(1), CellValue::Int(200)]))
            .await
            .unwrap();

        assert!(store.delete(peers, &RecordKey::Text("alice".into())).await.unwrap());

        assert_eq!(store.rows("Peers").len(), 1);
        assert!(store.rows("Checks").is_empty());
        assert!(store.rows("XP").is_empty());
        assert_eq!(store.rows("Tasks").len(), 1);
    }

    #[tokio::test]
    async fn test_missing_owner_is_a_conflict() {
        let store = MemoryStore::new();
        let friends = describe("Friends").unwrap();
        let result = store
            .insert(friends, &Record(vec![CellValue::Null, "ghost".into(), "nobody".into()]))
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_cursor_does_not_outlive_its_transaction() {
        let result = ResultSet::new(vec!["n".into()], vec![vec![CellValue::Int(1)]]);
        let store = MemoryStore::new().with_procedure("prc_one", result.clone());

        let mut tx = store.begin().await.unwrap();
        tx.call_procedure("prc_one", &["procedure_result".into()]).await.unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.fetch_cursor("procedure_result").await.is_err());
        drop(tx);

        assert_eq!(
            store.journal(),
            vec![
                "BEGIN",
                "CALL \"prc_one\"('procedure_result')",
                "ROLLBACK",
                "BEGIN",
                "FETCH ALL FROM \"procedure_result\"",
                "ROLLBACK",
            ]
        );
    }
}
