//! PostgreSQL-backed store

use super::queries::{SqlBuilder, LIST_ROUTINES};
use super::store::{CatalogEntry, Store, StoreTransaction};
use super::types::{cells_from_row, result_set};
use crate::error::AppError;
use crate::routines::RoutineKind;
use crate::schema::{KeyPolicy, RecordKey, TableDescriptor};
use crate::value::{CellValue, Record, ResultSet};
use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use std::future::Future;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::SimpleQueryMessage;
use tracing::{debug, warn};

/// Store over a deadpool connection pool
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

fn params(values: &[CellValue]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

/// Constraint violations are the caller's fault, everything else is ours
fn write_error(table: &TableDescriptor, e: tokio_postgres::Error) -> AppError {
    match e.code() {
        Some(state) if *state == SqlState::UNIQUE_VIOLATION => AppError::Conflict(format!(
            "{} with these values already exists",
            table.verbose_name
        )),
        Some(state) if *state == SqlState::FOREIGN_KEY_VIOLATION => {
            AppError::Conflict(format!("{} refers to a missing row: {}", table.verbose_name, e))
        }
        _ => AppError::Database(e),
    }
}

/// Prepared statements hold a single command; the server refuses more
fn is_multi_statement(e: &tokio_postgres::Error) -> bool {
    e.code() == Some(&SqlState::SYNTAX_ERROR)
        && e
            .as_db_error()
            .is_some_and(|db| db.message().contains("multiple commands"))
}

/// Simple-protocol traffic reduced to what a result set needs
#[derive(Debug)]
enum Message {
    Columns(Vec<String>),
    Row(Vec<Option<String>>),
    Complete,
}

impl Message {
    fn from_simple(message: SimpleQueryMessage) -> Option<Self> {
        match message {
            SimpleQueryMessage::RowDescription(columns) => Some(Message::Columns(
                columns.iter().map(|c| c.name().to_string()).collect(),
            )),
            SimpleQueryMessage::Row(row) => Some(Message::Row(
                (0..row.len()).map(|i| row.get(i).map(str::to_string)).collect(),
            )),
            SimpleQueryMessage::CommandComplete(_) => Some(Message::Complete),
            _ => None,
        }
    }
}

/// Result of the last statement of a script, values as text
fn last_result(messages: impl IntoIterator<Item = Message>) -> ResultSet {
    let mut current = ResultSet::default();
    let mut last = ResultSet::default();
    for message in messages {
        match message {
            Message::Columns(columns) => current.columns = columns,
            Message::Row(values) => current.rows.push(
                values
                    .into_iter()
                    .map(|v| v.map_or(CellValue::Null, CellValue::Text))
                    .collect(),
            ),
            Message::Complete => last = std::mem::take(&mut current),
        }
    }
    last
}

#[async_trait]
impl Store for PgStore {
    async fn fetch_all(&self, table: &'static TableDescriptor) -> Result<Vec<Record>, AppError> {
        let client = self.pool.get().await?;
        let rows = client.query(&SqlBuilder::select_all(table), &[]).await?;
        let records = rows
            .iter()
            .map(|row| cells_from_row(row).map(Record))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn fetch_one(
        &self,
        table: &'static TableDescriptor,
        key: &RecordKey,
    ) -> Result<Option<Record>, AppError> {
        let client = self.pool.get().await?;
        let key = key.to_cell();
        let row = client
            .query_opt(&SqlBuilder::select_by_key(table), &[&key])
            .await?;
        match row {
            Some(row) => Ok(Some(Record(cells_from_row(&row)?))),
            None => Ok(None),
        }
    }

    async fn insert(&self, table: &'static TableDescriptor, record: &Record) -> Result<Record, AppError> {
        let assigns_id = table.key_policy == KeyPolicy::Synthetic && record.key().is_null();
        let skip = usize::from(assigns_id);

        let columns: Vec<&str> = table.fields[skip..].iter().map(|f| f.storage_column()).collect();
        let values = &record.values()[skip..];
        let sql = format!(
            "{} RETURNING {}",
            SqlBuilder::insert(table, &columns, false),
            SqlBuilder::column_list(table)
        );

        let client = self.pool.get().await?;
        let row = client
            .query_one(&sql, &params(values))
            .await
            .map_err(|e| write_error(table, e))?;
        debug!("Inserted row into {}", table.name);
        Ok(Record(cells_from_row(&row)?))
    }

    async fn get_or_create(&self, table: &'static TableDescriptor, record: &Record) -> Result<bool, AppError> {
        let columns: Vec<&str> = table.fields.iter().map(|f| f.storage_column()).collect();
        let sql = SqlBuilder::insert(table, &columns, true);

        let client = self.pool.get().await?;
        let created = client
            .execute(&sql, &params(record.values()))
            .await
            .map_err(|e| write_error(table, e))?;
        Ok(created == 1)
    }

    async fn update(
        &self,
        table: &'static TableDescriptor,
        key: &RecordKey,
        record: &Record,
    ) -> Result<bool, AppError> {
        let (sql, indexes) = SqlBuilder::update(table);
        let mut values: Vec<CellValue> = indexes.iter().map(|&i| record.get(i).clone()).collect();
        values.push(key.to_cell());

        let client = self.pool.get().await?;
        let updated = client
            .execute(&sql, &params(&values))
            .await
            .map_err(|e| write_error(table, e))?;
        Ok(updated > 0)
    }

    async fn delete(&self, table: &'static TableDescriptor, key: &RecordKey) -> Result<bool, AppError> {
        let client = self.pool.get().await?;
        let key = key.to_cell();
        let deleted = client.execute(&SqlBuilder::delete(table), &[&key]).await?;
        Ok(deleted > 0)
    }

    async fn clear(&self, table: &'static TableDescriptor) -> Result<u64, AppError> {
        let client = self.pool.get().await?;
        Ok(client.execute(&SqlBuilder::clear(table), &[]).await?)
    }

    async fn sync_sequence(&self, table: &'static TableDescriptor) -> Result<(), AppError> {
        if table.key_policy != KeyPolicy::Synthetic {
            return Ok(());
        }
        let client = self.pool.get().await?;
        client.query_one(&SqlBuilder::sync_sequence(table), &[]).await?;
        Ok(())
    }

    async fn run_script(&self, sql: &str) -> Result<(), AppError> {
        let client = self.pool.get().await?;
        client.batch_execute(sql).await?;
        Ok(())
    }

    async fn list_routines(&self) -> Result<Vec<CatalogEntry>, AppError> {
        let client = self.pool.get().await?;
        let rows = client.query(LIST_ROUTINES, &[]).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let kind: String = row.get("type");
                CatalogEntry {
                    kind: if kind == "FUNCTION" {
                        RoutineKind::Function
                    } else {
                        RoutineKind::Procedure
                    },
                    name: row.get("procedure_function_name"),
                    parameters: row.get("parameters"),
                    return_type: row.get("return_type"),
                }
            })
            .collect())
    }

    async fn query(&self, sql: &str) -> Result<ResultSet, AppError> {
        let client = self.pool.get().await?;
        match client.prepare(sql).await {
            Ok(statement) => {
                let rows = client.query(&statement, &[]).await?;
                result_set(&statement, &rows)
            }
            Err(e) if is_multi_statement(&e) => {
                debug!("Running multi-statement query over the simple protocol");
                let messages = client.simple_query(sql).await?;
                Ok(last_result(messages.into_iter().filter_map(Message::from_simple)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn call_function(&self, name: &str, args: &[CellValue]) -> Result<ResultSet, AppError> {
        self.query(&SqlBuilder::call_function(name, args)).await
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, AppError> {
        let client = self.pool.get().await?;
        client.batch_execute("BEGIN").await?;
        Ok(Box::new(PgTransaction {
            client: Some(client),
        }))
    }
}

/// Transaction pinned to one pooled connection
struct PgTransaction {
    client: Option<Object>,
}

impl PgTransaction {
    fn client(&self) -> Result<&Object, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Internal("transaction already finished".to_string()))
    }

    async fn finish(mut self: Box<Self>, statement: &str) -> Result<(), AppError> {
        let client = self
            .client
            .take()
            .ok_or_else(|| AppError::Internal("transaction already finished".to_string()))?;
        client.batch_execute(statement).await?;
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn call_procedure(&mut self, name: &str, args: &[CellValue]) -> Result<(), AppError> {
        self.client()?
            .batch_execute(&SqlBuilder::call_procedure(name, args))
            .await?;
        Ok(())
    }

    async fn fetch_cursor(&mut self, cursor: &str) -> Result<ResultSet, AppError> {
        let client = self.client()?;
        let statement = client.prepare(&SqlBuilder::fetch_cursor(cursor)).await?;
        let rows = client.query(&statement, &[]).await?;
        result_set(&statement, &rows)
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.finish("ROLLBACK").await
    }
}

/// Hand an abandoned connection to `rollback` on the current runtime, or to
/// `discard` when there is no runtime to run it on
fn abandon<C, Fut>(client: C, rollback: impl FnOnce(C) -> Fut, discard: impl FnOnce(C))
where
    Fut: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(rollback(client));
        }
        Err(_) => {
            discard(client);
            warn!("Transaction dropped outside a runtime; connection detached from the pool");
        }
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        // The connection goes back to the pool only after the rollback ran;
        // otherwise it is detached so no open transaction is reused
        if let Some(client) = self.client.take() {
            abandon(
                client,
                |client| async move {
                    let rolled_back = client.batch_execute("ROLLBACK").await;
                    if let Err(e) = rolled_back {
                        warn!("Rollback of abandoned transaction failed: {}", e);
                        drop(Object::take(client));
                    }
                },
                |client| drop(Object::take(client)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn columns(names: &[&str]) -> Message {
        Message::Columns(names.iter().map(|n| n.to_string()).collect())
    }

    fn row(values: &[Option<&str>]) -> Message {
        Message::Row(values.iter().map(|v| v.map(str::to_string)).collect())
    }

    #[test]
    fn test_script_yields_last_statement_result() {
        let result = last_result(vec![
            columns(&["one"]),
            row(&[Some("1")]),
            Message::Complete,
            columns(&["nickname", "birthday"]),
            row(&[Some("alice"), None]),
            row(&[Some("bob"), Some("2000-01-31")]),
            Message::Complete,
        ]);

        assert_eq!(result.columns, vec!["nickname".to_string(), "birthday".to_string()]);
        assert_eq!(
            result.rows,
            vec![
                vec![CellValue::text("alice"), CellValue::Null],
                vec![CellValue::text("bob"), CellValue::text("2000-01-31")],
            ]
        );
    }

    #[test]
    fn test_script_ending_in_command_has_empty_result() {
        let result = last_result(vec![
            columns(&["n"]),
            row(&[Some("1")]),
            Message::Complete,
            Message::Complete,
        ]);

        assert_eq!(result, ResultSet::default());
    }

    #[test]
    fn test_abandoned_connection_without_runtime_is_discarded() {
        let discarded = Arc::new(AtomicBool::new(false));
        let rolled_back = Arc::new(AtomicBool::new(false));

        let flag = rolled_back.clone();
        abandon(
            discarded.clone(),
            move |_| async move { flag.store(true, Ordering::SeqCst) },
            |client| client.store(true, Ordering::SeqCst),
        );

        assert!(discarded.load(Ordering::SeqCst));
        assert!(!rolled_back.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_abandoned_connection_is_rolled_back_on_runtime() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let discarded = Arc::new(AtomicBool::new(false));

        abandon(
            tx,
            |tx| async move {
                let _ = tx.send("ROLLBACK");
            },
            |_| discarded.store(true, Ordering::SeqCst),
        );

        assert_eq!(rx.await.unwrap(), "ROLLBACK");
        assert!(!discarded.load(Ordering::SeqCst));
    }
}
