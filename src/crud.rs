//! Generic Record CRUD Dispatcher
//!
//! Every operation resolves its table through the registry and then works
//! on positional records, so no table needs code of its own.

use crate::db::store::Store;
use crate::error::AppError;
use crate::export;
use crate::forms::{edit_form, table_form, BoundForm, FormData, FormSpec};
use crate::schema::{describe, fields_of, KeyPolicy, RecordKey, TableDescriptor};
use crate::value::{CellValue, Record};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

const MISSING_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";

/// Every record of a table with its display metadata
#[derive(Debug, Clone, Serialize)]
pub struct TableListing {
    pub table: &'static str,
    pub verbose_name: &'static str,
    pub fields: Vec<&'static str>,
    pub labels: Vec<&'static str>,
    pub records: Vec<Record>,
}

/// A record resolved from a raw URL key
#[derive(Debug, Clone)]
pub struct Resolved {
    pub table: &'static TableDescriptor,
    pub key: RecordKey,
    pub record: Record,
}

pub struct RecordService {
    store: Arc<dyn Store>,
}

impl RecordService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list(&self, table_name: &str) -> Result<TableListing, AppError> {
        let table = describe(table_name)?;
        let fields = fields_of(table_name)?;
        let records = self.store.fetch_all(table).await?;
        debug!("Read {} rows from {}", records.len(), table.name);

        Ok(TableListing {
            table: table.name,
            verbose_name: table.verbose_name,
            fields: fields.iter().map(|f| f.name).collect(),
            labels: fields.iter().map(|f| f.label).collect(),
            records,
        })
    }

    /// Empty create form of a table
    pub fn form(&self, table_name: &str) -> Result<FormSpec, AppError> {
        Ok(table_form(describe(table_name)?))
    }

    pub async fn create(&self, table_name: &str, data: &FormData) -> Result<Record, AppError> {
        let table = describe(table_name)?;
        let record = self.validate(table, &table_form(table), data, None).await?;
        let created = self.store.insert(table, &record).await?;
        info!("Created {} {}", table.name, created.key());
        Ok(created)
    }

    /// Coerce a raw key and load the record it names
    pub async fn resolve(&self, table_name: &str, raw_key: &str) -> Result<Resolved, AppError> {
        let table = describe(table_name)?;
        let key = table.parse_key(raw_key)?;
        let record = self
            .store
            .fetch_one(table, &key)
            .await?
            .ok_or_else(|| AppError::ObjectNotFound(format!("{} {}", table.name, raw_key)))?;
        Ok(Resolved { table, key, record })
    }

    /// Update form pre-populated from the stored record
    pub async fn edit_form(&self, table_name: &str, raw_key: &str) -> Result<FormSpec, AppError> {
        let resolved = self.resolve(table_name, raw_key).await?;
        Ok(edit_form(resolved.table, &resolved.record))
    }

    pub async fn update(&self, table_name: &str, raw_key: &str, data: &FormData) -> Result<Record, AppError> {
        let Resolved { table, key, record } = self.resolve(table_name, raw_key).await?;
        let form = edit_form(table, &record);
        let changed = self.validate(table, &form, data, Some(&key)).await?;

        if !self.store.update(table, &key, &changed).await? {
            return Err(AppError::ObjectNotFound(format!("{} {}", table.name, raw_key)));
        }
        info!("Updated {} {}", table.name, key);
        Ok(changed)
    }

    pub async fn delete(&self, table_name: &str, raw_key: &str) -> Result<(), AppError> {
        let Resolved { table, key, .. } = self.resolve(table_name, raw_key).await?;
        if !self.store.delete(table, &key).await? {
            return Err(AppError::ObjectNotFound(format!("{} {}", table.name, raw_key)));
        }
        info!("Deleted {} {}", table.name, key);
        Ok(())
    }

    /// Remove every row of a table
    pub async fn clear(&self, table_name: &str) -> Result<u64, AppError> {
        let table = describe(table_name)?;
        let removed = self.store.clear(table).await?;
        info!("Cleared {} rows from {}", removed, table.name);
        Ok(removed)
    }

    /// Every row of a table as CSV, headed by the storage columns
    pub async fn export(&self, table_name: &str) -> Result<(&'static str, Vec<u8>), AppError> {
        let table = describe(table_name)?;
        let records = self.store.fetch_all(table).await?;
        let bytes = export::to_csv_bytes(table.csv_header(), &records)?;
        Ok((table.name, bytes))
    }

    /// Bind a submission and run the checks a model form runs: field
    /// cleaning, key uniqueness, owner existence and the table clean rule
    async fn validate(
        &self,
        table: &'static TableDescriptor,
        form: &FormSpec,
        data: &FormData,
        existing: Option<&RecordKey>,
    ) -> Result<Record, AppError> {
        let mut bound = form.bind(data);

        let mut values = Vec::with_capacity(table.fields.len());
        if table.key_policy == KeyPolicy::Synthetic {
            values.push(existing.map_or(CellValue::Null, RecordKey::to_cell));
        }
        values.extend(bound.cleaned().iter().cloned());
        let record = Record(values);

        if table.key_policy == KeyPolicy::Natural {
            self.check_key_is_free(table, &record, existing, &mut bound).await?;
        }
        self.check_owners(table, &record, &mut bound).await?;

        if bound.errors.is_empty() {
            if let Some(clean) = table.clean {
                if let Err(message) = clean(table, &record) {
                    bound.add_error(None, message);
                }
            }
        }

        if bound.is_valid() {
            Ok(record)
        } else {
            debug!("Rejected {} submission: {:?}", table.name, bound.errors);
            Err(AppError::FormValidationFailed(Box::new(bound)))
        }
    }

    async fn check_key_is_free(
        &self,
        table: &'static TableDescriptor,
        record: &Record,
        existing: Option<&RecordKey>,
        bound: &mut BoundForm,
    ) -> Result<(), AppError> {
        let key_field = table.primary_key();
        let Some(key) = RecordKey::from_cell(record.key()) else {
            return Ok(());
        };
        if existing == Some(&key) {
            return Ok(());
        }
        if self.store.fetch_one(table, &key).await?.is_some() {
            bound.add_error(
                Some(key_field.name),
                format!(
                    "{} with this {} already exists.",
                    table.verbose_name, key_field.label
                ),
            );
        }
        Ok(())
    }

    async fn check_owners(
        &self,
        table: &'static TableDescriptor,
        record: &Record,
        bound: &mut BoundForm,
    ) -> Result<(), AppError> {
        for (i, field) in table.fields.iter().enumerate() {
            let Some(owner) = field.references else {
                continue;
            };
            if bound.errors.contains_key(field.name) {
                continue;
            }
            let Some(key) = RecordKey::from_cell(record.get(i)) else {
                continue;
            };
            if self.store.fetch_one(describe(owner)?, &key).await?.is_none() {
                bound.add_error(Some(field.name), MISSING_CHOICE);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use pretty_assertions::assert_eq;

    fn form(pairs: &[(&str, &str)]) -> FormData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn seeded() -> (MemoryStore, RecordService) {
        let store = MemoryStore::new();
        let service = RecordService::new(Arc::new(store.clone()));
        for nickname in ["alice", "bob"] {
            service
                .create("Peers", &form(&[("nickname", nickname), ("birthday", "2000-01-31")]))
                .await
                .unwrap();
        }
        service
            .create(
                "Tasks",
                &form(&[("title", "C2_SimpleBashUtils"), ("parent_task", "0"), ("max_xp", "250")]),
            )
            .await
            .unwrap();
        service
            .create(
                "Checks",
                &form(&[("peer", "alice"), ("task", "C2_SimpleBashUtils"), ("date", "2023-03-01")]),
            )
            .await
            .unwrap();
        (store, service)
    }

    #[tokio::test]
    async fn test_unknown_table_on_every_operation() {
        let service = RecordService::new(Arc::new(MemoryStore::new()));
        let data = FormData::new();
        assert!(matches!(service.list("Nope").await, Err(AppError::UnknownTable(_))));
        assert!(matches!(service.form("Nope"), Err(AppError::UnknownTable(_))));
        assert!(matches!(service.create("Nope", &data).await, Err(AppError::UnknownTable(_))));
        assert!(matches!(service.update("Nope", "1", &data).await, Err(AppError::UnknownTable(_))));
        assert!(matches!(service.delete("Nope", "1").await, Err(AppError::UnknownTable(_))));
        assert!(matches!(service.clear("Nope").await, Err(AppError::UnknownTable(_))));
        assert!(matches!(service.export("Nope").await, Err(AppError::UnknownTable(_))));
    }

    #[tokio::test]
    async fn test_key_resolution_outcomes() {
        let (_, service) = seeded().await;
        assert!(matches!(service.resolve("Checks", "abc").await, Err(AppError::InvalidKeyFormat(_))));
        assert!(matches!(service.resolve("Checks", "999").await, Err(AppError::ObjectNotFound(_))));
        assert!(matches!(service.resolve("Peers", "carol").await, Err(AppError::ObjectNotFound(_))));
        assert_eq!(
            service.resolve("Checks", "1").await.unwrap().record.get(1),
            &CellValue::text("alice")
        );
    }

    #[tokio::test]
    async fn test_create_rejects_missing_owner_without_writing() {
        let (store, service) = seeded().await;
        let result = service
            .create("Friends", &form(&[("peer1", "alice"), ("peer2", "ghost")]))
            .await;

        match result {
            Err(AppError::FormValidationFailed(bound)) => {
                assert_eq!(bound.errors["peer2"], vec![MISSING_CHOICE.to_string()]);
                assert_eq!(bound.data["peer2"], "ghost");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(store.rows("Friends").is_empty());
    }

    #[tokio::test]
    async fn test_create_runs_clean_rule() {
        let (_, service) = seeded().await;
        let result = service
            .create("Tasks", &form(&[("title", "hello"), ("max_xp", "10")]))
            .await;
        match result {
            Err(AppError::FormValidationFailed(bound)) => {
                assert!(bound.errors.is_empty());
                assert_eq!(bound.non_field_errors.len(), 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_natural_key_is_a_field_error() {
        let (_, service) = seeded().await;
        match service.create("Peers", &form(&[("nickname", "alice")])).await {
            Err(AppError::FormValidationFailed(bound)) => {
                assert!(bound.errors.contains_key("nickname"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_keeps_synthetic_id() {
        let (store, service) = seeded().await;
        service
            .update(
                "Checks",
                "1",
                &form(&[("peer", "bob"), ("task", "C2_SimpleBashUtils"), ("date", "2023-03-02")]),
            )
            .await
            .unwrap();

        let rows = store.rows("Checks");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key(), &CellValue::Int(1));
        assert_eq!(rows[0].get(1), &CellValue::text("bob"));
    }

    #[tokio::test]
    async fn test_edit_form_is_prepopulated() {
        let (_, service) = seeded().await;
        let spec = service.edit_form("Checks", "1").await.unwrap();
        assert_eq!(spec.field("peer").unwrap().initial.as_deref(), Some("alice"));
        assert_eq!(spec.field("date").unwrap().initial.as_deref(), Some("2023-03-01"));
    }

    #[tokio::test]
    async fn test_deleting_peer_cascades() {
        let (store, service) = seeded().await;
        let owned: [(&str, &[(&str, &str)]); 9] = [
            ("P2P", &[("check", "1"), ("checking_peer", "bob"), ("state", "Start")]),
            ("Verter", &[("check", "1"), ("state", "Start")]),
            ("XP", &[("check", "1"), ("xp_amount", "200")]),
            ("TransferredPoints", &[("checking_peer", "alice"), ("checked_peer", "bob")]),
            ("TransferredPoints", &[("checking_peer", "bob"), ("checked_peer", "alice")]),
            ("Recommendations", &[("peer", "bob"), ("recommended_peer", "alice")]),
            ("Friends", &[("peer1", "alice"), ("peer2", "bob")]),
            ("TimeTracking", &[("peer", "alice"), ("state", "1")]),
            ("TimeTracking", &[("peer", "bob"), ("state", "1")]),
        ];
        for (table, data) in owned {
            service.create(table, &form(data)).await.unwrap();
        }

        service.delete("Peers", "alice").await.unwrap();

        assert_eq!(store.rows("Peers").len(), 1);
        for table in [
            "Checks",
            "P2P",
            "Verter",
            "XP",
            "TransferredPoints",
            "Recommendations",
            "Friends",
        ] {
            assert!(store.rows(table).is_empty(), "{} kept rows of a deleted peer", table);
        }
        let visits = store.rows("TimeTracking");
        assert_eq!(visits.len(), 1);
        assert_eq!(visits[0].get(1), &CellValue::text("bob"));
        assert_eq!(service.list("Tasks").await.unwrap().records.len(), 1);
        assert!(matches!(service.delete("Peers", "alice").await, Err(AppError::ObjectNotFound(_))));
    }

    #[tokio::test]
    async fn test_clear_cascades_transitively() {
        let (store, service) = seeded().await;
        service
            .create("P2P", &form(&[("check", "1"), ("checking_peer", "bob"), ("state", "Start")]))
            .await
            .unwrap();

        assert_eq!(service.clear("Peers").await.unwrap(), 2);
        assert!(store.rows("Checks").is_empty());
        assert!(store.rows("P2P").is_empty());
    }

    #[tokio::test]
    async fn test_export_peers() {
        let (_, service) = seeded().await;
        let (name, bytes) = service.export("peers").await.unwrap();
        assert_eq!(name, "Peers");
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "Nickname,Birthday\nalice,2000-01-31\nbob,2000-01-31\n"
        );
    }

    #[tokio::test]
    async fn test_export_synthetic_table_header() {
        let (_, service) = seeded().await;
        let (_, bytes) = service.export("Checks").await.unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "ID,Peer,Task,Date\n1,alice,C2_SimpleBashUtils,2023-03-01\n"
        );
    }
}
