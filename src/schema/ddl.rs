//! DDL rendering for the registry
//!
//! Produces the `CREATE TABLE IF NOT EXISTS` statements used at startup so
//! that ownership edges cascade on delete inside the store itself.

use super::{describe, FieldDescriptor, FieldType, KeyPolicy, TableDescriptor, STATUS_CHOICES, TABLES};
use crate::db::queries::SqlBuilder;

/// One statement per table, owners first
pub fn create_statements() -> Vec<String> {
    TABLES.iter().map(|t| create_table(t)).collect()
}

fn create_table(table: &TableDescriptor) -> String {
    let mut defs: Vec<String> = table
        .fields
        .iter()
        .enumerate()
        .map(|(i, field)| column_definition(table, field, i == 0))
        .collect();

    for field in table.fields.iter().filter(|f| f.references.is_some()) {
        if let Some(def) = foreign_key_definition(field) {
            defs.push(def);
        }
    }

    if !table.unique_together.is_empty() {
        let columns: Vec<String> = table
            .unique_together
            .iter()
            .filter_map(|name| table.field_index(name))
            .map(|i| SqlBuilder::quote_ident(table.fields[i].storage_column()))
            .collect();
        defs.push(format!("UNIQUE ({})", columns.join(", ")));
    }

    SqlBuilder::create_table(table.name, &defs.join(", "))
}

fn column_definition(table: &TableDescriptor, field: &FieldDescriptor, is_key: bool) -> String {
    let column = SqlBuilder::quote_ident(field.storage_column());

    if is_key && table.key_policy == KeyPolicy::Synthetic {
        return format!("{} BIGSERIAL PRIMARY KEY", column);
    }

    let mut parts = vec![column.clone(), sql_type(field.field_type)];
    if is_key {
        parts.push("PRIMARY KEY".to_string());
    } else if !field.nullable {
        parts.push("NOT NULL".to_string());
    }

    if let Some(default) = field.default {
        parts.push(format!(
            "DEFAULT {}",
            SqlBuilder::literal(&default.to_cell())
        ));
    }

    if field.field_type == FieldType::Status {
        let choices: Vec<String> = STATUS_CHOICES.iter().map(|c| format!("'{}'", c)).collect();
        parts.push(format!("CHECK ({} IN ({}))", column, choices.join(", ")));
    }

    parts.join(" ")
}

fn foreign_key_definition(field: &FieldDescriptor) -> Option<String> {
    let owner = describe(field.references?).ok()?;
    Some(format!(
        "FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE CASCADE",
        SqlBuilder::quote_ident(field.storage_column()),
        SqlBuilder::quote_ident(owner.name),
        SqlBuilder::quote_ident(owner.primary_key().storage_column()),
    ))
}

fn sql_type(field_type: FieldType) -> String {
    match field_type {
        FieldType::Text { max_length } => format!("VARCHAR({})", max_length),
        FieldType::Integer => "BIGINT".to_string(),
        FieldType::Date => "DATE".to_string(),
        FieldType::Time => "TIME".to_string(),
        FieldType::Status => "VARCHAR(10)".to_string(),
    }
}
