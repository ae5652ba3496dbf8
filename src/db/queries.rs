//! SQL query constants and builders
//!
//! Contains all SQL queries used by the application.

use crate::schema::{KeyPolicy, TableDescriptor};
use crate::value::CellValue;

/// List stored functions and procedures of the public schema.
///
/// Anything without a reported result type is a procedure; trigger
/// functions are left out.
pub const LIST_ROUTINES: &str = r#"
    SELECT
        CASE
            WHEN pg_get_function_result(p.oid) IS NULL THEN 'PROCEDURE'
            ELSE 'FUNCTION'
        END AS type,
        p.proname::text AS procedure_function_name,
        pg_get_function_identity_arguments(p.oid) AS parameters,
        pg_get_function_result(p.oid) AS return_type
    FROM pg_proc p
    LEFT JOIN pg_namespace n ON p.pronamespace = n.oid
    WHERE n.nspname = 'public'
        AND (
            pg_get_function_result(p.oid) != 'trigger'
            OR pg_get_function_result(p.oid) IS NULL
        )
    ORDER BY p.proname
"#;

/// Name of the cursor procedures write their result set into
pub const PROCEDURE_CURSOR: &str = "procedure_result";

/// SQL builder for safe identifier quoting
pub struct SqlBuilder;

impl SqlBuilder {
    /// Quote an identifier (table/column name) safely
    pub fn quote_ident(ident: &str) -> String {
        // PostgreSQL identifier quoting
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Render a value as an SQL literal; untyped strings are coerced by the
    /// server to whatever the routine parameter expects
    pub fn literal(value: &CellValue) -> String {
        match value {
            CellValue::Null => "NULL".to_string(),
            CellValue::Bool(v) => if *v { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::Int(v) => v.to_string(),
            CellValue::Float(v) => v.to_string(),
            CellValue::Decimal(v) => v.to_string(),
            other => format!("'{}'", other.to_string().replace('\'', "''")),
        }
    }

    /// Build CREATE TABLE query
    pub fn create_table(name: &str, column_defs: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            Self::quote_ident(name),
            column_defs
        )
    }

    /// Comma-separated stored columns in field order
    pub fn column_list(table: &TableDescriptor) -> String {
        table
            .fields
            .iter()
            .map(|f| Self::quote_ident(f.storage_column()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn key_column(table: &TableDescriptor) -> String {
        Self::quote_ident(table.primary_key().storage_column())
    }

    /// Build SELECT of every row, ordered by key
    pub fn select_all(table: &TableDescriptor) -> String {
        format!(
            "SELECT {} FROM {} ORDER BY {}",
            Self::column_list(table),
            Self::quote_ident(table.name),
            Self::key_column(table)
        )
    }

    /// Build SELECT of one row by key ($1)
    pub fn select_by_key(table: &TableDescriptor) -> String {
        format!(
            "SELECT {} FROM {} WHERE {} = $1",
            Self::column_list(table),
            Self::quote_ident(table.name),
            Self::key_column(table)
        )
    }

    /// Build INSERT for the given columns, optionally ignoring key conflicts
    pub fn insert(table: &TableDescriptor, columns: &[&str], ignore_existing: bool) -> String {
        let names: Vec<String> = columns.iter().map(|c| Self::quote_ident(c)).collect();
        let params: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            Self::quote_ident(table.name),
            names.join(", "),
            params.join(", ")
        );
        if ignore_existing {
            sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", Self::key_column(table)));
        }
        sql
    }

    /// Build UPDATE of every stored column except a synthetic id; the key is
    /// the last parameter
    pub fn update(table: &TableDescriptor) -> (String, Vec<usize>) {
        let skip = usize::from(table.key_policy == KeyPolicy::Synthetic);
        let indexes: Vec<usize> = (skip..table.fields.len()).collect();
        let assignments: Vec<String> = indexes
            .iter()
            .enumerate()
            .map(|(n, &i)| {
                format!(
                    "{} = ${}",
                    Self::quote_ident(table.fields[i].storage_column()),
                    n + 1
                )
            })
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ${}",
            Self::quote_ident(table.name),
            assignments.join(", "),
            Self::key_column(table),
            indexes.len() + 1
        );
        (sql, indexes)
    }

    /// Build DELETE of one row by key ($1)
    pub fn delete(table: &TableDescriptor) -> String {
        format!(
            "DELETE FROM {} WHERE {} = $1",
            Self::quote_ident(table.name),
            Self::key_column(table)
        )
    }

    /// Build DELETE of every row
    pub fn clear(table: &TableDescriptor) -> String {
        format!("DELETE FROM {}", Self::quote_ident(table.name))
    }

    /// Move the id sequence past the largest stored id
    pub fn sync_sequence(table: &TableDescriptor) -> String {
        let name = Self::quote_ident(table.name);
        format!(
            "SELECT setval(pg_get_serial_sequence('{}', 'id'), COALESCE(MAX(\"id\"), 1), MAX(\"id\") IS NOT NULL) FROM {}",
            name.replace('\'', "''"),
            name
        )
    }

    fn argument_list(args: &[CellValue]) -> String {
        args.iter().map(Self::literal).collect::<Vec<_>>().join(", ")
    }

    /// Build CALL of a procedure
    pub fn call_procedure(name: &str, args: &[CellValue]) -> String {
        format!("CALL {}({})", Self::quote_ident(name), Self::argument_list(args))
    }

    /// Build SELECT over a set-returning or scalar function
    pub fn call_function(name: &str, args: &[CellValue]) -> String {
        format!(
            "SELECT * FROM {}({})",
            Self::quote_ident(name),
            Self::argument_list(args)
        )
    }

    /// Build FETCH of everything left in a named cursor
    pub fn fetch_cursor(cursor: &str) -> String {
        format!("FETCH ALL FROM {}", Self::quote_ident(cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::describe;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_quote_ident() {
        assert_eq!(SqlBuilder::quote_ident("Peers"), "\"Peers\"");
        assert_eq!(SqlBuilder::quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_literal_escaping() {
        assert_eq!(SqlBuilder::literal(&CellValue::text("O'Brien")), "'O''Brien'");
        assert_eq!(SqlBuilder::literal(&CellValue::Int(7)), "7");
        assert_eq!(SqlBuilder::literal(&CellValue::Null), "NULL");
    }

    #[test]
    fn test_procedure_call_appends_nothing_itself() {
        let args = vec![
            CellValue::text("alice"),
            CellValue::Int(3),
            CellValue::text(PROCEDURE_CURSOR),
        ];
        assert_eq!(
            SqlBuilder::call_procedure("prc_peer_points", &args),
            "CALL \"prc_peer_points\"('alice', 3, 'procedure_result')"
        );
        assert_eq!(
            SqlBuilder::call_function("fnc_xp", &[]),
            "SELECT * FROM \"fnc_xp\"()"
        );
    }

    #[test]
    fn test_insert_and_update() {
        let peers = describe("Peers").unwrap();
        assert_eq!(
            SqlBuilder::insert(peers, &["Nickname", "Birthday"], true),
            "INSERT INTO \"Peers\" (\"Nickname\", \"Birthday\") VALUES ($1, $2) ON CONFLICT (\"Nickname\") DO NOTHING"
        );

        let xp = describe("XP").unwrap();
        let (sql, indexes) = SqlBuilder::update(xp);
        assert_eq!(
            sql,
            "UPDATE \"XP\" SET \"Check\" = $1, \"XPAmount\" = $2 WHERE \"id\" = $3"
        );
        assert_eq!(indexes, vec![1, 2]);
    }
}
