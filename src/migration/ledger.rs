//! SQL text for the applied-migration ledger.

use super::Migration;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;

pub const LEDGER_SCHEMA: &str = "supabase_migrations";
pub const LEDGER_TABLE: &str = "supabase_migrations.schema_migrations";

/// Idempotent DDL creating the ledger; safe on every startup.
pub fn bootstrap_sql() -> String {
    format!(
        "BEGIN;\n\
         CREATE SCHEMA IF NOT EXISTS {schema};\n\
         CREATE TABLE IF NOT EXISTS {table} ();\n\
         ALTER TABLE {table} ADD COLUMN IF NOT EXISTS version text NOT NULL PRIMARY KEY;\n\
         ALTER TABLE {table} ADD COLUMN IF NOT EXISTS statements text[];\n\
         ALTER TABLE {table} ADD COLUMN IF NOT EXISTS name text;\n\
         COMMIT;",
        schema = LEDGER_SCHEMA,
        table = LEDGER_TABLE
    )
}

/// Ledger as a single JSON array (`[]` when empty).
pub fn select_sql() -> String {
    format!(
        "SELECT coalesce(json_agg(row_to_json(t)), '[]') FROM \
         (SELECT version, statements, name FROM {} ORDER BY version) t;",
        LEDGER_TABLE
    )
}

/// One transaction: every pending body followed by its ledger insert.
pub fn batch_sql(pending: &[&Migration]) -> String {
    let mut sql = String::from("BEGIN;\n");
    for m in pending {
        sql.push_str(m.statements.trim_end());
        // a body without a trailing semicolon must not swallow the insert
        if !m.statements.trim_end().ends_with(';') {
            sql.push(';');
        }
        sql.push('\n');
        sql.push_str(&format!(
            "INSERT INTO {} (version, name) VALUES ({}, {});\n",
            LEDGER_TABLE,
            quote_literal(&m.version),
            quote_literal(&m.name)
        ));
    }
    sql.push_str("COMMIT;");
    sql
}

/// SQL string literal with embedded quotes doubled.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LedgerRow {
    pub version: String,
    #[serde(default)]
    pub statements: Option<Vec<String>>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Parse the unaligned, tuples-only output of [`select_sql`].
pub fn parse_rows(output: &str) -> Result<Vec<LedgerRow>> {
    let text = output.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text).map_err(|e| Error::MigrationApply {
        reason: format!("could not read migration ledger: {}", e),
        output: text.to_string(),
    })
}

pub fn applied_versions(rows: &[LedgerRow]) -> HashSet<String> {
    rows.iter().map(|r| r.version.clone()).collect()
}
