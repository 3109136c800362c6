// =====================================================
// SQL UTILITIES MODULE
// Identifier quoting and literal rendering per vendor
// =====================================================

use crate::db_types::{DatabaseType, TableIdentifier};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static PLAIN_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").unwrap());

pub fn quote_identifier_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub fn quote_identifier_ansi(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn quote_identifier(db_type: &DatabaseType, name: &str) -> String {
    match db_type {
        DatabaseType::MySQL => quote_identifier_mysql(name),
        DatabaseType::PostgreSQL | DatabaseType::SQLite => quote_identifier_ansi(name),
    }
}

/// True when the name can be written unquoted on any supported vendor.
pub fn is_plain_identifier(name: &str) -> bool {
    PLAIN_IDENTIFIER.is_match(name)
}

pub fn qualified_table_name(db_type: &DatabaseType, table: &TableIdentifier) -> String {
    let mut parts = Vec::with_capacity(3);
    if let Some(catalog) = table.catalog.as_deref() {
        // SQLite and PostgreSQL address a single catalog per connection.
        if matches!(db_type, DatabaseType::MySQL) && table.schema.is_none() {
            parts.push(quote_identifier(db_type, catalog));
        }
    }
    if let Some(schema) = table.schema.as_deref() {
        parts.push(quote_identifier(db_type, schema));
    }
    parts.push(quote_identifier(db_type, &table.table));
    parts.join(".")
}

pub fn escape_sql_string(db_type: &DatabaseType, value: &str) -> String {
    match db_type {
        DatabaseType::MySQL => value.replace('\\', "\\\\").replace('\'', "''"),
        DatabaseType::PostgreSQL | DatabaseType::SQLite => value.replace('\'', "''"),
    }
}

pub fn boolean_literal(db_type: &DatabaseType, value: bool) -> &'static str {
    match db_type {
        DatabaseType::PostgreSQL => {
            if value {
                "TRUE"
            } else {
                "FALSE"
            }
        }
        DatabaseType::MySQL | DatabaseType::SQLite => {
            if value {
                "1"
            } else {
                "0"
            }
        }
    }
}

pub fn binary_literal(db_type: &DatabaseType, bytes: &[u8]) -> String {
    match db_type {
        DatabaseType::MySQL => format!("0x{}", hex::encode(bytes)),
        DatabaseType::PostgreSQL => format!("'\\x{}'::bytea", hex::encode(bytes)),
        DatabaseType::SQLite => format!("X'{}'", hex::encode(bytes)),
    }
}

pub fn value_to_sql_literal(db_type: &DatabaseType, value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(v) => boolean_literal(db_type, *v).to_string(),
        Value::Number(num) => num.to_string(),
        Value::String(s) => format!("'{}'", escape_sql_string(db_type, s)),
        other => format!("'{}'", escape_sql_string(db_type, &other.to_string())),
    }
}

pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
