// =====================================================
// DIALECT MODULE
// Vendor-specific DDL templates and type translation
// =====================================================

use crate::db::sql_utils::{escape_sql_string, qualified_table_name, quote_identifier};
use crate::db_types::{ColumnDef, DatabaseType, TableIdentifier, TableSpec};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CreateTableType {
    #[default]
    Default,
    Temporary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueKind {
    #[default]
    Text,
    Json,
    Binary,
    Boolean,
    Integer,
    Float,
    Decimal,
    Date,
    Time,
    Timestamp,
}

pub fn classify_column(column: &ColumnDef) -> ValueKind {
    let data_type = column.data_type.trim().to_ascii_lowercase();

    if data_type.contains("json") {
        return ValueKind::Json;
    }
    if data_type.contains("blob")
        || data_type.contains("binary")
        || data_type == "bytea"
        || data_type.contains("image")
    {
        return ValueKind::Binary;
    }
    if data_type.starts_with("bool") || data_type == "bit" || data_type == "tinyint(1)" {
        return ValueKind::Boolean;
    }
    if (data_type.contains("int") && !data_type.contains("interval") && !data_type.contains("point"))
        || data_type.contains("serial")
    {
        return ValueKind::Integer;
    }
    if data_type.contains("double") || data_type.contains("float") || data_type == "real" {
        return ValueKind::Float;
    }
    if data_type.contains("numeric") || data_type.contains("decimal") || data_type == "money" {
        return ValueKind::Decimal;
    }
    if data_type.contains("timestamp") || data_type.contains("datetime") {
        return ValueKind::Timestamp;
    }
    if data_type.starts_with("date") {
        return ValueKind::Date;
    }
    if data_type.starts_with("time") {
        return ValueKind::Time;
    }
    ValueKind::Text
}

fn is_identity_column(column: &ColumnDef) -> bool {
    let data_type = column.data_type.to_ascii_lowercase();
    let default_value = column
        .default_value
        .as_deref()
        .unwrap_or_default()
        .to_ascii_lowercase();
    data_type.contains("serial") || default_value.contains("nextval(")
}

/// Renders the vendor-specific DDL the copy engine needs for its target.
pub trait DdlTemplateProvider: Send + Sync {
    fn db_type(&self) -> DatabaseType;

    fn quote_identifier(&self, name: &str) -> String {
        quote_identifier(&self.db_type(), name)
    }

    fn qualified_table_name(&self, table: &TableIdentifier) -> String {
        qualified_table_name(&self.db_type(), table)
    }

    /// Case an unquoted identifier takes when the vendor stores it.
    fn fold_identifier_case(&self, name: &str) -> String;

    fn render_column_type(&self, column: &ColumnDef, source_db: DatabaseType) -> String;

    fn render_create_table(
        &self,
        spec: &TableSpec,
        create_type: CreateTableType,
        source_db: DatabaseType,
    ) -> String;

    fn render_drop_table(&self, table: &TableIdentifier, cascade: bool) -> String;

    fn render_truncate_table(&self, table: &TableIdentifier) -> String;

    /// Statement that moves an identity sequence past the copied rows, if
    /// the vendor does not do that on its own.
    fn render_sequence_adjustment(
        &self,
        table: &TableIdentifier,
        column: &ColumnDef,
    ) -> Option<String>;

    /// Conflict clause appended to an INSERT to turn it into an upsert.
    /// Column names are unquoted.
    fn render_upsert_clause(&self, columns: &[String], key_columns: &[String]) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlDialect {
    db_type: DatabaseType,
}

impl SqlDialect {
    pub fn new(db_type: DatabaseType) -> Self {
        Self { db_type }
    }

    fn sized(base: &str, size: Option<u32>, scale: Option<u32>) -> String {
        match (size, scale) {
            (Some(size), Some(scale)) if size > 0 => format!("{}({},{})", base, size, scale),
            (Some(size), None) if size > 0 => format!("{}({})", base, size),
            _ => base.to_string(),
        }
    }

    fn translate_type(&self, column: &ColumnDef) -> String {
        let declared = column.data_type.to_ascii_lowercase();
        match (classify_column(column), self.db_type) {
            (ValueKind::Integer, DatabaseType::SQLite) => "INTEGER".to_string(),
            (ValueKind::Integer, _) if declared.contains("big") => "BIGINT".to_string(),
            (ValueKind::Integer, _) if declared.contains("small") => "SMALLINT".to_string(),
            (ValueKind::Integer, _) => "INTEGER".to_string(),
            (ValueKind::Float, DatabaseType::PostgreSQL) => "DOUBLE PRECISION".to_string(),
            (ValueKind::Float, DatabaseType::MySQL) => "DOUBLE".to_string(),
            (ValueKind::Float, DatabaseType::SQLite) => "REAL".to_string(),
            (ValueKind::Decimal, DatabaseType::MySQL) => {
                Self::sized("DECIMAL", column.size, column.scale)
            }
            (ValueKind::Decimal, _) => Self::sized("NUMERIC", column.size, column.scale),
            (ValueKind::Boolean, DatabaseType::MySQL) => "TINYINT(1)".to_string(),
            (ValueKind::Boolean, _) => "BOOLEAN".to_string(),
            (ValueKind::Date, _) => "DATE".to_string(),
            (ValueKind::Time, _) => "TIME".to_string(),
            (ValueKind::Timestamp, DatabaseType::MySQL) => "DATETIME".to_string(),
            (ValueKind::Timestamp, _) => "TIMESTAMP".to_string(),
            (ValueKind::Binary, DatabaseType::PostgreSQL) => "BYTEA".to_string(),
            (ValueKind::Binary, DatabaseType::MySQL) => "LONGBLOB".to_string(),
            (ValueKind::Binary, DatabaseType::SQLite) => "BLOB".to_string(),
            (ValueKind::Json, DatabaseType::SQLite) => "TEXT".to_string(),
            (ValueKind::Json, _) => "JSON".to_string(),
            (ValueKind::Text, _) if declared.contains("char") && column.size.is_some() => {
                Self::sized("VARCHAR", column.size, None)
            }
            (ValueKind::Text, _) => "TEXT".to_string(),
        }
    }
}

pub fn dialect_for(db_type: DatabaseType) -> SqlDialect {
    SqlDialect::new(db_type)
}

impl DdlTemplateProvider for SqlDialect {
    fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    fn fold_identifier_case(&self, name: &str) -> String {
        match self.db_type {
            DatabaseType::PostgreSQL => name.to_ascii_lowercase(),
            DatabaseType::MySQL | DatabaseType::SQLite => name.to_string(),
        }
    }

    fn render_column_type(&self, column: &ColumnDef, source_db: DatabaseType) -> String {
        if source_db == self.db_type {
            if column.data_type.contains('(') {
                return column.data_type.clone();
            }
            let kind = classify_column(column);
            let carries_size = matches!(kind, ValueKind::Decimal)
                || (matches!(kind, ValueKind::Text) && column.is_character());
            if carries_size {
                return Self::sized(&column.data_type, column.size, column.scale);
            }
            return column.data_type.clone();
        }
        self.translate_type(column)
    }

    fn render_create_table(
        &self,
        spec: &TableSpec,
        create_type: CreateTableType,
        source_db: DatabaseType,
    ) -> String {
        let keyword = match (create_type, self.db_type) {
            (CreateTableType::Default, _) => "CREATE TABLE",
            (CreateTableType::Temporary, DatabaseType::SQLite) => "CREATE TEMP TABLE",
            (CreateTableType::Temporary, _) => "CREATE TEMPORARY TABLE",
        };

        let mut definitions = spec
            .columns
            .iter()
            .map(|column| {
                let mut line = format!(
                    "  {} {}",
                    self.quote_identifier(&column.name),
                    self.render_column_type(column, source_db)
                );
                if !column.nullable {
                    line.push_str(" NOT NULL");
                }
                // Defaults are vendor expressions; only same-vendor copies keep them.
                if source_db == self.db_type && !is_identity_column(column) {
                    if let Some(default_value) = column.default_value.as_deref() {
                        line.push_str(" DEFAULT ");
                        line.push_str(default_value);
                    }
                }
                line
            })
            .collect::<Vec<_>>();

        let primary_keys = spec
            .columns
            .iter()
            .filter(|column| column.primary_key)
            .map(|column| self.quote_identifier(&column.name))
            .collect::<Vec<_>>();
        if !primary_keys.is_empty() {
            definitions.push(format!("  PRIMARY KEY ({})", primary_keys.join(", ")));
        }

        format!(
            "{} {} (\n{}\n)",
            keyword,
            self.qualified_table_name(&spec.identifier),
            definitions.join(",\n")
        )
    }

    fn render_drop_table(&self, table: &TableIdentifier, cascade: bool) -> String {
        let base = format!("DROP TABLE {}", self.qualified_table_name(table));
        match self.db_type {
            DatabaseType::PostgreSQL | DatabaseType::MySQL if cascade => {
                format!("{} CASCADE", base)
            }
            _ => base,
        }
    }

    fn render_truncate_table(&self, table: &TableIdentifier) -> String {
        match self.db_type {
            DatabaseType::SQLite => format!("DELETE FROM {}", self.qualified_table_name(table)),
            DatabaseType::PostgreSQL | DatabaseType::MySQL => {
                format!("TRUNCATE TABLE {}", self.qualified_table_name(table))
            }
        }
    }

    fn render_sequence_adjustment(
        &self,
        table: &TableIdentifier,
        column: &ColumnDef,
    ) -> Option<String> {
        if self.db_type != DatabaseType::PostgreSQL || !is_identity_column(column) {
            return None;
        }
        let table_ref = self.qualified_table_name(table);
        let quoted_column = self.quote_identifier(&column.name);
        Some(format!(
            "SELECT setval(pg_get_serial_sequence('{}', '{}'), COALESCE((SELECT MAX({}) FROM {}), 1))",
            escape_sql_string(&self.db_type, &table_ref),
            escape_sql_string(&self.db_type, &column.name),
            quoted_column,
            table_ref
        ))
    }

    fn render_upsert_clause(&self, columns: &[String], key_columns: &[String]) -> String {
        let is_key = |column: &String| {
            key_columns
                .iter()
                .any(|key| key.eq_ignore_ascii_case(column))
        };

        match self.db_type {
            DatabaseType::MySQL => {
                let mut targets = columns.iter().filter(|c| !is_key(c)).collect::<Vec<_>>();
                if targets.is_empty() {
                    targets = columns.iter().collect();
                }
                let updates = targets
                    .into_iter()
                    .map(|c| {
                        let quoted = self.quote_identifier(c);
                        format!("{} = VALUES({})", quoted, quoted)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("ON DUPLICATE KEY UPDATE {}", updates)
            }
            DatabaseType::PostgreSQL | DatabaseType::SQLite => {
                let keys = key_columns
                    .iter()
                    .map(|c| self.quote_identifier(c))
                    .collect::<Vec<_>>()
                    .join(", ");
                let updates = columns
                    .iter()
                    .filter(|c| !is_key(c))
                    .map(|c| {
                        let quoted = self.quote_identifier(c);
                        format!("{} = EXCLUDED.{}", quoted, quoted)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                if updates.is_empty() {
                    format!("ON CONFLICT ({}) DO NOTHING", keys)
                } else {
                    format!("ON CONFLICT ({}) DO UPDATE SET {}", keys, updates)
                }
            }
        }
    }
}
