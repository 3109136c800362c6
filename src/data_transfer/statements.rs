// =====================================================
// ROW STATEMENTS
// Literal DML rendering for the target table
// =====================================================

use crate::db::dialect::{classify_column, DdlTemplateProvider, ValueKind};
use crate::db::sql_utils::{
    binary_literal, boolean_literal, escape_sql_string, value_to_sql_literal,
};
use crate::db_types::{ColumnDef, DatabaseType, TableIdentifier};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde_json::Value;
use std::sync::Arc;

/// Per-column rendering hint taken from the target column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetColumnHint {
    pub kind: ValueKind,
    pub character: bool,
}

impl TargetColumnHint {
    pub fn from_column(column: &ColumnDef) -> Self {
        let kind = classify_column(column);
        Self {
            kind,
            character: kind == ValueKind::Text && column.is_character(),
        }
    }
}

pub fn format_value_for_target(
    db_type: &DatabaseType,
    value: &Value,
    hint: Option<&TargetColumnHint>,
    trim_char_data: bool,
) -> String {
    if value.is_null() {
        return "NULL".to_string();
    }

    if let Some(h) = hint {
        match h.kind {
            ValueKind::Binary => {
                if let Some(s) = value.as_str() {
                    if let Ok(bytes) = BASE64_STANDARD.decode(s) {
                        return binary_literal(db_type, &bytes);
                    }
                }
            }
            ValueKind::Boolean => {
                if let Some(b) = value.as_bool() {
                    return boolean_literal(db_type, b).to_string();
                }
                if let Some(n) = value.as_i64() {
                    return boolean_literal(db_type, n != 0).to_string();
                }
            }
            ValueKind::Json => {
                if !value.is_string() {
                    let json = escape_sql_string(db_type, &value.to_string());
                    return match db_type {
                        DatabaseType::PostgreSQL => format!("'{}'::json", json),
                        _ => format!("'{}'", json),
                    };
                }
            }
            _ => {}
        }

        if trim_char_data && h.character {
            if let Some(s) = value.as_str() {
                return format!("'{}'", escape_sql_string(db_type, s.trim_end()));
            }
        }
    }

    value_to_sql_literal(db_type, value)
}

/// Renders INSERT/UPDATE/DELETE/upsert statements for one target table.
/// Rows are aligned with `columns`; `key_indexes` point into the same order.
pub struct StatementBuilder {
    db_type: DatabaseType,
    ddl: Arc<dyn DdlTemplateProvider>,
    table_ref: String,
    columns: Vec<String>,
    quoted_columns: Vec<String>,
    hints: Vec<TargetColumnHint>,
    key_indexes: Vec<usize>,
    trim_char_data: bool,
}

impl StatementBuilder {
    pub fn new(
        ddl: Arc<dyn DdlTemplateProvider>,
        table: &TableIdentifier,
        columns: &[ColumnDef],
        key_indexes: Vec<usize>,
        trim_char_data: bool,
    ) -> Self {
        let db_type = ddl.db_type();
        Self {
            db_type,
            table_ref: ddl.qualified_table_name(table),
            columns: columns.iter().map(|c| c.name.clone()).collect(),
            quoted_columns: columns.iter().map(|c| ddl.quote_identifier(&c.name)).collect(),
            hints: columns.iter().map(TargetColumnHint::from_column).collect(),
            key_indexes,
            trim_char_data,
            ddl,
        }
    }

    pub fn table_ref(&self) -> &str {
        &self.table_ref
    }

    pub fn has_keys(&self) -> bool {
        !self.key_indexes.is_empty()
    }

    fn literal(&self, index: usize, value: &Value) -> String {
        format_value_for_target(
            &self.db_type,
            value,
            self.hints.get(index),
            self.trim_char_data,
        )
    }

    fn value_list(&self, row: &[Value]) -> String {
        row.iter()
            .enumerate()
            .map(|(index, value)| self.literal(index, value))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `a = 1 AND b IS NULL` over the key columns of `row`.
    pub fn key_predicate(&self, row: &[Value]) -> Result<String, String> {
        if self.key_indexes.is_empty() {
            return Err("Cannot build WHERE clause without key columns".to_string());
        }

        let mut predicates = Vec::with_capacity(self.key_indexes.len());
        for &index in &self.key_indexes {
            let quoted = self
                .quoted_columns
                .get(index)
                .ok_or_else(|| format!("Key column index {} out of range", index))?;
            let value = row.get(index).cloned().unwrap_or(Value::Null);
            if value.is_null() {
                predicates.push(format!("{} IS NULL", quoted));
            } else {
                predicates.push(format!("{} = {}", quoted, self.literal(index, &value)));
            }
        }
        Ok(predicates.join(" AND "))
    }

    pub fn insert(&self, row: &[Value]) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table_ref,
            self.quoted_columns.join(", "),
            self.value_list(row)
        )
    }

    pub fn update(&self, row: &[Value]) -> Result<String, String> {
        let mut assigned = (0..self.columns.len())
            .filter(|index| !self.key_indexes.contains(index))
            .collect::<Vec<_>>();
        // Key-only tables still need a statement that reports whether the row matched.
        if assigned.is_empty() {
            assigned = self.key_indexes.clone();
        }

        let assignments = assigned
            .into_iter()
            .map(|index| {
                let value = row.get(index).cloned().unwrap_or(Value::Null);
                format!("{} = {}", self.quoted_columns[index], self.literal(index, &value))
            })
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!(
            "UPDATE {} SET {} WHERE {}",
            self.table_ref,
            assignments,
            self.key_predicate(row)?
        ))
    }

    pub fn delete_by_key(&self, row: &[Value]) -> Result<String, String> {
        Ok(format!(
            "DELETE FROM {} WHERE {}",
            self.table_ref,
            self.key_predicate(row)?
        ))
    }

    pub fn upsert(&self, row: &[Value]) -> Result<String, String> {
        if self.key_indexes.is_empty() {
            return Err("Cannot build upsert statement without key columns".to_string());
        }
        let keys = self
            .key_indexes
            .iter()
            .map(|&index| self.columns[index].clone())
            .collect::<Vec<_>>();
        Ok(format!(
            "{} {}",
            self.insert(row),
            self.ddl.render_upsert_clause(&self.columns, &keys)
        ))
    }

    /// One DELETE matching any of the given key tuples.
    pub fn delete_by_keys(&self, key_rows: &[Vec<Value>]) -> Result<Option<String>, String> {
        if key_rows.is_empty() {
            return Ok(None);
        }
        let predicates = key_rows
            .iter()
            .map(|row| self.key_predicate(row).map(|p| format!("({})", p)))
            .collect::<Result<Vec<_>, String>>()?;
        Ok(Some(format!(
            "DELETE FROM {} WHERE {}",
            self.table_ref,
            predicates.join(" OR ")
        )))
    }
}

#[cfg(test)]
mod tests;
