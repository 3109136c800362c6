// =====================================================
// COMMON DATABASE TYPES AND STRUCTURES
// =====================================================

use serde::{Deserialize, Serialize};

// --- Database Type Enum ---
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[default]
    SQLite,
    PostgreSQL,
    MySQL,
}

impl DatabaseType {
    pub fn label(&self) -> &'static str {
        match self {
            DatabaseType::SQLite => "sqlite",
            DatabaseType::PostgreSQL => "postgresql",
            DatabaseType::MySQL => "mysql",
        }
    }
}

// --- Identifier Comparison ---
/// How column and table names are compared when matching source and target.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaseFolding {
    #[default]
    Insensitive,
    Sensitive,
}

impl CaseFolding {
    /// Canonical token used as lookup key. ASCII folding only, so the
    /// result never depends on the process locale.
    pub fn canonical(&self, name: &str) -> String {
        match self {
            CaseFolding::Insensitive => name.trim().to_ascii_lowercase(),
            CaseFolding::Sensitive => name.trim().to_string(),
        }
    }

    pub fn matches(&self, left: &str, right: &str) -> bool {
        self.canonical(left) == self.canonical(right)
    }
}

// --- Table Identifier ---
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TableIdentifier {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub table: String,
}

impl TableIdentifier {
    pub fn new(table: &str) -> Self {
        Self {
            catalog: None,
            schema: None,
            table: table.trim().to_string(),
        }
    }

    pub fn with_schema(schema: &str, table: &str) -> Self {
        Self {
            catalog: None,
            schema: Some(schema.trim().to_string()).filter(|value| !value.is_empty()),
            table: table.trim().to_string(),
        }
    }

    /// Parses `table`, `schema.table` or `catalog.schema.table`. Parts may be
    /// wrapped in double quotes, in which case dots inside them are kept.
    pub fn parse(value: &str) -> Result<Self, String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err("Table name is required".to_string());
        }

        let mut parts = Vec::new();
        let mut current = String::new();
        let mut in_quotes = false;
        let mut chars = trimmed.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '"' if in_quotes && chars.peek() == Some(&'"') => {
                    current.push('"');
                    chars.next();
                }
                '"' => in_quotes = !in_quotes,
                '.' if !in_quotes => {
                    parts.push(std::mem::take(&mut current));
                }
                other => current.push(other),
            }
        }

        if in_quotes {
            return Err(format!("Unterminated quoted identifier in '{}'", trimmed));
        }
        parts.push(current);

        if parts.iter().any(|part| part.trim().is_empty()) {
            return Err(format!("Invalid table name '{}'", trimmed));
        }

        let collected = parts
            .into_iter()
            .map(|part| part.trim().to_string())
            .collect::<Vec<_>>();
        match collected.as_slice() {
            [table] => Ok(Self::new(table)),
            [schema, table] => Ok(Self::with_schema(schema, table)),
            [catalog, schema, table] => Ok(Self {
                catalog: Some(catalog.clone()),
                schema: Some(schema.clone()),
                table: table.clone(),
            }),
            _ => Err(format!(
                "Table name '{}' has too many parts; expected at most catalog.schema.table",
                trimmed
            )),
        }
    }

    /// Unquoted dotted form, used in messages and logs.
    pub fn display_name(&self) -> String {
        [self.catalog.as_deref(), self.schema.as_deref(), Some(self.table.as_str())]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn same_table(&self, other: &TableIdentifier, folding: CaseFolding) -> bool {
        let optional_matches = |left: &Option<String>, right: &Option<String>| match (left, right) {
            (Some(l), Some(r)) => folding.matches(l, r),
            _ => true,
        };
        folding.matches(&self.table, &other.table)
            && optional_matches(&self.schema, &other.schema)
            && optional_matches(&self.catalog, &other.catalog)
    }
}

impl std::fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_name())
    }
}

// --- Column Definition ---
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
    pub size: Option<u32>,
    pub scale: Option<u32>,
    pub nullable: bool,
    pub primary_key: bool,
    pub default_value: Option<String>,
    /// 1-based ordinal position in the owning table or query.
    pub position: usize,
}

impl ColumnDef {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            ..Default::default()
        }
    }

    pub fn with_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    pub fn with_primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        if primary_key {
            self.nullable = false;
        }
        self
    }

    pub fn with_size(mut self, size: Option<u32>, scale: Option<u32>) -> Self {
        self.size = size;
        self.scale = scale;
        self
    }

    pub fn is_character(&self) -> bool {
        let data_type = self.data_type.to_ascii_lowercase();
        data_type.contains("char") || data_type.contains("text") || data_type.contains("clob")
    }
}

// --- Table Spec ---
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TableSpec {
    pub identifier: TableIdentifier,
    pub columns: Vec<ColumnDef>,
}

impl TableSpec {
    pub fn new(identifier: TableIdentifier, columns: Vec<ColumnDef>) -> Self {
        Self { identifier, columns }
    }

    pub fn find_column(&self, name: &str, folding: CaseFolding) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|column| folding.matches(&column.name, name))
    }

    pub fn primary_key_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|column| column.primary_key)
            .map(|column| column.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests;
