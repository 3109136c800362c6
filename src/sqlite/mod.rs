// =====================================================
// SQLITE SPECIFIC DATABASE OPERATIONS
// Reference adapter for the copy engine
// =====================================================

use crate::db::connection::{Catalog, Connection, CursorRow, RowCursor, Savepoint};
use crate::db::dialect::{dialect_for, DdlTemplateProvider};
use crate::db::sql_utils::quote_identifier_ansi;
use crate::db_types::{CaseFolding, ColumnDef, DatabaseType, TableIdentifier};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Column, ConnectOptions, Executor, Row, SqliteConnection, Statement, TypeInfo, ValueRef};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

const CURSOR_CHANNEL_CAPACITY: usize = 256;

struct SqliteSession {
    conn: SqliteConnection,
    in_transaction: bool,
}

impl SqliteSession {
    async fn ensure_transaction(&mut self) -> Result<(), String> {
        if self.in_transaction {
            return Ok(());
        }
        sqlx::query("BEGIN")
            .execute(&mut self.conn)
            .await
            .map_err(|e| format!("Failed to begin transaction: {}", e))?;
        self.in_transaction = true;
        Ok(())
    }

    async fn finish_transaction(&mut self, statement: &str) -> Result<(), String> {
        if !self.in_transaction {
            return Ok(());
        }
        let result = sqlx::query(statement).execute(&mut self.conn).await;
        self.in_transaction = false;
        result
            .map(|_| ())
            .map_err(|e| format!("Failed to {}: {}", statement.to_ascii_lowercase(), e))
    }
}

/// One dedicated SQLite connection with auto-commit off.
///
/// Writes open an implicit transaction that stays open until `commit` or
/// `rollback`. An open cursor holds the connection until it is drained or
/// dropped, so a copy needs distinct databases for its source and target.
pub struct SqliteDatabase {
    session: Arc<Mutex<SqliteSession>>,
    savepoint_seq: AtomicU64,
}

fn build_connect_options(url: &str) -> Result<SqliteConnectOptions, String> {
    if url.trim().is_empty() {
        return Err("Database file path is required".to_string());
    }

    let options = if url.starts_with("sqlite:") {
        SqliteConnectOptions::from_str(url)
            .map_err(|e| format!("Invalid SQLite connection string: {}", e))?
    } else {
        SqliteConnectOptions::new().filename(url)
    };

    Ok(options
        .create_if_missing(true)
        .log_statements(log::LevelFilter::Debug))
}

impl SqliteDatabase {
    /// Opens a database from a `sqlite:` URL or a plain file path.
    pub async fn connect(url: &str) -> Result<Self, String> {
        let options = build_connect_options(url)?;
        let conn = options
            .connect()
            .await
            .map_err(|e| format!("Failed to connect to SQLite database: {}", e))?;

        Ok(Self {
            session: Arc::new(Mutex::new(SqliteSession {
                conn,
                in_transaction: false,
            })),
            savepoint_seq: AtomicU64::new(0),
        })
    }

    /// Private in-memory database; each call yields an independent one.
    pub async fn connect_in_memory() -> Result<Self, String> {
        Self::connect("sqlite::memory:").await
    }

    /// Runs a multi-statement script outside the copy transaction model.
    pub async fn execute_script(&self, script: &str) -> Result<(), String> {
        let mut session = self.session.lock().await;
        sqlx::raw_sql(script)
            .execute(&mut session.conn)
            .await
            .map_err(|e| format!("Failed to execute script: {}", e))?;
        Ok(())
    }

    pub async fn in_transaction(&self) -> bool {
        self.session.lock().await.in_transaction
    }

    fn next_savepoint_name(&self) -> String {
        let seq = self.savepoint_seq.fetch_add(1, Ordering::Relaxed) + 1;
        format!("sp_{}", seq)
    }

    async fn table_exists_in(
        &self,
        master_table: &str,
        table: &str,
    ) -> Result<Option<String>, String> {
        let sql = format!(
            "SELECT name FROM {} WHERE type IN ('table', 'view') AND name = ?1 COLLATE NOCASE \
             ORDER BY CASE WHEN name = ?1 THEN 0 ELSE 1 END LIMIT 1",
            master_table
        );
        let mut session = self.session.lock().await;
        let row = sqlx::query(&sql)
            .bind(table)
            .fetch_optional(&mut session.conn)
            .await
            .map_err(|e| format!("Failed to look up table: {}", e))?;

        Ok(row.and_then(|r| r.try_get::<String, _>("name").ok()))
    }
}

// --- Value Decoding ---

fn decode_column(row: &SqliteRow, index: usize) -> Value {
    let Ok(raw) = row.try_get_raw(index) else {
        return Value::Null;
    };
    if raw.is_null() {
        return Value::Null;
    }
    let storage_class = raw.type_info().name().to_ascii_uppercase();

    match storage_class.as_str() {
        "INTEGER" => {
            if let Ok(v) = row.try_get_unchecked::<i64, _>(index) {
                return serde_json::json!(v);
            }
        }
        "REAL" => {
            if let Ok(v) = row.try_get_unchecked::<f64, _>(index) {
                return serde_json::Number::from_f64(v)
                    .map(Value::Number)
                    .unwrap_or(Value::Null);
            }
        }
        "BLOB" => {
            if let Ok(v) = row.try_get_unchecked::<Vec<u8>, _>(index) {
                return Value::String(base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    &v,
                ));
            }
        }
        _ => {}
    }

    if let Ok(v) = row.try_get_unchecked::<String, _>(index) {
        Value::String(v)
    } else if let Ok(v) = row.try_get::<i64, _>(index) {
        serde_json::json!(v)
    } else if let Ok(v) = row.try_get::<f64, _>(index) {
        serde_json::json!(v)
    } else if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        Value::String(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            &v,
        ))
    } else if let Ok(v) = row.try_get::<bool, _>(index) {
        Value::Bool(v)
    } else {
        Value::Null
    }
}

fn decode_row(row: &SqliteRow) -> Vec<Value> {
    (0..row.columns().len())
        .map(|index| decode_column(row, index))
        .collect()
}

/// Splits a declared type such as `VARCHAR(20)` or `NUMERIC(10, 2)` into
/// its base name, size and scale.
pub(crate) fn split_declared_type(declared: &str) -> (String, Option<u32>, Option<u32>) {
    let declared = declared.trim();
    let (Some(left), Some(right)) = (declared.find('('), declared.rfind(')')) else {
        return (declared.to_string(), None, None);
    };
    if right <= left {
        return (declared.to_string(), None, None);
    }

    let base = declared[..left].trim().to_string();
    let mut args = declared[left + 1..right]
        .split(',')
        .map(|part| part.trim().parse::<u32>().ok());
    let size = args.next().flatten();
    let scale = args.next().flatten();
    (base, size, scale)
}

// --- Connection ---

#[async_trait]
impl Connection for SqliteDatabase {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    async fn execute_query(&self, sql: &str) -> Result<RowCursor, String> {
        let (sender, receiver) = mpsc::channel::<CursorRow>(CURSOR_CHANNEL_CAPACITY);
        let session = Arc::clone(&self.session);
        let sql = sql.to_string();

        tokio::spawn(async move {
            let mut guard = session.lock().await;
            let mut stream = sqlx::query(&sql).persistent(false).fetch(&mut guard.conn);

            while let Some(item) = stream.next().await {
                let message = item
                    .map(|row| decode_row(&row))
                    .map_err(|e| format!("Query execution failed: {}", e));
                let failed = message.is_err();
                if sender.send(message).await.is_err() || failed {
                    break;
                }
            }

            // The connection must be free before the reader sees end of stream.
            drop(stream);
            drop(guard);
            drop(sender);
        });

        Ok(RowCursor::new(receiver))
    }

    async fn describe_query(&self, sql: &str) -> Result<Vec<ColumnDef>, String> {
        let mut session = self.session.lock().await;
        let statement = (&mut session.conn)
            .prepare(sql)
            .await
            .map_err(|e| format!("Failed to describe query: {}", e))?;

        Ok(statement
            .columns()
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let declared = match column.type_info().name() {
                    "NULL" => "",
                    name => name,
                };
                let (data_type, size, scale) = split_declared_type(declared);
                ColumnDef::new(column.name(), &data_type)
                    .with_size(size, scale)
                    .with_position(index + 1)
            })
            .collect())
    }

    async fn execute_update(&self, sql: &str) -> Result<u64, String> {
        let mut session = self.session.lock().await;
        session.ensure_transaction().await?;
        let result = sqlx::query(sql)
            .persistent(false)
            .execute(&mut session.conn)
            .await
            .map_err(|e| format!("Failed to execute statement: {}", e))?;
        Ok(result.rows_affected())
    }

    async fn set_savepoint(&self) -> Result<Savepoint, String> {
        let name = self.next_savepoint_name();
        let mut session = self.session.lock().await;
        session.ensure_transaction().await?;
        sqlx::query(&format!("SAVEPOINT {}", name))
            .persistent(false)
            .execute(&mut session.conn)
            .await
            .map_err(|e| format!("Failed to set savepoint: {}", e))?;
        Ok(Savepoint { name })
    }

    async fn rollback_to_savepoint(&self, savepoint: &Savepoint) -> Result<(), String> {
        let mut session = self.session.lock().await;
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {}", savepoint.name))
            .persistent(false)
            .execute(&mut session.conn)
            .await
            .map_err(|e| format!("Failed to roll back to savepoint: {}", e))?;
        // ROLLBACK TO leaves the savepoint on the stack.
        sqlx::query(&format!("RELEASE SAVEPOINT {}", savepoint.name))
            .persistent(false)
            .execute(&mut session.conn)
            .await
            .map_err(|e| format!("Failed to release savepoint: {}", e))?;
        Ok(())
    }

    async fn release_savepoint(&self, savepoint: &Savepoint) -> Result<(), String> {
        let mut session = self.session.lock().await;
        sqlx::query(&format!("RELEASE SAVEPOINT {}", savepoint.name))
            .persistent(false)
            .execute(&mut session.conn)
            .await
            .map_err(|e| format!("Failed to release savepoint: {}", e))?;
        Ok(())
    }

    async fn commit(&self) -> Result<(), String> {
        self.session.lock().await.finish_transaction("COMMIT").await
    }

    async fn rollback(&self) -> Result<(), String> {
        self.session.lock().await.finish_transaction("ROLLBACK").await
    }
}

// --- Metadata Queries ---

#[async_trait]
impl Catalog for SqliteDatabase {
    fn case_folding(&self) -> CaseFolding {
        CaseFolding::Insensitive
    }

    fn ddl_provider(&self) -> Arc<dyn DdlTemplateProvider> {
        Arc::new(dialect_for(DatabaseType::SQLite))
    }

    async fn resolve_table(
        &self,
        table: &TableIdentifier,
    ) -> Result<Option<TableIdentifier>, String> {
        let masters = match table.schema.as_deref() {
            Some(schema) if schema.eq_ignore_ascii_case("temp") => {
                vec![(Some("temp".to_string()), "sqlite_temp_master".to_string())]
            }
            Some(schema) => vec![(
                Some(schema.to_string()),
                format!("{}.sqlite_master", quote_identifier_ansi(schema)),
            )],
            None => vec![
                (None, "sqlite_master".to_string()),
                (None, "sqlite_temp_master".to_string()),
            ],
        };

        for (schema, master_table) in masters {
            if let Some(name) = self.table_exists_in(&master_table, &table.table).await? {
                return Ok(Some(TableIdentifier {
                    catalog: None,
                    schema,
                    table: name,
                }));
            }
        }
        Ok(None)
    }

    async fn resolve_columns(&self, table: &TableIdentifier) -> Result<Vec<ColumnDef>, String> {
        let pragma = match table.schema.as_deref() {
            Some(schema) => format!(
                "PRAGMA {}.table_info({})",
                quote_identifier_ansi(schema),
                quote_identifier_ansi(&table.table)
            ),
            None => format!("PRAGMA table_info({})", quote_identifier_ansi(&table.table)),
        };

        let mut session = self.session.lock().await;
        let rows = sqlx::query(&pragma)
            .persistent(false)
            .fetch_all(&mut session.conn)
            .await
            .map_err(|e| format!("Failed to fetch table schema: {}", e))?;

        Ok(rows
            .iter()
            .map(|r| {
                let cid = r.try_get::<i64, _>("cid").unwrap_or(0);
                let name = r.try_get::<String, _>("name").unwrap_or_default();
                let declared = r.try_get::<String, _>("type").unwrap_or_default();
                let notnull = r.try_get::<i32, _>("notnull").unwrap_or(0);
                let pk = r.try_get::<i32, _>("pk").unwrap_or(0);
                let dflt_value = r
                    .try_get::<Option<String>, _>("dflt_value")
                    .ok()
                    .flatten();

                let (data_type, size, scale) = split_declared_type(&declared);
                let mut column = ColumnDef::new(&name, &data_type)
                    .with_size(size, scale)
                    .with_position(cid as usize + 1)
                    .with_primary_key(pk > 0);
                column.nullable = notnull == 0 && pk == 0;
                column.default_value = dflt_value;
                column
            })
            .collect())
    }
}
