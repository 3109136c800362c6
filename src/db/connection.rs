// =====================================================
// CONNECTION AND CATALOG CONTRACTS
// What the copy engine needs from a live database
// =====================================================

use crate::db::dialect::DdlTemplateProvider;
use crate::db_types::{CaseFolding, ColumnDef, DatabaseType, TableIdentifier, TableSpec};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

pub type CursorRow = Result<Vec<Value>, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Savepoint {
    pub name: String,
}

/// Forward-only stream of rows produced by `Connection::execute_query`.
/// Dropping the cursor stops the producer behind it.
pub struct RowCursor {
    receiver: mpsc::Receiver<CursorRow>,
}

impl RowCursor {
    pub fn new(receiver: mpsc::Receiver<CursorRow>) -> Self {
        Self { receiver }
    }

    pub fn from_rows(rows: Vec<Vec<Value>>) -> Self {
        let (sender, receiver) = mpsc::channel(rows.len().max(1));
        for row in rows {
            // Capacity matches the row count, so this never fails.
            let _ = sender.try_send(Ok(row));
        }
        Self { receiver }
    }

    pub async fn next_row(&mut self) -> Result<Option<Vec<Value>>, String> {
        match self.receiver.recv().await {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(error)) => Err(error),
            None => Ok(None),
        }
    }

    pub async fn collect_rows(mut self) -> Result<Vec<Vec<Value>>, String> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}

/// JDBC-style connection with auto-commit off: writes accumulate in an
/// implicit transaction until `commit` or `rollback`.
#[async_trait]
pub trait Connection: Send + Sync {
    fn db_type(&self) -> DatabaseType;

    fn supports_savepoints(&self) -> bool {
        true
    }

    /// Whether a plain SELECT opens a transaction on this driver.
    fn select_starts_transaction(&self) -> bool {
        false
    }

    async fn execute_query(&self, sql: &str) -> Result<RowCursor, String>;

    /// Result columns of a query, without running it.
    async fn describe_query(&self, sql: &str) -> Result<Vec<ColumnDef>, String>;

    async fn execute_update(&self, sql: &str) -> Result<u64, String>;

    async fn set_savepoint(&self) -> Result<Savepoint, String>;

    async fn rollback_to_savepoint(&self, savepoint: &Savepoint) -> Result<(), String>;

    async fn release_savepoint(&self, savepoint: &Savepoint) -> Result<(), String>;

    async fn commit(&self) -> Result<(), String>;

    async fn rollback(&self) -> Result<(), String>;
}

/// Metadata lookups against one connection.
#[async_trait]
pub trait Catalog: Send + Sync {
    fn case_folding(&self) -> CaseFolding {
        CaseFolding::Insensitive
    }

    fn ddl_provider(&self) -> Arc<dyn DdlTemplateProvider>;

    /// Returns the identifier as the database knows it, or `None` when the
    /// table does not exist.
    async fn resolve_table(&self, table: &TableIdentifier)
        -> Result<Option<TableIdentifier>, String>;

    async fn resolve_columns(&self, table: &TableIdentifier) -> Result<Vec<ColumnDef>, String>;

    async fn resolve_table_spec(&self, table: &TableIdentifier) -> Result<Option<TableSpec>, String> {
        let Some(identifier) = self.resolve_table(table).await? else {
            return Ok(None);
        };
        let columns = self.resolve_columns(&identifier).await?;
        Ok(Some(TableSpec::new(identifier, columns)))
    }

    fn quote_identifier(&self, name: &str) -> String {
        self.ddl_provider().quote_identifier(name)
    }
}

/// One side of a copy: a connection plus the catalog describing it.
#[derive(Clone)]
pub struct CopyEndpoint {
    pub connection: Arc<dyn Connection>,
    pub catalog: Arc<dyn Catalog>,
    pub ddl: Arc<dyn DdlTemplateProvider>,
}

impl CopyEndpoint {
    pub fn new(connection: Arc<dyn Connection>, catalog: Arc<dyn Catalog>) -> Self {
        let ddl = catalog.ddl_provider();
        Self {
            connection,
            catalog,
            ddl,
        }
    }

    /// Endpoint for a type that is both the connection and its catalog.
    pub fn from_database<T>(database: Arc<T>) -> Self
    where
        T: Connection + Catalog + 'static,
    {
        let connection: Arc<dyn Connection> = database.clone();
        let catalog: Arc<dyn Catalog> = database;
        Self::new(connection, catalog)
    }

    pub fn with_ddl(mut self, ddl: Arc<dyn DdlTemplateProvider>) -> Self {
        self.ddl = ddl;
        self
    }

    pub fn db_type(&self) -> DatabaseType {
        self.connection.db_type()
    }
}
