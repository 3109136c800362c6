//! Cross-database table copy engine.
//!
//! A [`CopyOrchestrator`] prepares [`CopyJob`]s from a source table or query
//! into a target table, optionally creating the target first. Jobs stream
//! rows through a [`data_transfer::RowSource`] into a
//! [`data_transfer::TableWriter`] under an explicit [`TransactionPolicy`],
//! and can remove target rows missing from the source afterwards.

pub mod data_transfer;
pub mod db;
pub mod db_types;
pub mod sqlite;

pub use data_transfer::{
    CommitInterval, CopyError, CopyJob, CopyOptions, CopyOrchestrator, CopySession, CopySettings,
    CopyTask, Outcome, TransactionPolicy, WriteMode,
};
pub use db::{Catalog, Connection, CopyEndpoint, CreateTableType, DdlTemplateProvider};
pub use db_types::{CaseFolding, ColumnDef, DatabaseType, TableIdentifier, TableSpec};
pub use sqlite::SqliteDatabase;
