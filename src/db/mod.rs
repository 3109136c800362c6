// =====================================================
// DATABASE MODULE
// Connection contracts, dialects and SQL helpers
// =====================================================

pub mod connection;
pub mod dialect;
pub mod sql_utils;

pub use connection::{Catalog, Connection, CopyEndpoint, CursorRow, RowCursor, Savepoint};
pub use dialect::{dialect_for, CreateTableType, DdlTemplateProvider, SqlDialect, ValueKind};
