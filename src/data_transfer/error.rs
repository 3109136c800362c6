use thiserror::Error;

/// Errors raised by the copy engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CopyError {
    #[error("Source table {0} not found")]
    SourceNotFound(String),

    #[error("Target table {0} not found")]
    TargetNotFound(String),

    #[error("No usable columns to copy from {source_unit} to {target}")]
    ColumnMappingEmpty { source_unit: String, target: String },

    #[error("Write mode {mode} needs key columns, but none were given and {table} has no primary key")]
    MissingKeyColumns { mode: String, table: String },

    #[error("Failed to drop table {table}: {message}")]
    DropFailed { table: String, message: String },

    #[error("Failed to create table {table}: {message}")]
    CreateFailed { table: String, message: String },

    #[error("row rejected: {0}")]
    RowWriteFailed(String),

    #[error("delete-sync skipped, no usable key")]
    NoUsableKeyForSync,

    #[error("Copy cancelled")]
    Cancelled,

    #[error("{0}")]
    Connection(String),

    #[error("Invalid copy settings: {0}")]
    Config(String),
}

impl CopyError {
    /// Errors that stop a job before any row is streamed.
    pub fn is_fatal_setup(&self) -> bool {
        matches!(
            self,
            CopyError::SourceNotFound(_)
                | CopyError::TargetNotFound(_)
                | CopyError::ColumnMappingEmpty { .. }
                | CopyError::MissingKeyColumns { .. }
                | CopyError::DropFailed { .. }
                | CopyError::CreateFailed { .. }
                | CopyError::Config(_)
        )
    }
}

impl From<String> for CopyError {
    fn from(message: String) -> Self {
        CopyError::Connection(message)
    }
}
