use crate::data_transfer::mapper::ColumnRename;
use crate::db::dialect::CreateTableType;
use crate::db_types::CaseFolding;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100;

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_progress_interval() -> u64 {
    DEFAULT_PROGRESS_INTERVAL
}

// =====================================================
// WRITE MODE
// =====================================================

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    #[default]
    Insert,
    Update,
    /// INSERT first, UPDATE when the key already exists.
    InsertOrUpdate,
    /// UPDATE first, INSERT when no row matched.
    UpdateInsert,
    /// One native upsert statement per row.
    Upsert,
    /// Delete the rows matching the key, then insert.
    DeleteInsert,
}

impl WriteMode {
    /// Accepts the kebab-case names as well as the comma forms
    /// (`insert,update`, `update,insert`, `delete,insert`).
    pub fn parse(value: &str) -> Result<Self, String> {
        let normalized = value
            .trim()
            .to_ascii_lowercase()
            .replace(' ', "")
            .replace('_', "-");
        match normalized.as_str() {
            "insert" => Ok(WriteMode::Insert),
            "update" => Ok(WriteMode::Update),
            "insert-or-update" | "insert,update" | "insert-update" => {
                Ok(WriteMode::InsertOrUpdate)
            }
            "update-insert" | "update,insert" | "update-or-insert" => Ok(WriteMode::UpdateInsert),
            "upsert" => Ok(WriteMode::Upsert),
            "delete-insert" | "delete,insert" => Ok(WriteMode::DeleteInsert),
            _ => Err(format!("Unknown write mode '{}'", value.trim())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Insert => "insert",
            WriteMode::Update => "update",
            WriteMode::InsertOrUpdate => "insert-or-update",
            WriteMode::UpdateInsert => "update-insert",
            WriteMode::Upsert => "upsert",
            WriteMode::DeleteInsert => "delete-insert",
        }
    }

    pub fn requires_keys(&self) -> bool {
        !matches!(self, WriteMode::Insert)
    }
}

// =====================================================
// TRANSACTION POLICY
// =====================================================

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum CommitInterval {
    /// Commit after every flushed batch.
    #[default]
    Batch,
    /// Commit once, after the last row.
    AtEnd,
    /// Never commit; the caller owns the transaction.
    Never,
    /// Commit once at least this many rows were written since the last commit.
    Rows(u64),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPolicy {
    pub commit_every: CommitInterval,
    pub use_savepoints: bool,
    pub continue_on_error: bool,
}

impl Default for TransactionPolicy {
    fn default() -> Self {
        Self {
            commit_every: CommitInterval::Batch,
            use_savepoints: true,
            continue_on_error: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    #[default]
    None,
    Regular,
    Cascade,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeleteTargetPolicy {
    #[default]
    None,
    Delete,
    Truncate,
}

// =====================================================
// SETTINGS
// =====================================================

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CopySettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    pub commit_every: CommitInterval,
    pub continue_on_error: bool,
    #[serde(default = "default_true")]
    pub use_savepoints: bool,
    pub write_mode: WriteMode,
    pub trim_char_data: bool,
    pub adjust_sequences: bool,
    pub delete_sync: bool,
    pub delete_target: DeleteTargetPolicy,
    pub case_folding: CaseFolding,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

impl Default for CopySettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            commit_every: CommitInterval::Batch,
            continue_on_error: false,
            use_savepoints: true,
            write_mode: WriteMode::Insert,
            trim_char_data: false,
            adjust_sequences: false,
            delete_sync: false,
            delete_target: DeleteTargetPolicy::None,
            case_folding: CaseFolding::Insensitive,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl CopySettings {
    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        let settings: CopySettings = serde_json::from_str(raw)
            .map_err(|e| format!("Failed to parse copy settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            format!("Failed to read copy settings from {}: {}", path.display(), e)
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batchSize must be greater than zero".to_string());
        }
        if self.commit_every == CommitInterval::Rows(0) {
            return Err("commitEvery.rows must be greater than zero".to_string());
        }
        if self.progress_interval == 0 {
            return Err("progressInterval must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn transaction_policy(&self) -> TransactionPolicy {
        TransactionPolicy {
            commit_every: self.commit_every,
            use_savepoints: self.use_savepoints,
            continue_on_error: self.continue_on_error,
        }
    }
}

// =====================================================
// JOB OPTIONS
// =====================================================

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CopyOptions {
    pub column_mapping: Option<Vec<ColumnRename>>,
    pub where_clause: Option<String>,
    /// Create the target table; `None` copies into an existing table.
    pub create_table_type: Option<CreateTableType>,
    pub drop_policy: DropPolicy,
    pub ignore_drop_errors: bool,
    pub skip_target_check: bool,
    pub key_columns: Vec<String>,
    pub settings: CopySettings,
}

impl CopyOptions {
    pub fn normalized_where_clause(&self) -> Option<String> {
        self.where_clause
            .as_deref()
            .map(str::trim)
            .map(|value| {
                let lowered = value.to_ascii_lowercase();
                if lowered.starts_with("where ") {
                    value[6..].trim().to_string()
                } else {
                    value.to_string()
                }
            })
            .filter(|value| !value.is_empty())
    }

    pub fn normalized_key_columns(&self) -> Vec<String> {
        self.key_columns
            .iter()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect()
    }
}

// =====================================================
// JOB STATE AND OUTCOME
// =====================================================

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CopyJobState {
    #[default]
    Idle,
    Streaming,
    Flushing,
    Finished,
    Cancelled,
    Failed,
}

impl CopyJobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CopyJobState::Finished | CopyJobState::Cancelled | CopyJobState::Failed
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub affected_rows: u64,
    pub inserted_rows: u64,
    pub updated_rows: u64,
    pub deleted_rows: u64,
    pub success: bool,
    pub cancelled: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for Outcome {
    fn default() -> Self {
        Self::new()
    }
}

impl Outcome {
    pub fn new() -> Self {
        Self {
            affected_rows: 0,
            inserted_rows: 0,
            updated_rows: 0,
            deleted_rows: 0,
            success: true,
            cancelled: false,
            warnings: Vec::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let mut outcome = Self::new();
        outcome.fail(message);
        outcome.finish();
        outcome
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.success = false;
        self.errors.push(message.into());
    }

    pub fn mark_cancelled(&mut self) {
        self.success = false;
        self.cancelled = true;
    }

    pub fn push_warning_once(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if self.warnings.iter().any(|item| item == &warning) {
            return;
        }
        self.warnings.push(warning);
    }

    pub fn append_warnings(&mut self, warnings: &[String]) {
        for warning in warnings {
            self.push_warning_once(warning.clone());
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn state(&self) -> CopyJobState {
        if self.finished_at.is_none() {
            CopyJobState::Streaming
        } else if self.cancelled {
            CopyJobState::Cancelled
        } else if self.success {
            CopyJobState::Finished
        } else {
            CopyJobState::Failed
        }
    }
}

#[cfg(test)]
mod tests;
