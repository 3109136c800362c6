// =====================================================
// ROW RECEIVER
// Batches rows and writes them to the target table
// =====================================================

use crate::data_transfer::error::CopyError;
use crate::data_transfer::models::{CommitInterval, CopyJobState, TransactionPolicy, WriteMode};
use crate::data_transfer::source::RowReceiver;
use crate::data_transfer::statements::StatementBuilder;
use crate::db::connection::{Connection, Savepoint};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Rows accepted but not yet written.
#[derive(Debug, Default)]
pub struct BatchWindow {
    rows: Vec<Vec<Value>>,
    capacity: usize,
}

impl BatchWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            rows: Vec::with_capacity(capacity.min(1_024)),
            capacity,
        }
    }

    pub fn push(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn take(&mut self) -> Vec<Vec<Value>> {
        std::mem::take(&mut self.rows)
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

/// Row counts of one writer. Pending counts become committed on commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub affected: u64,
    pub inserted: u64,
    pub updated: u64,
}

impl WriteCounts {
    fn add(&mut self, other: WriteCounts) {
        self.affected += other.affected;
        self.inserted += other.inserted;
        self.updated += other.updated;
    }
}

pub struct TableWriter {
    connection: Arc<dyn Connection>,
    statements: StatementBuilder,
    mode: WriteMode,
    policy: TransactionPolicy,
    window: BatchWindow,
    state: CopyJobState,
    commit_enabled: bool,
    multi_table: bool,
    job_savepoint: Option<Savepoint>,
    rows_since_commit: u64,
    pending: WriteCounts,
    committed: WriteCounts,
    rejected: Vec<String>,
}

impl TableWriter {
    pub fn new(
        connection: Arc<dyn Connection>,
        statements: StatementBuilder,
        mode: WriteMode,
        policy: TransactionPolicy,
        batch_size: usize,
    ) -> Self {
        Self {
            connection,
            statements,
            mode,
            policy,
            window: BatchWindow::new(batch_size),
            state: CopyJobState::Idle,
            commit_enabled: !matches!(policy.commit_every, CommitInterval::Never),
            multi_table: false,
            job_savepoint: None,
            rows_since_commit: 0,
            pending: WriteCounts::default(),
            committed: WriteCounts::default(),
            rejected: Vec::new(),
        }
    }

    /// The caller manages the transaction; the writer never commits.
    pub fn commit_nothing(&mut self) {
        self.commit_enabled = false;
    }

    /// Several writers share the target transaction. Commits and rollbacks
    /// are left to whoever ends the session.
    pub fn begin_multi_table(&mut self) {
        self.multi_table = true;
        self.commit_enabled = false;
    }

    pub fn end_multi_table(&mut self) {
        self.multi_table = false;
        self.commit_enabled = !matches!(self.policy.commit_every, CommitInterval::Never);
    }

    pub fn state(&self) -> CopyJobState {
        self.state
    }

    /// Counts that are durable, or handed over to the caller's transaction
    /// when the writer does not commit.
    pub fn counts(&self) -> WriteCounts {
        self.committed
    }

    pub fn rejected_rows(&self) -> &[String] {
        &self.rejected
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    fn isolates_rows(&self) -> bool {
        self.policy.continue_on_error
            && self.policy.use_savepoints
            && self.connection.supports_savepoints()
    }

    /// Guards this writer's work inside a transaction it does not own.
    async fn ensure_job_savepoint(&mut self) -> Result<(), CopyError> {
        if self.commit_enabled
            || self.multi_table
            || self.job_savepoint.is_some()
            || !self.connection.supports_savepoints()
        {
            return Ok(());
        }
        self.job_savepoint = Some(self.connection.set_savepoint().await?);
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<u64, String> {
        self.connection.execute_update(sql).await
    }

    async fn apply_row(&self, row: &[Value]) -> Result<WriteCounts, String> {
        let mut counts = WriteCounts::default();
        match self.mode {
            WriteMode::Insert => {
                counts.inserted = self.execute(&self.statements.insert(row)).await?;
            }
            WriteMode::Update => {
                counts.updated = self.execute(&self.statements.update(row)?).await?;
            }
            WriteMode::InsertOrUpdate => {
                counts = self.insert_or_update(row).await?;
            }
            WriteMode::UpdateInsert => {
                counts.updated = self.execute(&self.statements.update(row)?).await?;
                if counts.updated == 0 {
                    counts.inserted = self.execute(&self.statements.insert(row)).await?;
                }
            }
            WriteMode::Upsert => {
                counts.affected = self.execute(&self.statements.upsert(row)?).await?;
                return Ok(counts);
            }
            WriteMode::DeleteInsert => {
                self.execute(&self.statements.delete_by_key(row)?).await?;
                counts.inserted = self.execute(&self.statements.insert(row)).await?;
            }
        }
        counts.affected = counts.inserted + counts.updated;
        Ok(counts)
    }

    async fn insert_or_update(&self, row: &[Value]) -> Result<WriteCounts, String> {
        let insert = self.statements.insert(row);
        let savepoint = if self.connection.supports_savepoints() {
            Some(self.connection.set_savepoint().await?)
        } else {
            None
        };

        match self.execute(&insert).await {
            Ok(inserted) => {
                if let Some(savepoint) = &savepoint {
                    self.connection.release_savepoint(savepoint).await?;
                }
                Ok(WriteCounts {
                    inserted,
                    ..Default::default()
                })
            }
            Err(insert_error) => {
                if let Some(savepoint) = &savepoint {
                    self.connection.rollback_to_savepoint(savepoint).await?;
                }
                let updated = self.execute(&self.statements.update(row)?).await?;
                if updated == 0 {
                    return Err(insert_error);
                }
                Ok(WriteCounts {
                    updated,
                    ..Default::default()
                })
            }
        }
    }

    async fn write_row(&mut self, row: &[Value]) -> Result<WriteCounts, CopyError> {
        if self.isolates_rows() {
            let savepoint = self.connection.set_savepoint().await?;
            return match self.apply_row(row).await {
                Ok(counts) => {
                    self.connection.release_savepoint(&savepoint).await?;
                    Ok(counts)
                }
                Err(message) => {
                    self.connection.rollback_to_savepoint(&savepoint).await?;
                    self.reject(message);
                    Ok(WriteCounts::default())
                }
            };
        }

        match self.apply_row(row).await {
            Ok(counts) => Ok(counts),
            Err(message) if self.policy.continue_on_error => {
                self.reject(message);
                Ok(WriteCounts::default())
            }
            Err(message) => {
                log::error!("Writing row to {} failed: {}", self.statements.table_ref(), message);
                Err(CopyError::RowWriteFailed(message))
            }
        }
    }

    fn reject(&mut self, message: String) {
        log::warn!("Row rejected by {}: {}", self.statements.table_ref(), message);
        self.rejected
            .push(CopyError::RowWriteFailed(message).to_string());
    }

    /// Writes the window, then commits when the interval says so.
    pub async fn flush(&mut self) -> Result<(), CopyError> {
        if self.window.is_empty() {
            return Ok(());
        }
        self.state = CopyJobState::Flushing;
        self.ensure_job_savepoint().await?;

        let rows = self.window.take();
        let written = rows.len() as u64;
        for row in &rows {
            let counts = self.write_row(row).await?;
            self.pending.add(counts);
        }
        self.rows_since_commit += written;

        if !self.commit_enabled {
            self.promote_pending();
        } else {
            let due = match self.policy.commit_every {
                CommitInterval::Batch => true,
                CommitInterval::Rows(interval) => self.rows_since_commit >= interval,
                CommitInterval::AtEnd | CommitInterval::Never => false,
            };
            if due {
                self.commit().await?;
            }
        }

        self.state = CopyJobState::Streaming;
        Ok(())
    }

    fn promote_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.committed.add(pending);
    }

    async fn commit(&mut self) -> Result<(), CopyError> {
        self.connection.commit().await?;
        log::debug!(
            "Committed {} rows to {}",
            self.rows_since_commit,
            self.statements.table_ref()
        );
        self.promote_pending();
        self.rows_since_commit = 0;
        Ok(())
    }

    /// Drops everything not yet committed.
    async fn rollback_pending(&mut self) -> Result<(), CopyError> {
        self.window.clear();
        self.pending = WriteCounts::default();
        self.rows_since_commit = 0;

        if self.commit_enabled {
            self.connection.rollback().await?;
        } else if let Some(savepoint) = self.job_savepoint.take() {
            self.connection.rollback_to_savepoint(&savepoint).await?;
            // Counts promoted at flush belong to the work just undone.
            self.committed = WriteCounts::default();
        }
        log::info!("Rolled back pending rows for {}", self.statements.table_ref());
        Ok(())
    }
}

#[async_trait]
impl RowReceiver for TableWriter {
    async fn accept_row(&mut self, row: Vec<Value>) -> Result<(), CopyError> {
        if self.state == CopyJobState::Idle {
            self.state = CopyJobState::Streaming;
        }
        self.window.push(row);
        if self.window.is_full() {
            self.flush().await?;
        }
        Ok(())
    }

    async fn import_finished(&mut self) -> Result<(), CopyError> {
        self.flush().await?;
        if self.commit_enabled {
            self.commit().await?;
        } else if let Some(savepoint) = self.job_savepoint.take() {
            self.connection.release_savepoint(&savepoint).await?;
        }
        self.state = CopyJobState::Finished;
        Ok(())
    }

    async fn import_cancelled(&mut self) -> Result<(), CopyError> {
        self.rollback_pending().await?;
        self.state = CopyJobState::Cancelled;
        Ok(())
    }

    async fn table_import_error(&mut self) -> Result<(), CopyError> {
        self.state = CopyJobState::Failed;
        if self.multi_table {
            self.window.clear();
            return Ok(());
        }
        self.rollback_pending().await
    }
}
