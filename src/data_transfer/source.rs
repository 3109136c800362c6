// =====================================================
// ROW SOURCE
// Streams one SELECT from the source into a receiver
// =====================================================

use crate::data_transfer::error::CopyError;
use crate::db::connection::Connection;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub type ProgressCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Consumer side of a copy. One receiver serves exactly one source pass.
#[async_trait]
pub trait RowReceiver: Send {
    async fn accept_row(&mut self, row: Vec<Value>) -> Result<(), CopyError>;

    /// Input is exhausted, or the source was stopped regularly.
    async fn import_finished(&mut self) -> Result<(), CopyError>;

    /// The source was cancelled; pending work must not be committed.
    async fn import_cancelled(&mut self) -> Result<(), CopyError>;

    /// The source itself failed.
    async fn table_import_error(&mut self) -> Result<(), CopyError>;
}

/// Shared cancel/stop switch for a running copy.
#[derive(Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
    regular_stop: Arc<AtomicBool>,
    rows_processed: Arc<AtomicU64>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the copy; the receiver rolls back what is not committed.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// End the copy early but keep the rows read so far.
    pub fn stop(&self) {
        self.regular_stop.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_regular_stop(&self) -> bool {
        self.regular_stop.load(Ordering::SeqCst)
    }

    pub fn rows_processed(&self) -> u64 {
        self.rows_processed.load(Ordering::Relaxed)
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn set_rows_processed(&self, rows: u64) {
        self.rows_processed.store(rows, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEnd {
    Finished,
    Stopped,
    Cancelled,
}

pub struct RowSource {
    connection: Arc<dyn Connection>,
    sql: String,
    projection: Option<Vec<usize>>,
    abort_on_error: bool,
    cancel: CancelHandle,
    progress: Option<ProgressCallback>,
    progress_interval: u64,
    total_estimate: Option<u64>,
}

impl RowSource {
    pub fn new(connection: Arc<dyn Connection>, sql: &str, cancel: CancelHandle) -> Self {
        Self {
            connection,
            sql: sql.to_string(),
            projection: None,
            abort_on_error: true,
            cancel,
            progress: None,
            progress_interval: 1,
            total_estimate: None,
        }
    }

    /// Picks and reorders the fetched values before they reach the receiver.
    pub fn with_projection(mut self, indexes: Vec<usize>) -> Self {
        self.projection = Some(indexes);
        self
    }

    pub fn with_abort_on_error(mut self, abort_on_error: bool) -> Self {
        self.abort_on_error = abort_on_error;
        self
    }

    pub fn with_progress(
        mut self,
        callback: Option<ProgressCallback>,
        interval: u64,
        total_estimate: Option<u64>,
    ) -> Self {
        self.progress = callback;
        self.progress_interval = interval.max(1);
        self.total_estimate = total_estimate;
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    fn project(&self, row: Vec<Value>) -> Vec<Value> {
        match &self.projection {
            Some(indexes) => indexes
                .iter()
                .map(|&index| row.get(index).cloned().unwrap_or(Value::Null))
                .collect(),
            None => row,
        }
    }

    fn report_progress(&self, rows: u64) {
        if let Some(callback) = &self.progress {
            callback(rows, self.total_estimate);
        }
    }

    async fn release_read_savepoint(
        &self,
        savepoint: Option<crate::db::connection::Savepoint>,
    ) {
        if let Some(savepoint) = savepoint {
            if let Err(e) = self.connection.release_savepoint(&savepoint).await {
                log::warn!("Failed to release source savepoint: {}", e);
            }
        }
    }

    /// Streams every row into `receiver`, then tells it how the stream ended.
    pub async fn start(&self, receiver: &mut dyn RowReceiver) -> Result<SourceEnd, CopyError> {
        let savepoint = if self.connection.select_starts_transaction()
            && self.connection.supports_savepoints()
        {
            Some(self.connection.set_savepoint().await?)
        } else {
            None
        };

        log::debug!("Retrieving source rows: {}", self.sql);
        let mut cursor = match self.connection.execute_query(&self.sql).await {
            Ok(cursor) => cursor,
            Err(e) => {
                self.release_read_savepoint(savepoint).await;
                receiver.table_import_error().await?;
                return Err(CopyError::Connection(format!(
                    "Failed to query source: {}",
                    e
                )));
            }
        };

        let token = self.cancel.token().clone();
        let mut rows: u64 = 0;
        let end = loop {
            if token.is_cancelled() {
                break self.cancelled_end();
            }

            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break self.cancelled_end(),
                next = cursor.next_row() => next,
            };

            match next {
                Ok(Some(row)) => {
                    rows += 1;
                    self.cancel.set_rows_processed(rows);
                    if let Err(error) = receiver.accept_row(self.project(row)).await {
                        if self.abort_on_error {
                            drop(cursor);
                            self.release_read_savepoint(savepoint).await;
                            receiver.table_import_error().await?;
                            return Err(error);
                        }
                        log::warn!("Row {} skipped: {}", rows, error);
                    }
                    if rows % self.progress_interval == 0 {
                        self.report_progress(rows);
                    }
                }
                Ok(None) => break SourceEnd::Finished,
                Err(e) => {
                    drop(cursor);
                    self.release_read_savepoint(savepoint).await;
                    receiver.table_import_error().await?;
                    return Err(CopyError::Connection(format!(
                        "Failed to fetch source row: {}",
                        e
                    )));
                }
            }
        };

        drop(cursor);
        self.release_read_savepoint(savepoint).await;

        match end {
            SourceEnd::Cancelled => {
                log::info!("Copy cancelled after {} rows", rows);
                receiver.import_cancelled().await?;
            }
            SourceEnd::Finished | SourceEnd::Stopped => {
                if rows % self.progress_interval != 0 || rows == 0 {
                    self.report_progress(rows);
                }
                if let Err(error) = receiver.import_finished().await {
                    receiver.table_import_error().await?;
                    return Err(error);
                }
            }
        }
        Ok(end)
    }

    fn cancelled_end(&self) -> SourceEnd {
        if self.cancel.is_regular_stop() {
            SourceEnd::Stopped
        } else {
            SourceEnd::Cancelled
        }
    }
}
