// =====================================================
// COPY ORCHESTRATOR
// Builds copy jobs and drives them to an Outcome
// =====================================================

use crate::data_transfer::delete_sync::{
    DeleteSyncStatus, DeleteSynchronizer, SourceKeyScope, SyncKey,
};
use crate::data_transfer::error::CopyError;
use crate::data_transfer::mapper::{resolve_mapping, validate_renames, ColumnMapping, TargetColumns};
use crate::data_transfer::models::{
    CommitInterval, CopyOptions, CopySettings, DeleteTargetPolicy, Outcome,
};
use crate::data_transfer::schema::{ReconcileRequest, SchemaReconciler};
use crate::data_transfer::source::{CancelHandle, ProgressCallback, RowSource, SourceEnd};
use crate::data_transfer::statements::StatementBuilder;
use crate::data_transfer::writer::TableWriter;
use crate::db::connection::CopyEndpoint;
use crate::db_types::{ColumnDef, TableIdentifier};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Where the rows of a job come from.
#[derive(Debug, Clone)]
pub enum SourceUnit {
    Table {
        table: TableIdentifier,
        where_clause: Option<String>,
    },
    Query(String),
}

fn trim_query(query: &str) -> String {
    query.trim().trim_end_matches(';').trim_end().to_string()
}

// =====================================================
// ORCHESTRATOR
// =====================================================

pub struct CopyOrchestrator {
    source: CopyEndpoint,
    target: CopyEndpoint,
}

impl CopyOrchestrator {
    pub fn new(source: CopyEndpoint, target: CopyEndpoint) -> Self {
        Self { source, target }
    }

    pub fn source(&self) -> &CopyEndpoint {
        &self.source
    }

    pub fn target(&self) -> &CopyEndpoint {
        &self.target
    }

    /// A source cursor holds its connection until the stream ends, so the
    /// writer cannot share it.
    fn ensure_distinct_connections(&self) -> Result<(), CopyError> {
        if Arc::ptr_eq(&self.source.connection, &self.target.connection) {
            return Err(CopyError::Config(
                "source and target must use separate connections".to_string(),
            ));
        }
        Ok(())
    }

    /// Prepares a copy of `source_table` into `target_table`. Creates the
    /// target first when `options.create_table_type` is set.
    pub async fn copy_from_table(
        &self,
        source_table: &TableIdentifier,
        target_table: &TableIdentifier,
        options: CopyOptions,
    ) -> Result<CopyJob, CopyError> {
        self.ensure_distinct_connections()?;
        validate_options(&options)?;

        let Some(source_spec) = self
            .source
            .catalog
            .resolve_table_spec(source_table)
            .await?
        else {
            return Err(CopyError::SourceNotFound(source_table.to_string()));
        };

        let unit = SourceUnit::Table {
            table: source_spec.identifier.clone(),
            where_clause: options.normalized_where_clause(),
        };
        self.prepare(unit, source_spec.columns, target_table, options, Vec::new())
            .await
    }

    /// Prepares a copy of an arbitrary SELECT. `query_columns` names the
    /// query's output columns in order; when empty the names the driver
    /// reports are used.
    pub async fn copy_from_query(
        &self,
        query: &str,
        target_table: &TableIdentifier,
        query_columns: Vec<String>,
        options: CopyOptions,
    ) -> Result<CopyJob, CopyError> {
        self.ensure_distinct_connections()?;
        validate_options(&options)?;

        let query = trim_query(query);
        let described = self
            .source
            .connection
            .describe_query(&query)
            .await
            .map_err(|e| CopyError::Connection(format!("Failed to describe source query: {}", e)))?;

        let mut warnings = Vec::new();
        let columns = if query_columns.is_empty() {
            described
        } else {
            let mut columns = Vec::with_capacity(query_columns.len());
            for (index, name) in query_columns.iter().enumerate() {
                let name = name.trim();
                let Some(output) = described.get(index) else {
                    warnings.push(format!(
                        "Query column '{}' has no matching output column, skipped",
                        name
                    ));
                    continue;
                };
                let mut column = output.clone();
                column.name = name.to_string();
                column.position = index + 1;
                columns.push(column);
            }
            columns
        };

        self.prepare(
            SourceUnit::Query(query),
            columns,
            target_table,
            options,
            warnings,
        )
        .await
    }

    async fn prepare(
        &self,
        unit: SourceUnit,
        source_columns: Vec<ColumnDef>,
        target_table: &TableIdentifier,
        options: CopyOptions,
        mut warnings: Vec<String>,
    ) -> Result<CopyJob, CopyError> {
        let settings = options.settings.clone();
        let folding = settings.case_folding;
        let creating = options.create_table_type.is_some();

        let mut target_identifier = target_table.clone();
        let existing_columns = if creating || options.skip_target_check {
            None
        } else {
            let Some(spec) = self
                .target
                .catalog
                .resolve_table_spec(target_table)
                .await?
            else {
                return Err(CopyError::TargetNotFound(target_table.to_string()));
            };
            target_identifier = spec.identifier;
            Some(spec.columns)
        };

        let target_columns = match &existing_columns {
            Some(columns) => TargetColumns::Existing(columns),
            None => TargetColumns::Synthesized,
        };
        let (mut mapping, mapping_warnings) = resolve_mapping(
            &source_columns,
            target_columns,
            options.column_mapping.as_deref(),
            folding,
        );
        warnings.extend(mapping_warnings);

        if mapping.is_empty() {
            return Err(CopyError::ColumnMappingEmpty {
                source_unit: unit_label(&unit),
                target: target_identifier.to_string(),
            });
        }

        let key_indexes =
            resolve_key_indexes(&mapping, &options.normalized_key_columns(), &mut warnings);
        if settings.write_mode.requires_keys() && key_indexes.is_empty() {
            return Err(CopyError::MissingKeyColumns {
                mode: settings.write_mode.as_str().to_string(),
                table: target_identifier.to_string(),
            });
        }

        let mut created = false;
        if let Some(create_type) = options.create_table_type {
            let request = ReconcileRequest {
                target_table: target_identifier.clone(),
                create_type,
                drop_policy: options.drop_policy,
                ignore_drop_errors: options.ignore_drop_errors,
                skip_target_check: options.skip_target_check,
                key_columns: key_indexes
                    .iter()
                    .map(|&index| mapping.pairs()[index].target.name.clone())
                    .collect(),
                source_db: self.source.db_type(),
                commit_ddl: !matches!(settings.commit_every, CommitInterval::Never),
            };
            let result = SchemaReconciler::new(&self.target, folding)
                .reconcile(&mut mapping, &request)
                .await?;
            warnings.extend(result.warnings);
            target_identifier = result.table;
            created = true;
        }

        let id = Uuid::new_v4().to_string();
        log::info!(
            "Prepared copy {} from {} to {} ({} columns, mode {})",
            id,
            unit_label(&unit),
            target_identifier,
            mapping.len(),
            settings.write_mode.as_str()
        );

        Ok(CopyJob {
            id,
            source: self.source.clone(),
            target: self.target.clone(),
            unit,
            target_table: target_identifier,
            mapping,
            key_indexes,
            delete_sync: settings.delete_sync && !created,
            created,
            settings,
            setup_warnings: warnings,
            cancel: CancelHandle::new(),
            progress: None,
            commit_nothing: false,
            multi_table: false,
        })
    }
}

fn validate_options(options: &CopyOptions) -> Result<(), CopyError> {
    options.settings.validate().map_err(CopyError::Config)?;
    if let Some(renames) = &options.column_mapping {
        validate_renames(renames).map_err(CopyError::Config)?;
    }
    Ok(())
}

fn unit_label(unit: &SourceUnit) -> String {
    match unit {
        SourceUnit::Table { table, .. } => table.to_string(),
        SourceUnit::Query(_) => "query".to_string(),
    }
}

/// Pair indexes of the key columns: the explicit list when given, the
/// target's primary key otherwise.
fn resolve_key_indexes(
    mapping: &ColumnMapping,
    explicit: &[String],
    warnings: &mut Vec<String>,
) -> Vec<usize> {
    if explicit.is_empty() {
        return mapping
            .pairs()
            .iter()
            .enumerate()
            .filter(|(_, pair)| pair.target.primary_key)
            .map(|(index, _)| index)
            .collect();
    }

    let mut indexes = Vec::new();
    for key in explicit {
        match mapping
            .position_of_target(key)
            .or_else(|| mapping.position_of_source(key))
        {
            Some(index) if !indexes.contains(&index) => indexes.push(index),
            Some(_) => {}
            None => warnings.push(format!("Key column '{}' is not mapped, ignored", key)),
        }
    }
    indexes
}

// =====================================================
// JOB
// =====================================================

pub struct CopyJob {
    id: String,
    source: CopyEndpoint,
    target: CopyEndpoint,
    unit: SourceUnit,
    target_table: TableIdentifier,
    mapping: ColumnMapping,
    key_indexes: Vec<usize>,
    settings: CopySettings,
    created: bool,
    delete_sync: bool,
    setup_warnings: Vec<String>,
    cancel: CancelHandle,
    progress: Option<ProgressCallback>,
    commit_nothing: bool,
    multi_table: bool,
}

impl CopyJob {
    /// Called with `(current_row, total_estimate)` every
    /// `progress_interval` rows and once at the end.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(u64, Option<u64>) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub fn on_progress(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn stop(&self) {
        self.cancel.stop();
    }

    /// The caller owns the target transaction; nothing is committed.
    pub fn commit_nothing(&mut self) {
        self.commit_nothing = true;
    }

    pub fn begin_multi_table(&mut self) {
        self.multi_table = true;
    }

    pub fn end_multi_table(&mut self) {
        self.multi_table = false;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn target_table(&self) -> &TableIdentifier {
        &self.target_table
    }

    pub fn source_unit(&self) -> &SourceUnit {
        &self.unit
    }

    pub fn created_target(&self) -> bool {
        self.created
    }

    pub fn delete_sync_enabled(&self) -> bool {
        self.delete_sync
    }

    pub fn key_columns(&self) -> Vec<String> {
        self.key_indexes
            .iter()
            .map(|&index| self.mapping.pairs()[index].target.name.clone())
            .collect()
    }

    pub(crate) fn target_endpoint(&self) -> &CopyEndpoint {
        &self.target
    }

    fn commits_enabled(&self) -> bool {
        !self.commit_nothing
            && !self.multi_table
            && !matches!(self.settings.commit_every, CommitInterval::Never)
    }

    fn select_sql(&self) -> String {
        match &self.unit {
            SourceUnit::Table {
                table,
                where_clause,
            } => {
                let columns = self
                    .mapping
                    .pairs()
                    .iter()
                    .map(|pair| self.source.ddl.quote_identifier(&pair.source.name))
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut sql = format!(
                    "SELECT {} FROM {}",
                    columns,
                    self.source.ddl.qualified_table_name(table)
                );
                if let Some(where_clause) = where_clause {
                    sql.push_str(" WHERE ");
                    sql.push_str(where_clause);
                }
                sql
            }
            SourceUnit::Query(query) => query.clone(),
        }
    }

    async fn estimate_rows(&self) -> Option<u64> {
        self.progress.as_ref()?;
        let SourceUnit::Table {
            table,
            where_clause,
        } = &self.unit
        else {
            return None;
        };

        let mut sql = format!(
            "SELECT COUNT(*) FROM {}",
            self.source.ddl.qualified_table_name(table)
        );
        if let Some(where_clause) = where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(where_clause);
        }

        let rows = match self.source.connection.execute_query(&sql).await {
            Ok(cursor) => cursor.collect_rows().await,
            Err(e) => Err(e),
        };
        match rows {
            Ok(rows) => rows
                .first()
                .and_then(|row| row.first())
                .and_then(|value| match value {
                    Value::Number(number) => number.as_u64(),
                    Value::String(text) => text.parse().ok(),
                    _ => None,
                }),
            Err(e) => {
                log::debug!("Row estimate for {} unavailable: {}", table, e);
                None
            }
        }
    }

    /// Empties the target before streaming. Skipped for a table this job
    /// just created.
    async fn clear_target(&self) -> Result<(), String> {
        let sql = match self.settings.delete_target {
            DeleteTargetPolicy::None => return Ok(()),
            _ if self.created => return Ok(()),
            DeleteTargetPolicy::Delete => format!(
                "DELETE FROM {}",
                self.target.ddl.qualified_table_name(&self.target_table)
            ),
            DeleteTargetPolicy::Truncate => {
                self.target.ddl.render_truncate_table(&self.target_table)
            }
        };
        log::info!("Clearing target table: {}", sql);

        let connection = &self.target.connection;
        if let Err(e) = connection.execute_update(&sql).await {
            if self.commits_enabled() {
                if let Err(rollback_error) = connection.rollback().await {
                    log::warn!("Rollback after failed clear failed: {}", rollback_error);
                }
            }
            return Err(format!(
                "Failed to clear target table {}: {}",
                self.target_table, e
            ));
        }
        if self.commits_enabled() {
            connection.commit().await?;
        }
        Ok(())
    }

    fn sync_keys(&self) -> Vec<SyncKey> {
        self.key_indexes
            .iter()
            .map(|&index| {
                let pair = &self.mapping.pairs()[index];
                SyncKey {
                    source: pair.source.clone(),
                    target: pair.target.clone(),
                }
            })
            .collect()
    }

    async fn run_delete_sync(&self, outcome: &mut Outcome) {
        let keys = self.sync_keys();
        if keys.is_empty() {
            log::warn!("Delete-sync for {} has no usable key", self.target_table);
            outcome.push_warning_once(CopyError::NoUsableKeyForSync.to_string());
            return;
        }

        let scope = match &self.unit {
            SourceUnit::Table {
                table,
                where_clause,
            } => SourceKeyScope::Table {
                table: table.clone(),
                where_clause: where_clause.clone(),
            },
            SourceUnit::Query(query) => SourceKeyScope::Query(query.clone()),
        };

        let mut synchronizer = DeleteSynchronizer::new(
            &self.source,
            &self.target,
            self.settings.batch_size,
            self.settings.transaction_policy(),
        );
        if !self.commits_enabled() {
            synchronizer = synchronizer.commit_nothing();
        }

        match synchronizer
            .synchronize(&scope, &self.target_table, &keys)
            .await
        {
            Ok(report) if report.status == DeleteSyncStatus::NoUsableKey => {
                outcome.push_warning_once(CopyError::NoUsableKeyForSync.to_string());
            }
            Ok(report) => outcome.deleted_rows += report.deleted_rows,
            Err(e) => outcome.fail(e.to_string()),
        }
    }

    async fn adjust_sequences(&self, outcome: &mut Outcome) {
        let connection = &self.target.connection;
        let mut adjusted = false;
        for pair in self.mapping.pairs() {
            let Some(sql) = self
                .target
                .ddl
                .render_sequence_adjustment(&self.target_table, &pair.target)
            else {
                continue;
            };
            log::debug!("Adjusting sequence: {}", sql);
            match connection.execute_update(&sql).await {
                Ok(_) => adjusted = true,
                Err(e) => outcome.push_warning_once(format!(
                    "Failed to adjust sequence of {}.{}: {}",
                    self.target_table, pair.target.name, e
                )),
            }
        }
        if adjusted && self.commits_enabled() {
            if let Err(e) = connection.commit().await {
                outcome.push_warning_once(format!("Failed to commit sequence adjustment: {}", e));
            }
        }
    }

    /// Streams the source into the target. Row-level failures and
    /// cancellation end up in the returned Outcome.
    pub async fn start_copy(&mut self) -> Outcome {
        let mut outcome = Outcome::new();
        outcome.append_warnings(&self.setup_warnings);
        log::info!(
            "Starting copy {} from {} to {}",
            self.id,
            unit_label(&self.unit),
            self.target_table
        );

        if let Err(e) = self.clear_target().await {
            outcome.fail(e);
            outcome.finish();
            return outcome;
        }

        let total_estimate = self.estimate_rows().await;
        let statements = StatementBuilder::new(
            self.target.ddl.clone(),
            &self.target_table,
            &self.mapping.target_columns(),
            self.key_indexes.clone(),
            self.settings.trim_char_data,
        );
        let mut writer = TableWriter::new(
            self.target.connection.clone(),
            statements,
            self.settings.write_mode,
            self.settings.transaction_policy(),
            self.settings.batch_size,
        );
        if self.commit_nothing {
            writer.commit_nothing();
        }
        if self.multi_table {
            writer.begin_multi_table();
        }

        let mut source = RowSource::new(
            self.source.connection.clone(),
            &self.select_sql(),
            self.cancel.clone(),
        )
        .with_abort_on_error(!self.settings.continue_on_error)
        .with_progress(
            self.progress.clone(),
            self.settings.progress_interval,
            total_estimate,
        );
        if matches!(self.unit, SourceUnit::Query(_)) {
            source = source.with_projection(self.mapping.source_row_indexes());
        }

        let result = source.start(&mut writer).await;

        let counts = writer.counts();
        outcome.affected_rows = counts.affected;
        outcome.inserted_rows = counts.inserted;
        outcome.updated_rows = counts.updated;
        outcome.errors.extend(writer.rejected_rows().iter().cloned());

        match result {
            Ok(SourceEnd::Finished) | Ok(SourceEnd::Stopped) => {}
            Ok(SourceEnd::Cancelled) => {
                outcome.mark_cancelled();
                outcome.finish();
                log::info!(
                    "Copy to {} cancelled, {} rows kept",
                    self.target_table,
                    outcome.affected_rows
                );
                return outcome;
            }
            Err(e) => {
                log::error!("Copy {} to {} failed: {}", self.id, self.target_table, e);
                outcome.fail(e.to_string());
                outcome.finish();
                return outcome;
            }
        }

        if self.delete_sync {
            self.run_delete_sync(&mut outcome).await;
        }
        if self.settings.adjust_sequences && outcome.success {
            self.adjust_sequences(&mut outcome).await;
        }

        outcome.finish();
        log::info!(
            "Copy {} to {} finished: {} affected, {} inserted, {} updated, {} deleted, {} rejected",
            self.id,
            self.target_table,
            outcome.affected_rows,
            outcome.inserted_rows,
            outcome.updated_rows,
            outcome.deleted_rows,
            outcome.errors.len()
        );
        outcome
    }

    /// Runs the job on its own task. The returned handle polls, cancels and
    /// joins it.
    pub fn spawn(self) -> CopyTask {
        let cancel = self.cancel.clone();
        let mut job = self;
        let handle = tokio::spawn(async move { job.start_copy().await });
        CopyTask { handle, cancel }
    }
}

// =====================================================
// BACKGROUND TASK
// =====================================================

pub struct CopyTask {
    handle: JoinHandle<Outcome>,
    cancel: CancelHandle,
}

impl CopyTask {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn stop(&self) {
        self.cancel.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn rows_processed(&self) -> u64 {
        self.cancel.rows_processed()
    }

    /// Waits for the job. A panicked or aborted task becomes a failed Outcome.
    pub async fn join(self) -> Outcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Copy task ended abnormally: {}", e);
                Outcome::failed(format!("Copy task failed: {}", e))
            }
        }
    }
}
