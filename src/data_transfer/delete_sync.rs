// =====================================================
// DELETE SYNCHRONIZER
// Removes target rows whose key no longer exists in the source
// =====================================================

use crate::data_transfer::error::CopyError;
use crate::data_transfer::models::{CommitInterval, TransactionPolicy};
use crate::data_transfer::statements::StatementBuilder;
use crate::db::connection::{Connection, CopyEndpoint};
use crate::db::sql_utils::value_to_text;
use crate::db_types::{ColumnDef, TableIdentifier};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteSyncStatus {
    Ok,
    NoUsableKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteSyncReport {
    pub status: DeleteSyncStatus,
    pub deleted_rows: u64,
}

impl DeleteSyncReport {
    fn no_usable_key() -> Self {
        Self {
            status: DeleteSyncStatus::NoUsableKey,
            deleted_rows: 0,
        }
    }
}

/// Key column on both sides of the copy.
#[derive(Debug, Clone)]
pub struct SyncKey {
    pub source: ColumnDef,
    pub target: ColumnDef,
}

/// Source rows restricted to the key columns.
pub enum SourceKeyScope {
    Table {
        table: TableIdentifier,
        where_clause: Option<String>,
    },
    /// Keys are read from the query's output by each key's `position`.
    Query(String),
}

/// Token comparing key tuples across vendors: every value is reduced to its
/// text form, NULL stays distinct from the empty string.
pub fn build_key_token(values: &[Value]) -> Result<String, String> {
    let normalized = values
        .iter()
        .map(|value| match value {
            Value::Null => None,
            Value::Bool(b) => Some(if *b { "1".to_string() } else { "0".to_string() }),
            other => Some(value_to_text(other)),
        })
        .collect::<Vec<Option<String>>>();
    serde_json::to_string(&normalized).map_err(|e| format!("Failed to serialize key token: {}", e))
}

pub struct DeleteSynchronizer<'a> {
    source: &'a CopyEndpoint,
    target: &'a CopyEndpoint,
    batch_size: usize,
    policy: TransactionPolicy,
    commit_enabled: bool,
}

impl<'a> DeleteSynchronizer<'a> {
    pub fn new(
        source: &'a CopyEndpoint,
        target: &'a CopyEndpoint,
        batch_size: usize,
        policy: TransactionPolicy,
    ) -> Self {
        Self {
            source,
            target,
            batch_size: batch_size.max(1),
            commit_enabled: !matches!(policy.commit_every, CommitInterval::Never),
            policy,
        }
    }

    pub fn commit_nothing(mut self) -> Self {
        self.commit_enabled = false;
        self
    }

    fn source_key_sql(
        &self,
        table: &TableIdentifier,
        where_clause: Option<&str>,
        keys: &[SyncKey],
    ) -> String {
        let columns = keys
            .iter()
            .map(|key| self.source.ddl.quote_identifier(&key.source.name))
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

    async fn load_source_tokens(
        &self,
        scope: &SourceKeyScope,
        keys: &[SyncKey],
    ) -> Result<HashSet<String>, CopyError> {
        let (sql, projection) = match scope {
            SourceKeyScope::Table {
                table,
                where_clause,
            } => (
                self.source_key_sql(table, where_clause.as_deref(), keys),
                None,
            ),
            SourceKeyScope::Query(query) => (
                query.trim().trim_end_matches(';').to_string(),
                Some(
                    keys.iter()
                        .map(|key| key.source.position.saturating_sub(1))
                        .collect::<Vec<_>>(),
                ),
            ),
        };
        log::debug!("Loading source keys: {}", sql);

        let mut cursor = self.source.connection.execute_query(&sql).await?;
        let mut tokens = HashSet::new();
        while let Some(row) = cursor.next_row().await? {
            let token = match &projection {
                Some(indexes) => build_key_token(
                    &indexes
                        .iter()
                        .map(|&index| row.get(index).cloned().unwrap_or(Value::Null))
                        .collect::<Vec<_>>(),
                )?,
                None => build_key_token(&row)?,
            };
            tokens.insert(token);
        }
        Ok(tokens)
    }

    async fn commit(&self, connection: &Arc<dyn Connection>) -> Result<(), CopyError> {
        if self.commit_enabled {
            connection.commit().await?;
        }
        Ok(())
    }

    /// Deletes target rows whose key is missing from the source. Runs a
    /// full key diff; nothing is deleted when the key set is unusable.
    pub async fn synchronize(
        &self,
        scope: &SourceKeyScope,
        target_table: &TableIdentifier,
        keys: &[SyncKey],
    ) -> Result<DeleteSyncReport, CopyError> {
        let by_position = matches!(scope, SourceKeyScope::Query(_));
        if keys.is_empty()
            || keys.iter().any(|key| {
                key.source.name.trim().is_empty()
                    || key.target.name.trim().is_empty()
                    || (by_position && key.source.position == 0)
            })
        {
            log::warn!("Delete-sync for {} has no usable key", target_table);
            return Ok(DeleteSyncReport::no_usable_key());
        }

        let source_tokens = self.load_source_tokens(scope, keys).await?;

        let target_columns = keys.iter().map(|key| key.target.clone()).collect::<Vec<_>>();
        let statements = StatementBuilder::new(
            self.target.ddl.clone(),
            target_table,
            &target_columns,
            (0..target_columns.len()).collect(),
            false,
        );
        let target_sql = format!(
            "SELECT {} FROM {}",
            target_columns
                .iter()
                .map(|column| self.target.ddl.quote_identifier(&column.name))
                .collect::<Vec<_>>()
                .join(", "),
            statements.table_ref()
        );
        log::debug!("Loading target keys: {}", target_sql);
        let target_rows = self
            .target
            .connection
            .execute_query(&target_sql)
            .await?
            .collect_rows()
            .await?;

        let mut orphans = Vec::new();
        for row in target_rows {
            if !source_tokens.contains(&build_key_token(&row)?) {
                orphans.push(row);
            }
        }

        let connection = &self.target.connection;
        let mut deleted_rows = 0u64;
        let mut since_commit = 0u64;
        for chunk in orphans.chunks(self.batch_size) {
            let Some(sql) = statements.delete_by_keys(chunk)? else {
                continue;
            };
            let deleted = match connection.execute_update(&sql).await {
                Ok(count) => count,
                Err(e) => {
                    if self.commit_enabled {
                        if let Err(rollback_error) = connection.rollback().await {
                            log::warn!("Rollback after failed delete-sync failed: {}", rollback_error);
                        }
                    }
                    return Err(CopyError::Connection(format!(
                        "Failed to delete rows missing from the source: {}",
                        e
                    )));
                }
            };
            deleted_rows += deleted;
            since_commit += chunk.len() as u64;

            let due = match self.policy.commit_every {
                CommitInterval::Batch => true,
                CommitInterval::Rows(interval) => since_commit >= interval,
                CommitInterval::AtEnd | CommitInterval::Never => false,
            };
            if due {
                self.commit(connection).await?;
                since_commit = 0;
            }
        }
        self.commit(connection).await?;

        log::info!("Delete-sync removed {} rows from {}", deleted_rows, target_table);
        Ok(DeleteSyncReport {
            status: DeleteSyncStatus::Ok,
            deleted_rows,
        })
    }
}

#[cfg(test)]
mod tests;
