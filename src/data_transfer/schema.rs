// =====================================================
// SCHEMA RECONCILER
// Drops and creates the target table for a copy
// =====================================================

use crate::data_transfer::error::CopyError;
use crate::data_transfer::mapper::ColumnMapping;
use crate::data_transfer::models::DropPolicy;
use crate::db::connection::CopyEndpoint;
use crate::db::dialect::CreateTableType;
use crate::db::sql_utils::is_plain_identifier;
use crate::db_types::{CaseFolding, ColumnDef, DatabaseType, TableIdentifier, TableSpec};

#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub target_table: TableIdentifier,
    pub create_type: CreateTableType,
    pub drop_policy: DropPolicy,
    pub ignore_drop_errors: bool,
    pub skip_target_check: bool,
    /// Target-side names marked as primary key in the new table.
    pub key_columns: Vec<String>,
    pub source_db: DatabaseType,
    /// False when the caller owns the target transaction: DDL is neither
    /// committed nor rolled back here.
    pub commit_ddl: bool,
}

#[derive(Debug, Clone)]
pub struct ReconcileResult {
    /// Identifier as the target catalog reports it after creation.
    pub table: TableIdentifier,
    pub warnings: Vec<String>,
}

pub struct SchemaReconciler<'a> {
    target: &'a CopyEndpoint,
    folding: CaseFolding,
}

impl<'a> SchemaReconciler<'a> {
    pub fn new(target: &'a CopyEndpoint, folding: CaseFolding) -> Self {
        Self { target, folding }
    }

    /// Name as the target stores it. Plain identifiers take the target's
    /// case when crossing vendors; anything else is kept verbatim.
    fn target_identifier_name(&self, name: &str, source_db: DatabaseType) -> String {
        if source_db != self.target.db_type() && is_plain_identifier(name) {
            self.target.ddl.fold_identifier_case(name)
        } else {
            name.to_string()
        }
    }

    async fn execute_ddl(&self, sql: &str, commit: bool) -> Result<(), String> {
        self.target.connection.execute_update(sql).await?;
        if commit {
            self.target.connection.commit().await?;
        }
        Ok(())
    }

    async fn drop_existing(
        &self,
        request: &ReconcileRequest,
        warnings: &mut Vec<String>,
    ) -> Result<(), CopyError> {
        let existing = if request.skip_target_check {
            Some(request.target_table.clone())
        } else {
            self.target
                .catalog
                .resolve_table(&request.target_table)
                .await?
        };
        let Some(existing) = existing else {
            log::debug!(
                "Target table {} does not exist, nothing to drop",
                request.target_table
            );
            return Ok(());
        };

        let cascade = request.drop_policy == DropPolicy::Cascade;
        let sql = self.target.ddl.render_drop_table(&existing, cascade);
        log::info!("Dropping target table: {}", sql);

        let dropped = self.execute_ddl(&sql, request.commit_ddl).await;

        if let Err(message) = dropped {
            if request.commit_ddl {
                if let Err(e) = self.target.connection.rollback().await {
                    log::warn!("Rollback after failed drop failed: {}", e);
                }
            }
            if !request.ignore_drop_errors {
                return Err(CopyError::DropFailed {
                    table: existing.to_string(),
                    message,
                });
            }
            log::warn!("Ignoring failed drop of {}: {}", existing, message);
            warnings.push(format!(
                "Could not drop table {}, continuing: {}",
                existing, message
            ));
        }
        Ok(())
    }

    fn build_table_spec(&self, mapping: &ColumnMapping, request: &ReconcileRequest) -> TableSpec {
        let mut identifier = request.target_table.clone();
        identifier.table = self.target_identifier_name(&identifier.table, request.source_db);

        let columns = mapping
            .pairs()
            .iter()
            .enumerate()
            .map(|(index, pair)| {
                let is_key = request
                    .key_columns
                    .iter()
                    .any(|key| self.folding.matches(key, &pair.target.name));
                let mut column: ColumnDef = pair.target.clone();
                column.name = self.target_identifier_name(&column.name, request.source_db);
                column.position = index + 1;
                column.primary_key = is_key;
                if is_key {
                    column.nullable = false;
                }
                column
            })
            .collect();

        TableSpec::new(identifier, columns)
    }

    /// Drops (when asked) and creates the target table, then rewrites the
    /// mapping's target side with the columns the table actually has.
    pub async fn reconcile(
        &self,
        mapping: &mut ColumnMapping,
        request: &ReconcileRequest,
    ) -> Result<ReconcileResult, CopyError> {
        let mut warnings = Vec::new();

        if request.drop_policy != DropPolicy::None {
            self.drop_existing(request, &mut warnings).await?;
        }

        let spec = self.build_table_spec(mapping, request);
        let ddl = self
            .target
            .ddl
            .render_create_table(&spec, request.create_type, request.source_db);
        log::info!("Creating target table: {}", ddl);

        let created = self.execute_ddl(&ddl, request.commit_ddl).await;
        if let Err(message) = created {
            if request.commit_ddl {
                if let Err(e) = self.target.connection.rollback().await {
                    log::warn!("Rollback after failed create failed: {}", e);
                }
            }
            return Err(CopyError::CreateFailed {
                table: spec.identifier.to_string(),
                message,
            });
        }

        let Some(actual) = self.target.catalog.resolve_table_spec(&spec.identifier).await? else {
            return Err(CopyError::CreateFailed {
                table: spec.identifier.to_string(),
                message: "table not found after CREATE".to_string(),
            });
        };

        for index in 0..mapping.len() {
            let requested = &spec.columns[index];
            let found = actual
                .columns
                .iter()
                .find(|column| CaseFolding::Insensitive.matches(&column.name, &requested.name))
                .or_else(|| actual.columns.get(index))
                .cloned();
            if let Some(column) = found {
                mapping.set_target(index, column);
            }
        }

        Ok(ReconcileResult {
            table: actual.identifier,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests;
