use super::*;
use crate::data_transfer::mapper::{resolve_mapping, ColumnRename, TargetColumns};
use crate::db::connection::{Catalog, Connection};
use crate::db::dialect::dialect_for;
use crate::sqlite::SqliteDatabase;
use std::sync::Arc;

async fn target_endpoint() -> (Arc<SqliteDatabase>, CopyEndpoint) {
    let db = Arc::new(SqliteDatabase::connect_in_memory().await.unwrap());
    let endpoint = CopyEndpoint::from_database(db.clone());
    (db, endpoint)
}

fn source_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("id", "INTEGER").with_position(1),
        ColumnDef::new("name", "VARCHAR")
            .with_size(Some(30), None)
            .with_position(2),
    ]
}

fn request(table: &str) -> ReconcileRequest {
    ReconcileRequest {
        target_table: TableIdentifier::new(table),
        create_type: CreateTableType::Default,
        drop_policy: DropPolicy::None,
        ignore_drop_errors: false,
        skip_target_check: false,
        key_columns: vec!["id".to_string()],
        source_db: DatabaseType::SQLite,
        commit_ddl: true,
    }
}

#[tokio::test]
async fn test_creates_table_and_reads_back_columns() {
    let (db, endpoint) = target_endpoint().await;
    let (mut mapping, _) = resolve_mapping(
        &source_columns(),
        TargetColumns::Synthesized,
        None,
        CaseFolding::Insensitive,
    );

    let reconciler = SchemaReconciler::new(&endpoint, CaseFolding::Insensitive);
    let result = reconciler.reconcile(&mut mapping, &request("dst")).await.unwrap();

    assert_eq!(result.table.table, "dst");
    assert!(result.warnings.is_empty());
    let columns = db.resolve_columns(&result.table).await.unwrap();
    assert_eq!(columns.len(), 2);
    assert!(columns[0].primary_key);
    assert_eq!(mapping.pairs()[1].target.size, Some(30));
    assert!(mapping.pairs()[0].target.primary_key);
}

#[tokio::test]
async fn test_mapping_takes_created_names() {
    let (_db, endpoint) = target_endpoint().await;
    let renames = vec![ColumnRename::new("id", "Key"), ColumnRename::new("name", "Label")];
    let (mut mapping, _) = resolve_mapping(
        &source_columns(),
        TargetColumns::Synthesized,
        Some(&renames),
        CaseFolding::Insensitive,
    );

    let reconciler = SchemaReconciler::new(&endpoint, CaseFolding::Insensitive);
    let mut req = request("renamed");
    req.key_columns = vec!["key".to_string()];
    reconciler.reconcile(&mut mapping, &req).await.unwrap();

    assert_eq!(mapping.target_names(), vec!["Key", "Label"]);
    assert!(mapping.pairs()[0].target.primary_key);
}

#[tokio::test]
async fn test_drop_then_create_replaces_table() {
    let (db, endpoint) = target_endpoint().await;
    db.execute_script("CREATE TABLE dst (old_column TEXT)")
        .await
        .unwrap();
    let (mut mapping, _) = resolve_mapping(
        &source_columns(),
        TargetColumns::Synthesized,
        None,
        CaseFolding::Insensitive,
    );

    let mut req = request("dst");
    req.drop_policy = DropPolicy::Cascade;
    SchemaReconciler::new(&endpoint, CaseFolding::Insensitive)
        .reconcile(&mut mapping, &req)
        .await
        .unwrap();

    let columns = db.resolve_columns(&TableIdentifier::new("dst")).await.unwrap();
    assert_eq!(columns[0].name, "id");
}

#[tokio::test]
async fn test_create_failure_is_reported() {
    let (db, endpoint) = target_endpoint().await;
    db.execute_script("CREATE TABLE dst (id INTEGER)").await.unwrap();
    let (mut mapping, _) = resolve_mapping(
        &source_columns(),
        TargetColumns::Synthesized,
        None,
        CaseFolding::Insensitive,
    );

    let error = SchemaReconciler::new(&endpoint, CaseFolding::Insensitive)
        .reconcile(&mut mapping, &request("dst"))
        .await
        .unwrap_err();
    assert!(matches!(error, CopyError::CreateFailed { .. }));
    assert!(error.is_fatal_setup());
}

#[tokio::test]
async fn test_drop_failure_fatal_unless_ignored() {
    let (_db, endpoint) = target_endpoint().await;
    let (mut mapping, _) = resolve_mapping(
        &source_columns(),
        TargetColumns::Synthesized,
        None,
        CaseFolding::Insensitive,
    );

    // Without a catalog check the drop runs against a missing table.
    let mut req = request("fresh");
    req.drop_policy = DropPolicy::Regular;
    req.skip_target_check = true;

    let reconciler = SchemaReconciler::new(&endpoint, CaseFolding::Insensitive);
    let error = reconciler.reconcile(&mut mapping, &req).await.unwrap_err();
    assert!(matches!(error, CopyError::DropFailed { .. }));

    req.ignore_drop_errors = true;
    let result = reconciler.reconcile(&mut mapping, &req).await.unwrap();
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.table.table, "fresh");
}

#[tokio::test]
async fn test_cross_vendor_names_follow_target_case() {
    let (_db, endpoint) = target_endpoint().await;
    let endpoint = endpoint.with_ddl(Arc::new(dialect_for(DatabaseType::PostgreSQL)));
    let source = vec![
        ColumnDef::new("UserId", "INT").with_position(1),
        ColumnDef::new("Full Name", "VARCHAR").with_position(2),
    ];
    let (mapping, _) = resolve_mapping(
        &source,
        TargetColumns::Synthesized,
        None,
        CaseFolding::Insensitive,
    );

    let mut req = request("Accounts");
    req.source_db = DatabaseType::MySQL;
    req.key_columns = vec!["userid".to_string()];
    let spec = SchemaReconciler::new(&endpoint, CaseFolding::Insensitive)
        .build_table_spec(&mapping, &req);

    assert_eq!(spec.identifier.table, "accounts");
    assert_eq!(spec.columns[0].name, "userid");
    assert!(spec.columns[0].primary_key);
    assert_eq!(spec.columns[1].name, "Full Name");
}

#[tokio::test]
async fn test_caller_transaction_is_not_committed() {
    let (db, endpoint) = target_endpoint().await;
    db.execute_script("CREATE TABLE audit (note TEXT)").await.unwrap();
    db.execute_update("INSERT INTO audit VALUES ('pending')")
        .await
        .unwrap();
    let (mut mapping, _) = resolve_mapping(
        &source_columns(),
        TargetColumns::Synthesized,
        None,
        CaseFolding::Insensitive,
    );

    let mut req = request("dst");
    req.commit_ddl = false;
    SchemaReconciler::new(&endpoint, CaseFolding::Insensitive)
        .reconcile(&mut mapping, &req)
        .await
        .unwrap();

    assert!(db.in_transaction().await);
    db.rollback().await.unwrap();
    let pending = db
        .execute_query("SELECT COUNT(*) FROM audit")
        .await
        .unwrap()
        .collect_rows()
        .await
        .unwrap();
    assert_eq!(pending, vec![vec![serde_json::json!(0)]]);
    assert!(db.resolve_table(&TableIdentifier::new("dst")).await.unwrap().is_none());
}
