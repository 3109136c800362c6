use super::*;
use crate::sqlite::SqliteDatabase;
use serde_json::json;

async fn endpoint_with(script: &str) -> (Arc<SqliteDatabase>, CopyEndpoint) {
    let db = Arc::new(SqliteDatabase::connect_in_memory().await.unwrap());
    db.execute_script(script).await.unwrap();
    let endpoint = CopyEndpoint::from_database(db.clone());
    (db, endpoint)
}

fn id_key() -> Vec<SyncKey> {
    vec![SyncKey {
        source: ColumnDef::new("id", "INTEGER").with_position(1),
        target: ColumnDef::new("id", "INTEGER"),
    }]
}

async fn target_ids(db: &SqliteDatabase) -> Vec<Value> {
    db.execute_query("SELECT id FROM dst ORDER BY id")
        .await
        .unwrap()
        .collect_rows()
        .await
        .unwrap()
        .into_iter()
        .map(|mut row| row.remove(0))
        .collect()
}

#[test]
fn test_key_token_normalizes_types() {
    assert_eq!(
        build_key_token(&[json!(1), json!("a")]).unwrap(),
        build_key_token(&[json!("1"), json!("a")]).unwrap()
    );
    assert_ne!(
        build_key_token(&[Value::Null]).unwrap(),
        build_key_token(&[json!("")]).unwrap()
    );
    assert_eq!(
        build_key_token(&[json!(true)]).unwrap(),
        build_key_token(&[json!(1)]).unwrap()
    );
}

#[tokio::test]
async fn test_deletes_target_only_keys() {
    let (_src_db, source) =
        endpoint_with("CREATE TABLE src (id INTEGER); INSERT INTO src VALUES (2), (3), (4);").await;
    let (dst_db, target) =
        endpoint_with("CREATE TABLE dst (id INTEGER); INSERT INTO dst VALUES (1), (2), (3), (4);")
            .await;

    let report = DeleteSynchronizer::new(&source, &target, 100, TransactionPolicy::default())
        .synchronize(
            &SourceKeyScope::Table {
                table: TableIdentifier::new("src"),
                where_clause: None,
            },
            &TableIdentifier::new("dst"),
            &id_key(),
        )
        .await
        .unwrap();

    assert_eq!(report.status, DeleteSyncStatus::Ok);
    assert_eq!(report.deleted_rows, 1);
    assert_eq!(target_ids(&dst_db).await, vec![json!(2), json!(3), json!(4)]);
    assert!(!dst_db.in_transaction().await);
}

#[tokio::test]
async fn test_where_clause_limits_source_keys() {
    let (_src_db, source) =
        endpoint_with("CREATE TABLE src (id INTEGER); INSERT INTO src VALUES (1), (2), (3);").await;
    let (dst_db, target) =
        endpoint_with("CREATE TABLE dst (id INTEGER); INSERT INTO dst VALUES (1), (2), (3);").await;

    let report = DeleteSynchronizer::new(&source, &target, 1, TransactionPolicy::default())
        .synchronize(
            &SourceKeyScope::Table {
                table: TableIdentifier::new("src"),
                where_clause: Some("id > 1".to_string()),
            },
            &TableIdentifier::new("dst"),
            &id_key(),
        )
        .await
        .unwrap();

    assert_eq!(report.deleted_rows, 1);
    assert_eq!(target_ids(&dst_db).await, vec![json!(2), json!(3)]);
}

#[tokio::test]
async fn test_query_scope_and_batched_deletes() {
    let (_src_db, source) =
        endpoint_with("CREATE TABLE src (id INTEGER); INSERT INTO src VALUES (5);").await;
    let (dst_db, target) = endpoint_with(
        "CREATE TABLE dst (id INTEGER); INSERT INTO dst VALUES (1), (2), (3), (4), (5);",
    )
    .await;

    let report = DeleteSynchronizer::new(&source, &target, 2, TransactionPolicy::default())
        .synchronize(
            &SourceKeyScope::Query("SELECT id FROM src;".to_string()),
            &TableIdentifier::new("dst"),
            &id_key(),
        )
        .await
        .unwrap();

    assert_eq!(report.deleted_rows, 4);
    assert_eq!(target_ids(&dst_db).await, vec![json!(5)]);
}

#[tokio::test]
async fn test_query_scope_reads_keys_by_position() {
    let (_src_db, source) = endpoint_with(
        "CREATE TABLE src (label TEXT, id INTEGER); INSERT INTO src VALUES ('b', 2), ('c', 3);",
    )
    .await;
    let (dst_db, target) =
        endpoint_with("CREATE TABLE dst (id INTEGER); INSERT INTO dst VALUES (1), (2), (3);").await;
    let keys = vec![SyncKey {
        source: ColumnDef::new("renamed_key", "INTEGER").with_position(2),
        target: ColumnDef::new("id", "INTEGER"),
    }];

    let report = DeleteSynchronizer::new(&source, &target, 10, TransactionPolicy::default())
        .synchronize(
            &SourceKeyScope::Query("SELECT label, id FROM src".to_string()),
            &TableIdentifier::new("dst"),
            &keys,
        )
        .await
        .unwrap();

    assert_eq!(report.deleted_rows, 1);
    assert_eq!(target_ids(&dst_db).await, vec![json!(2), json!(3)]);
}

#[tokio::test]
async fn test_query_scope_without_position_is_unusable() {
    let (_src_db, source) = endpoint_with("CREATE TABLE src (id INTEGER);").await;
    let (dst_db, target) =
        endpoint_with("CREATE TABLE dst (id INTEGER); INSERT INTO dst VALUES (1);").await;
    let keys = vec![SyncKey {
        source: ColumnDef::new("id", "INTEGER"),
        target: ColumnDef::new("id", "INTEGER"),
    }];

    let report = DeleteSynchronizer::new(&source, &target, 10, TransactionPolicy::default())
        .synchronize(
            &SourceKeyScope::Query("SELECT id FROM src".to_string()),
            &TableIdentifier::new("dst"),
            &keys,
        )
        .await
        .unwrap();

    assert_eq!(report.status, DeleteSyncStatus::NoUsableKey);
    assert_eq!(target_ids(&dst_db).await, vec![json!(1)]);
}

#[tokio::test]
async fn test_no_usable_key_skips_deletion() {
    let (_src_db, source) = endpoint_with("CREATE TABLE src (id INTEGER);").await;
    let (dst_db, target) =
        endpoint_with("CREATE TABLE dst (id INTEGER); INSERT INTO dst VALUES (1);").await;

    let report = DeleteSynchronizer::new(&source, &target, 10, TransactionPolicy::default())
        .synchronize(
            &SourceKeyScope::Table {
                table: TableIdentifier::new("src"),
                where_clause: None,
            },
            &TableIdentifier::new("dst"),
            &[],
        )
        .await
        .unwrap();

    assert_eq!(report.status, DeleteSyncStatus::NoUsableKey);
    assert_eq!(report.deleted_rows, 0);
    assert_eq!(target_ids(&dst_db).await, vec![json!(1)]);
}

#[tokio::test]
async fn test_commit_nothing_keeps_deletes_uncommitted() {
    let (_src_db, source) = endpoint_with("CREATE TABLE src (id INTEGER);").await;
    let (dst_db, target) =
        endpoint_with("CREATE TABLE dst (id INTEGER); INSERT INTO dst VALUES (1);").await;

    let report = DeleteSynchronizer::new(&source, &target, 10, TransactionPolicy::default())
        .commit_nothing()
        .synchronize(
            &SourceKeyScope::Table {
                table: TableIdentifier::new("src"),
                where_clause: None,
            },
            &TableIdentifier::new("dst"),
            &id_key(),
        )
        .await
        .unwrap();

    assert_eq!(report.deleted_rows, 1);
    assert!(dst_db.in_transaction().await);
    dst_db.rollback().await.unwrap();
    assert_eq!(target_ids(&dst_db).await, vec![json!(1)]);
}
