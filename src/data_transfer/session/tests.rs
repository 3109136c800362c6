use super::*;
use crate::data_transfer::engine::CopyOrchestrator;
use crate::data_transfer::models::CopyOptions;
use crate::db::connection::CopyEndpoint;
use crate::db_types::TableIdentifier;
use crate::sqlite::SqliteDatabase;
use serde_json::{json, Value};

async fn setup() -> (Arc<SqliteDatabase>, CopyOrchestrator) {
    let source = Arc::new(SqliteDatabase::connect_in_memory().await.unwrap());
    source
        .execute_script(
            "CREATE TABLE a (id INTEGER PRIMARY KEY, v TEXT);
             INSERT INTO a VALUES (1, 'x'), (2, 'y');
             CREATE TABLE b (id INTEGER PRIMARY KEY, v TEXT);
             INSERT INTO b VALUES (1, NULL);",
        )
        .await
        .unwrap();
    let target = Arc::new(SqliteDatabase::connect_in_memory().await.unwrap());
    target
        .execute_script(
            "CREATE TABLE a (id INTEGER PRIMARY KEY, v TEXT);
             CREATE TABLE b (id INTEGER PRIMARY KEY, v TEXT);
             CREATE TABLE strict_b (id INTEGER PRIMARY KEY, v TEXT NOT NULL);",
        )
        .await
        .unwrap();
    let orchestrator = CopyOrchestrator::new(
        CopyEndpoint::from_database(source),
        CopyEndpoint::from_database(target.clone()),
    );
    (target, orchestrator)
}

async fn count(db: &SqliteDatabase, table: &str) -> Value {
    db.execute_query(&format!("SELECT COUNT(*) FROM {}", table))
        .await
        .unwrap()
        .collect_rows()
        .await
        .unwrap()
        .remove(0)
        .remove(0)
}

async fn job(orchestrator: &CopyOrchestrator, source: &str, target: &str) -> CopyJob {
    orchestrator
        .copy_from_table(
            &TableIdentifier::new(source),
            &TableIdentifier::new(target),
            CopyOptions::default(),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_session_commits_once_at_end() {
    let (target, orchestrator) = setup().await;
    let mut session = CopySession::new(orchestrator.target().connection.clone());
    session.add_job(job(&orchestrator, "a", "a").await).unwrap();
    session.add_job(job(&orchestrator, "b", "b").await).unwrap();

    let outcome = session.run().await;

    assert!(outcome.success);
    assert_eq!(outcome.outcomes.len(), 2);
    assert_eq!(outcome.affected_rows(), 3);
    assert!(!target.in_transaction().await);
    assert_eq!(count(&target, "a").await, json!(2));
    assert_eq!(count(&target, "b").await, json!(1));
}

#[tokio::test]
async fn test_failure_rolls_back_earlier_tables() {
    let (target, orchestrator) = setup().await;
    let mut session = CopySession::new(orchestrator.target().connection.clone());
    session.add_job(job(&orchestrator, "a", "a").await).unwrap();
    session
        .add_job(job(&orchestrator, "b", "strict_b").await)
        .unwrap();
    session.add_job(job(&orchestrator, "a", "b").await).unwrap();

    let outcome = session.run().await;

    assert!(!outcome.success);
    assert_eq!(outcome.outcomes.len(), 2);
    assert_eq!(outcome.skipped_jobs, 1);
    assert_eq!(outcome.outcomes[0].affected_rows, 0);
    assert!(outcome.outcomes[0].warnings[0].starts_with("Rolled back"));
    assert!(!outcome.outcomes[1].success);
    assert_eq!(count(&target, "a").await, json!(0));
    assert_eq!(count(&target, "strict_b").await, json!(0));
}

#[tokio::test]
async fn test_rejects_job_on_other_connection() {
    let (_target, orchestrator) = setup().await;
    let other = Arc::new(SqliteDatabase::connect_in_memory().await.unwrap());
    let mut session = CopySession::new(other);

    assert!(session.add_job(job(&orchestrator, "a", "a").await).is_err());
    assert!(session.is_empty());
}
