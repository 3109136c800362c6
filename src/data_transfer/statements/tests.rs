use super::*;
use crate::db::dialect::dialect_for;
use serde_json::json;

fn people_builder(db_type: DatabaseType, trim: bool) -> StatementBuilder {
    let columns = vec![
        ColumnDef::new("id", "INTEGER").with_primary_key(true),
        ColumnDef::new("name", "VARCHAR").with_size(Some(20), None),
        ColumnDef::new("photo", "BLOB"),
    ];
    StatementBuilder::new(
        Arc::new(dialect_for(db_type)),
        &TableIdentifier::new("people"),
        &columns,
        vec![0],
        trim,
    )
}

#[test]
fn test_insert_statement() {
    let builder = people_builder(DatabaseType::SQLite, false);
    let sql = builder.insert(&[json!(1), json!("O'Hara"), json!("AQI=")]);
    assert_eq!(
        sql,
        "INSERT INTO \"people\" (\"id\", \"name\", \"photo\") VALUES (1, 'O''Hara', X'0102')"
    );
}

#[test]
fn test_update_statement_uses_key_predicate() {
    let builder = people_builder(DatabaseType::MySQL, false);
    let sql = builder
        .update(&[json!(7), json!("Ann"), Value::Null])
        .unwrap();
    assert_eq!(
        sql,
        "UPDATE `people` SET `name` = 'Ann', `photo` = NULL WHERE `id` = 7"
    );
}

#[test]
fn test_key_predicate_handles_null() {
    let builder = people_builder(DatabaseType::PostgreSQL, false);
    assert_eq!(
        builder.key_predicate(&[Value::Null, json!("x"), Value::Null]).unwrap(),
        "\"id\" IS NULL"
    );
}

#[test]
fn test_statements_without_keys_fail() {
    let builder = StatementBuilder::new(
        Arc::new(dialect_for(DatabaseType::SQLite)),
        &TableIdentifier::new("t"),
        &[ColumnDef::new("a", "TEXT")],
        vec![],
        false,
    );
    assert!(!builder.has_keys());
    assert!(builder.update(&[json!("x")]).is_err());
    assert!(builder.delete_by_key(&[json!("x")]).is_err());
    assert!(builder.upsert(&[json!("x")]).is_err());
}

#[test]
fn test_upsert_statement() {
    let builder = people_builder(DatabaseType::PostgreSQL, false);
    let sql = builder
        .upsert(&[json!(1), json!("Ann"), Value::Null])
        .unwrap();
    assert!(sql.starts_with("INSERT INTO \"people\""));
    assert!(sql.ends_with(
        "ON CONFLICT (\"id\") DO UPDATE SET \"name\" = EXCLUDED.\"name\", \"photo\" = EXCLUDED.\"photo\""
    ));
}

#[test]
fn test_trim_char_data_only_for_character_columns() {
    let builder = people_builder(DatabaseType::SQLite, true);
    let sql = builder.insert(&[json!(1), json!("Ann   "), Value::Null]);
    assert!(sql.contains("'Ann'"));

    let untrimmed = people_builder(DatabaseType::SQLite, false);
    assert!(untrimmed
        .insert(&[json!(1), json!("Ann   "), Value::Null])
        .contains("'Ann   '"));
}

#[test]
fn test_delete_by_keys_batches_predicates() {
    let builder = StatementBuilder::new(
        Arc::new(dialect_for(DatabaseType::SQLite)),
        &TableIdentifier::new("t"),
        &[ColumnDef::new("a", "INTEGER"), ColumnDef::new("b", "TEXT")],
        vec![0, 1],
        false,
    );
    let sql = builder
        .delete_by_keys(&[vec![json!(1), json!("x")], vec![json!(2), Value::Null]])
        .unwrap()
        .unwrap();
    assert_eq!(
        sql,
        "DELETE FROM \"t\" WHERE (\"a\" = 1 AND \"b\" = 'x') OR (\"a\" = 2 AND \"b\" IS NULL)"
    );
    assert!(builder.delete_by_keys(&[]).unwrap().is_none());
}

#[test]
fn test_format_value_boolean_and_json_hints() {
    let boolean = TargetColumnHint::from_column(&ColumnDef::new("flag", "boolean"));
    assert_eq!(
        format_value_for_target(&DatabaseType::PostgreSQL, &json!(1), Some(&boolean), false),
        "TRUE"
    );
    assert_eq!(
        format_value_for_target(&DatabaseType::MySQL, &json!(false), Some(&boolean), false),
        "0"
    );

    let document = TargetColumnHint::from_column(&ColumnDef::new("doc", "json"));
    assert_eq!(
        format_value_for_target(&DatabaseType::PostgreSQL, &json!({"a": 1}), Some(&document), false),
        "'{\"a\":1}'::json"
    );
}
