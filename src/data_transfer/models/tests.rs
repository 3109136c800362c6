use super::*;

#[test]
fn test_write_mode_parse() {
    assert_eq!(WriteMode::parse("insert").unwrap(), WriteMode::Insert);
    assert_eq!(WriteMode::parse("Insert, Update").unwrap(), WriteMode::InsertOrUpdate);
    assert_eq!(WriteMode::parse("insert-or-update").unwrap(), WriteMode::InsertOrUpdate);
    assert_eq!(WriteMode::parse("update,insert").unwrap(), WriteMode::UpdateInsert);
    assert_eq!(WriteMode::parse("delete_insert").unwrap(), WriteMode::DeleteInsert);
    assert!(WriteMode::parse("merge").is_err());
}

#[test]
fn test_write_mode_requires_keys() {
    assert!(!WriteMode::Insert.requires_keys());
    assert!(WriteMode::Update.requires_keys());
    assert!(WriteMode::DeleteInsert.requires_keys());
}

#[test]
fn test_settings_defaults_from_empty_json() {
    let settings = CopySettings::from_json_str("{}").unwrap();
    assert_eq!(settings, CopySettings::default());
    assert_eq!(settings.batch_size, 1_000);
    assert!(settings.use_savepoints);
    assert_eq!(settings.progress_interval, 100);
}

#[test]
fn test_settings_from_json() {
    let settings = CopySettings::from_json_str(
        r#"{
            "batchSize": 50,
            "commitEvery": { "rows": 200 },
            "continueOnError": true,
            "writeMode": "insert-or-update",
            "deleteTarget": "truncate",
            "caseFolding": "sensitive"
        }"#,
    )
    .unwrap();

    assert_eq!(settings.batch_size, 50);
    assert_eq!(settings.commit_every, CommitInterval::Rows(200));
    assert_eq!(settings.write_mode, WriteMode::InsertOrUpdate);
    assert_eq!(settings.delete_target, DeleteTargetPolicy::Truncate);
    assert_eq!(settings.case_folding, CaseFolding::Sensitive);

    let policy = settings.transaction_policy();
    assert!(policy.continue_on_error);
    assert!(policy.use_savepoints);
    assert_eq!(policy.commit_every, CommitInterval::Rows(200));
}

#[test]
fn test_commit_interval_unit_variants() {
    let settings = CopySettings::from_json_str(r#"{"commitEvery": "atEnd"}"#).unwrap();
    assert_eq!(settings.commit_every, CommitInterval::AtEnd);
}

#[test]
fn test_settings_validation() {
    assert!(CopySettings::from_json_str(r#"{"batchSize": 0}"#).is_err());
    assert!(CopySettings::from_json_str(r#"{"commitEvery": {"rows": 0}}"#).is_err());
    assert!(CopySettings::from_json_str("not json").is_err());
}

#[test]
fn test_settings_from_missing_file() {
    let error = CopySettings::from_json_file("/nonexistent/copy-settings.json").unwrap_err();
    assert!(error.starts_with("Failed to read copy settings"));
}

#[test]
fn test_normalized_where_clause() {
    let options = CopyOptions {
        where_clause: Some("  WHERE id > 3 ".to_string()),
        ..Default::default()
    };
    assert_eq!(options.normalized_where_clause().as_deref(), Some("id > 3"));

    let blank = CopyOptions {
        where_clause: Some("   ".to_string()),
        ..Default::default()
    };
    assert!(blank.normalized_where_clause().is_none());
}

#[test]
fn test_outcome_warnings_are_unique() {
    let mut outcome = Outcome::new();
    outcome.push_warning_once("skipped");
    outcome.push_warning_once("skipped");
    assert_eq!(outcome.warnings, vec!["skipped".to_string()]);
}

#[test]
fn test_outcome_states() {
    let mut outcome = Outcome::new();
    assert_eq!(outcome.state(), CopyJobState::Streaming);
    outcome.finish();
    assert_eq!(outcome.state(), CopyJobState::Finished);

    let mut cancelled = Outcome::new();
    cancelled.mark_cancelled();
    cancelled.finish();
    assert_eq!(cancelled.state(), CopyJobState::Cancelled);
    assert!(cancelled.errors.is_empty());
    assert!(cancelled.state().is_terminal());

    let failed = Outcome::failed("boom");
    assert_eq!(failed.state(), CopyJobState::Failed);
    assert_eq!(failed.errors, vec!["boom".to_string()]);
}
