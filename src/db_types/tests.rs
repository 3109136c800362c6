use super::*;

#[test]
fn test_case_folding_matches() {
    assert!(CaseFolding::Insensitive.matches("Customer_ID", "customer_id"));
    assert!(CaseFolding::Insensitive.matches(" name ", "NAME"));
    assert!(!CaseFolding::Sensitive.matches("Name", "name"));
    assert!(CaseFolding::Sensitive.matches("Name", "Name"));
}

#[test]
fn test_parse_table_identifier() {
    let plain = TableIdentifier::parse("orders").unwrap();
    assert_eq!(plain.table, "orders");
    assert!(plain.schema.is_none());

    let qualified = TableIdentifier::parse("sales.orders").unwrap();
    assert_eq!(qualified.schema.as_deref(), Some("sales"));
    assert_eq!(qualified.table, "orders");

    let full = TableIdentifier::parse("db.sales.orders").unwrap();
    assert_eq!(full.catalog.as_deref(), Some("db"));
    assert_eq!(full.display_name(), "db.sales.orders");
}

#[test]
fn test_parse_quoted_identifier_keeps_dots() {
    let ident = TableIdentifier::parse("\"my.schema\".\"Order \"\"Lines\"\"\"").unwrap();
    assert_eq!(ident.schema.as_deref(), Some("my.schema"));
    assert_eq!(ident.table, "Order \"Lines\"");
}

#[test]
fn test_parse_rejects_invalid_names() {
    assert!(TableIdentifier::parse("   ").is_err());
    assert!(TableIdentifier::parse("a..b").is_err());
    assert!(TableIdentifier::parse("a.b.c.d").is_err());
    assert!(TableIdentifier::parse("\"open").is_err());
}

#[test]
fn test_same_table_ignores_missing_schema() {
    let left = TableIdentifier::with_schema("public", "Orders");
    let right = TableIdentifier::new("orders");
    assert!(left.same_table(&right, CaseFolding::Insensitive));
    assert!(!left.same_table(&right, CaseFolding::Sensitive));
}

#[test]
fn test_table_spec_primary_keys() {
    let spec = TableSpec::new(
        TableIdentifier::new("t"),
        vec![
            ColumnDef::new("id", "INTEGER").with_primary_key(true),
            ColumnDef::new("name", "TEXT"),
        ],
    );
    assert_eq!(spec.primary_key_columns(), vec!["id".to_string()]);
    assert!(spec.find_column("NAME", CaseFolding::Insensitive).is_some());
    assert!(!spec.columns[0].nullable);
}
