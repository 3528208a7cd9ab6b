use std::fs;

use tabula_core::{DataSpec, Error, load_schema, parse_schema_json, parse_schema_yaml};

const CUSTOMERS_ORDERS: &str = r#"
version: 1
config:
  locale: en_US
  seed: 42
  python_import: [calendar]
tables:
  - table_name: customers
    row_count: 3
    columns:
      - column_name: customer_id
        data: row_id
        is_primary_key: true
      - column_name: email
        data: fake.email()
        null_percentage: "10%"
  - table_name: orders
    row_count: 10
    export_file_count: 2
    columns:
      - column_name: order_id
        data: row_id
        is_primary_key: true
      - column_name: customer_id
        data: foreign_key("customers", "customer_id")
      - column_name: quantity
        data: 5
        type: int32
      - column_name: active
        data: true
"#;

#[test]
fn yaml_schema_parses_with_defaults() {
    let schema = parse_schema_yaml(CUSTOMERS_ORDERS).expect("valid schema");

    assert_eq!(schema.config.seed, Some(42));
    assert_eq!(schema.config.imports, vec!["calendar".to_string()]);
    assert_eq!(schema.tables.len(), 2);

    let customers = schema.table("customers").expect("customers");
    assert_eq!(customers.row_count(), 3);
    assert_eq!(customers.start_row_id(), 1);
    assert_eq!(
        customers.column("email").and_then(|c| c.null_fraction()),
        Some(0.1)
    );

    let orders = schema.table("orders").expect("orders");
    let quantity = orders.column("quantity").expect("quantity");
    assert_eq!(quantity.data, Some(DataSpec::Integer(5)));
    assert_eq!(
        orders.column("active").and_then(|c| c.expression()),
        Some("True".to_string())
    );
}

#[test]
fn primary_key_with_null_percentage_is_rejected() {
    let yaml = r#"
tables:
  - table_name: users
    columns:
      - column_name: id
        data: row_id
        is_primary_key: true
        null_percentage: 0.1
"#;
    let err = parse_schema_yaml(yaml).expect_err("pk null guard");
    match err {
        Error::InvalidSchema(message) => assert!(message.contains("users.id")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn missing_expression_is_rejected() {
    let yaml = r#"
tables:
  - table_name: users
    columns:
      - column_name: id
"#;
    assert!(matches!(
        parse_schema_yaml(yaml),
        Err(Error::InvalidSchema(_))
    ));
}

#[test]
fn duplicate_names_and_bad_types_are_rejected() {
    let duplicate_table = r#"{"tables": [
        {"table_name": "a", "columns": [{"column_name": "x", "data": "1"}]},
        {"table_name": "a", "columns": [{"column_name": "y", "data": "2"}]}
    ]}"#;
    assert!(matches!(
        parse_schema_json(duplicate_table),
        Err(Error::InvalidSchema(_))
    ));

    let duplicate_column = r#"{"tables": [
        {"table_name": "a", "columns": [
            {"column_name": "x", "data": "1"},
            {"column_name": "x", "data": "2"}
        ]}
    ]}"#;
    assert!(matches!(
        parse_schema_json(duplicate_column),
        Err(Error::InvalidSchema(_))
    ));

    let unknown_type = r#"{"tables": [
        {"table_name": "a", "columns": [{"column_name": "x", "data": "1", "type": "decimal(10,2)"}]}
    ]}"#;
    assert!(matches!(
        parse_schema_json(unknown_type),
        Err(Error::InvalidSchema(_))
    ));
}

#[test]
fn bad_run_config_is_rejected() {
    let yaml = r#"
config:
  locale: fr_FR
tables:
  - table_name: a
    columns:
      - column_name: x
        data: "1"
"#;
    assert!(matches!(parse_schema_yaml(yaml), Err(Error::InvalidSchema(_))));

    let yaml = r#"
config:
  reference_date: "01/02/2024"
tables:
  - table_name: a
    columns:
      - column_name: x
        data: "1"
"#;
    assert!(matches!(parse_schema_yaml(yaml), Err(Error::InvalidSchema(_))));
}

#[test]
fn load_schema_dispatches_on_extension() {
    let dir = std::env::temp_dir().join(format!("tabula_core_{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).expect("create temp dir");

    let yaml_path = dir.join("schema.yml");
    fs::write(&yaml_path, CUSTOMERS_ORDERS).expect("write yaml");
    let schema = load_schema(&yaml_path).expect("load yaml");
    assert_eq!(schema.tables[0].name, "customers");

    let toml_path = dir.join("schema.toml");
    fs::write(&toml_path, "tables = []").expect("write toml");
    assert!(matches!(
        load_schema(&toml_path),
        Err(Error::UnsupportedFormat(_))
    ));

    let _ = fs::remove_dir_all(&dir);
}
