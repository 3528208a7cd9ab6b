use tabula_core::parse_schema_yaml;
use tabula_generate::{
    CopyError, EvalErrorKind, ForeignKeyError, GenerateOptions, GenerationEngine, GenerationError,
};

fn generate(yaml: &str) -> Result<(), GenerationError> {
    let schema = parse_schema_yaml(yaml).expect("parse schema");
    let options = GenerateOptions {
        seed: Some(1),
        ..GenerateOptions::default()
    };
    GenerationEngine::new(options).generate(&schema).map(|_| ())
}

fn expression_kind(err: GenerationError) -> (EvalErrorKind, String) {
    match err {
        GenerationError::Expression(err) => (err.kind, err.expression),
        other => panic!("expected an expression error, got {other}"),
    }
}

#[test]
fn primary_key_with_null_percentage_is_rejected_before_generation() {
    let err = generate(
        r#"
tables:
  - table_name: t
    columns:
      - column_name: id
        data: row_id
        is_primary_key: true
        null_percentage: 0
"#,
    )
    .unwrap_err();
    assert!(matches!(err, GenerationError::Schema(_)), "{err}");
}

#[test]
fn forward_reference_to_a_later_table_fails() {
    let err = generate(
        r#"
tables:
  - table_name: orders
    columns:
      - column_name: customer_id
        data: foreign_key("customers", "id")
  - table_name: customers
    columns:
      - column_name: id
        data: row_id
        is_primary_key: true
"#,
    )
    .unwrap_err();
    assert!(
        matches!(
            err,
            GenerationError::ForeignKey(ForeignKeyError::TableNotFound { ref table }) if table == "customers"
        ),
        "{err}"
    );
}

#[test]
fn foreign_key_to_a_table_without_rows_names_the_empty_key_cache() {
    let err = generate(
        r#"
tables:
  - table_name: customers
    row_count: 0
    columns:
      - column_name: id
        data: row_id
        is_primary_key: true
  - table_name: orders
    columns:
      - column_name: customer_id
        data: foreign_key("customers", "id")
"#,
    )
    .unwrap_err();
    assert!(
        matches!(
            err,
            GenerationError::ForeignKey(ForeignKeyError::EmptyKeys { ref table, ref column })
                if table == "customers" && column == "id"
        ),
        "{err}"
    );
}

#[test]
fn foreign_key_to_a_non_key_column_fails() {
    let err = generate(
        r#"
tables:
  - table_name: customers
    columns:
      - column_name: id
        data: row_id
        is_primary_key: true
      - column_name: email
        data: fake.email()
  - table_name: orders
    columns:
      - column_name: customer_email
        data: foreign_key("customers", "email")
"#,
    )
    .unwrap_err();
    assert!(
        matches!(err, GenerationError::ForeignKey(ForeignKeyError::ColumnNotFound { .. })),
        "{err}"
    );
}

#[test]
fn unknown_distribution_fails() {
    let err = generate(
        r#"
tables:
  - table_name: parents
    columns:
      - column_name: id
        data: row_id
        is_primary_key: true
  - table_name: children
    columns:
      - column_name: parent_id
        data: foreign_key("parents", "id", "pareto")
"#,
    )
    .unwrap_err();
    assert!(
        matches!(err, GenerationError::ForeignKey(ForeignKeyError::UnknownDistribution(ref name)) if name == "pareto"),
        "{err}"
    );
}

#[test]
fn copy_without_its_foreign_key_column_fails() {
    let err = generate(
        r#"
tables:
  - table_name: customers
    columns:
      - column_name: id
        data: row_id
        is_primary_key: true
  - table_name: orders
    columns:
      - column_name: customer_name
        data: copy_from_fk("customer_id", "customers", "name")
"#,
    )
    .unwrap_err();
    assert!(
        matches!(err, GenerationError::Copy(CopyError::KeyNotMaterialized { ref column }) if column == "customer_id"),
        "{err}"
    );
}

#[test]
fn copy_of_a_missing_parent_attribute_fails() {
    let err = generate(
        r#"
tables:
  - table_name: customers
    columns:
      - column_name: id
        data: row_id
        is_primary_key: true
  - table_name: orders
    columns:
      - column_name: customer_id
        data: foreign_key("customers", "id")
      - column_name: customer_name
        data: copy_from_fk("customer_id", "customers", "name")
"#,
    )
    .unwrap_err();
    assert!(
        matches!(err, GenerationError::Copy(CopyError::AttributeMissing { ref attribute, .. }) if attribute == "name"),
        "{err}"
    );
}

#[test]
fn expression_errors_are_classified() {
    let (kind, expression) = expression_kind(
        generate(
            r#"
tables:
  - table_name: t
    columns:
      - column_name: c
        data: fake.no_such_generator()
"#,
        )
        .unwrap_err(),
    );
    assert_eq!(kind, EvalErrorKind::UnknownAttribute);
    assert_eq!(expression, "fake.no_such_generator()");

    let (kind, _) = expression_kind(
        generate(
            r#"
tables:
  - table_name: t
    columns:
      - column_name: c
        data: mystery(1)
"#,
        )
        .unwrap_err(),
    );
    assert_eq!(kind, EvalErrorKind::UndefinedName);

    let (kind, _) = expression_kind(
        generate(
            r#"
tables:
  - table_name: t
    columns:
      - column_name: c
        data: 1 / 0
"#,
        )
        .unwrap_err(),
    );
    assert_eq!(kind, EvalErrorKind::Runtime);
}

#[test]
fn unregistered_import_is_not_reachable() {
    let (kind, _) = expression_kind(
        generate(
            r#"
config:
  python_import: [statistics]
tables:
  - table_name: t
    columns:
      - column_name: c
        data: statistics.mean([1, 2])
"#,
        )
        .unwrap_err(),
    );
    assert_eq!(kind, EvalErrorKind::UndefinedName);
}

#[test]
fn primary_key_reading_a_later_column_fails_at_runtime() {
    let schema = parse_schema_yaml(
        r#"
tables:
  - table_name: things
    columns:
      - column_name: id
        data: label + "-key"
        is_primary_key: true
      - column_name: tag
        data: "'x'"
      - column_name: label
        data: tag.upper()
"#,
    )
    .unwrap();
    let engine = GenerationEngine::new(GenerateOptions::default());
    let mut session = engine.session(&schema).unwrap();
    assert_eq!(
        session.report().warnings_by_code.get("primary_key_forward_reference"),
        Some(&1)
    );

    let (kind, _) = expression_kind(session.generate_table("things").unwrap_err());
    assert_eq!(kind, EvalErrorKind::UndefinedName);
}

#[test]
fn syntax_errors_surface_before_any_row() {
    let err = generate(
        r#"
tables:
  - table_name: t
    columns:
      - column_name: c
        data: (1 +
"#,
    )
    .unwrap_err();
    assert!(
        matches!(err, GenerationError::Syntax { ref column, .. } if column == "c"),
        "{err}"
    );
}

#[test]
fn coercion_failures_name_the_column() {
    let err = generate(
        r#"
tables:
  - table_name: t
    row_count: 2
    columns:
      - column_name: small
        data: row_id + 200
        type: int8
"#,
    )
    .unwrap_err();
    assert!(
        matches!(err, GenerationError::Coercion { ref column, ref declared, .. } if column == "small" && declared == "int8"),
        "{err}"
    );
}
