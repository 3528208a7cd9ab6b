use rand::RngCore;

use tabula_core::parse_schema_yaml;
use tabula_generate::{
    CallArgs, EvalErrorKind, FunctionRegistry, GenerateOptions, GeneratedValue, GenerationEngine,
    GenerationError,
};

fn engine() -> GenerationEngine {
    let mut functions = FunctionRegistry::with_defaults();
    functions.register_function("twice", |args: &CallArgs, _rng: &mut dyn RngCore| {
        match args.positional.first() {
            Some(GeneratedValue::Int(value)) => Ok(GeneratedValue::Int(value * 2)),
            Some(other) => Err(format!("twice() expects an int, got {}", other.type_name())),
            None => Err("twice() takes exactly one argument".to_string()),
        }
    });
    functions.register_namespace_function("codes", "prefixed", |args: &CallArgs, _rng: &mut dyn RngCore| {
        match args.positional.first() {
            Some(value) => Ok(GeneratedValue::Text(format!("C-{value}"))),
            None => Err("prefixed() takes exactly one argument".to_string()),
        }
    });
    let options = GenerateOptions {
        seed: Some(1),
        ..GenerateOptions::default()
    };
    GenerationEngine::new(options).with_functions(functions)
}

#[test]
fn registered_functions_feed_later_columns() {
    let schema = parse_schema_yaml(
        r#"
config:
  python_import: [codes]
tables:
  - table_name: t
    row_count: 3
    columns:
      - column_name: b
        data: a + 1
      - column_name: a
        data: twice(row_id)
      - column_name: code
        data: codes.prefixed(b)
"#,
    )
    .unwrap();
    let (tables, report) = engine().generate(&schema).unwrap();

    let table = &tables[0];
    assert_eq!(
        table.column_values("a"),
        vec![GeneratedValue::Int(2), GeneratedValue::Int(4), GeneratedValue::Int(6)]
    );
    assert_eq!(
        table.column_values("b"),
        vec![GeneratedValue::Int(3), GeneratedValue::Int(5), GeneratedValue::Int(7)]
    );
    assert_eq!(
        table.column_values("code"),
        vec!["C-3".into(), "C-5".into(), "C-7".into()]
    );
    assert!(report.warnings.is_empty());
}

#[test]
fn function_errors_surface_as_runtime_failures() {
    let schema = parse_schema_yaml(
        r#"
tables:
  - table_name: t
    columns:
      - column_name: a
        data: twice("x")
"#,
    )
    .unwrap();
    let err = engine().generate(&schema).unwrap_err();
    match err {
        GenerationError::Expression(err) => {
            assert_eq!(err.kind, EvalErrorKind::Runtime);
            assert_eq!(err.column, "a");
            assert_eq!(err.expression, "twice(\"x\")");
            assert!(err.message.contains("expects an int"), "{}", err.message);
        }
        other => panic!("expected an expression error, got {other}"),
    }
}

#[test]
fn namespaces_need_an_import() {
    let schema = parse_schema_yaml(
        r#"
tables:
  - table_name: t
    columns:
      - column_name: code
        data: codes.prefixed(1)
"#,
    )
    .unwrap();
    match engine().generate(&schema).unwrap_err() {
        GenerationError::Expression(err) => assert_eq!(err.kind, EvalErrorKind::UndefinedName),
        other => panic!("expected an expression error, got {other}"),
    }
}
