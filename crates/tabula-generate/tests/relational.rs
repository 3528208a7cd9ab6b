use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::NaiveDate;

use tabula_core::{SchemaFile, load_schema, parse_schema_yaml};
use tabula_generate::{GenerateOptions, GeneratedTable, GeneratedValue, GenerationEngine};

fn fixture(name: &str) -> SchemaFile {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../schemas")
        .join(name);
    load_schema(&path).unwrap_or_else(|err| panic!("load {}: {err}", path.display()))
}

fn options(seed: u64) -> GenerateOptions {
    GenerateOptions {
        seed: Some(seed),
        reference_date: NaiveDate::from_ymd_opt(2024, 1, 1),
        ..GenerateOptions::default()
    }
}

fn table<'a>(tables: &'a [GeneratedTable], name: &str) -> &'a GeneratedTable {
    tables
        .iter()
        .find(|table| table.name == name)
        .unwrap_or_else(|| panic!("table {name} was not generated"))
}

fn counts(values: &[GeneratedValue]) -> HashMap<i64, usize> {
    let mut counts = HashMap::new();
    for value in values {
        *counts.entry(value.as_i64().expect("integer key")).or_insert(0) += 1;
    }
    counts
}

fn top_ten_share(values: &[GeneratedValue]) -> f64 {
    let mut frequencies: Vec<usize> = counts(values).into_values().collect();
    frequencies.sort_unstable_by(|a, b| b.cmp(a));
    frequencies.iter().take(10).sum::<usize>() as f64 / values.len() as f64
}

#[test]
fn orders_copy_the_email_of_their_customer() {
    let schema = fixture("customers_orders.yaml");
    let (tables, report) = GenerationEngine::new(options(42)).generate(&schema).unwrap();

    let customers = table(&tables, "customers");
    let orders = table(&tables, "orders");
    assert_eq!(customers.rows.len(), 3);
    assert_eq!(orders.rows.len(), 10);
    assert_eq!(orders.columns, vec!["order_id", "customer_id", "customer_email"]);

    let emails: HashMap<i64, GeneratedValue> = customers
        .rows
        .iter()
        .map(|row| (row["customer_id"].as_i64().unwrap(), row["email"].clone()))
        .collect();
    assert_eq!(
        emails.values().map(ToString::to_string).collect::<HashSet<_>>().len(),
        3
    );
    for order in &orders.rows {
        let customer = order["customer_id"].as_i64().unwrap();
        assert_eq!(order["customer_email"], emails[&customer]);
    }
    assert_eq!(report.rows_total, 13);
    assert_eq!(report.duplicate_keys_total, 0);
}

#[test]
fn foreign_keys_come_from_the_parent_key_cache() {
    let schema = fixture("retail.yaml");
    let engine = GenerationEngine::new(options(5));
    let mut session = engine.session(&schema).unwrap();
    let stores = session.generate_table("stores").unwrap();
    let customers = session.generate_table("customers").unwrap();
    let orders = session.generate_table("orders").unwrap();

    let store_keys: HashSet<String> = session
        .foreign()
        .keys("stores", "store_id")
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();
    let customer_keys: HashSet<String> = session
        .foreign()
        .keys("customers", "customer_id")
        .unwrap()
        .iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(store_keys.len(), stores.rows.len());
    assert_eq!(customer_keys.len(), customers.rows.len());

    for row in &customers.rows {
        assert!(store_keys.contains(&row["home_store_id"].to_string()));
    }
    for row in &orders.rows {
        assert!(customer_keys.contains(&row["customer_id"].to_string()));
        assert!(store_keys.contains(&row["store_id"].to_string()));
    }
    assert_eq!(customers.rows[0]["customer_id"], GeneratedValue::Int(1000));
}

#[test]
fn inferred_and_explicit_copies_match_the_parent_row() {
    let schema = fixture("retail.yaml");
    let (tables, _) = GenerationEngine::new(options(6)).generate(&schema).unwrap();

    let stores: HashMap<i64, &GeneratedValue> = table(&tables, "stores")
        .rows
        .iter()
        .map(|row| (row["store_id"].as_i64().unwrap(), &row["tier"]))
        .collect();
    let customers: HashMap<i64, &GeneratedValue> = table(&tables, "customers")
        .rows
        .iter()
        .map(|row| (row["customer_id"].as_i64().unwrap(), &row["full_name"]))
        .collect();

    for order in &table(&tables, "orders").rows {
        let store = order["store_id"].as_i64().unwrap();
        assert_eq!(&order["store_tier"], stores[&store]);
        let customer = order["customer_id"].as_i64().unwrap();
        assert_eq!(&order["customer_full_name"], customers[&customer]);
    }
}

#[test]
fn zipf_concentrates_picks_more_than_uniform() {
    let schema = parse_schema_yaml(
        r#"
tables:
  - table_name: parents
    row_count: 100
    columns:
      - column_name: id
        data: row_id
        is_primary_key: true
  - table_name: children
    row_count: 5000
    columns:
      - column_name: uniform_parent
        data: foreign_key("parents", "id")
      - column_name: zipf_parent
        data: foreign_key("parents", "id", "zipf", 1.2)
"#,
    )
    .unwrap();
    let (tables, _) = GenerationEngine::new(options(17)).generate(&schema).unwrap();
    let children = table(&tables, "children");

    let uniform = top_ten_share(&children.column_values("uniform_parent"));
    let zipf = top_ten_share(&children.column_values("zipf_parent"));
    assert!(zipf > uniform, "zipf {zipf} <= uniform {uniform}");

    let zipf_counts = counts(&children.column_values("zipf_parent"));
    assert!(zipf_counts.get(&1) > zipf_counts.get(&50));
}

#[test]
fn weighted_parent_follows_attribute_weights() {
    let schema = parse_schema_yaml(
        r#"
tables:
  - table_name: stores
    row_count: 300
    columns:
      - column_name: id
        data: row_id
        is_primary_key: true
      - column_name: tier
        data: row_id % 3 + 3
  - table_name: visits
    row_count: 6000
    columns:
      - column_name: store_id
        data: 'foreign_key("stores", "id", "weighted_parent", None, "tier", {5: 4.0, 4: 2.0, 3: 1.0})'
"#,
    )
    .unwrap();
    let (tables, _) = GenerationEngine::new(options(23)).generate(&schema).unwrap();

    let tiers: HashMap<i64, i64> = table(&tables, "stores")
        .rows
        .iter()
        .map(|row| (row["id"].as_i64().unwrap(), row["tier"].as_i64().unwrap()))
        .collect();
    let picks = counts(&table(&tables, "visits").column_values("store_id"));

    let mut per_tier: HashMap<i64, (usize, usize)> = HashMap::new();
    for (store, tier) in &tiers {
        let entry = per_tier.entry(*tier).or_insert((0, 0));
        entry.0 += picks.get(store).copied().unwrap_or(0);
        entry.1 += 1;
    }
    let average = |tier: i64| {
        let (total, stores) = per_tier[&tier];
        total as f64 / stores as f64
    };
    assert!(average(5) >= average(4), "tier 5 {} < tier 4 {}", average(5), average(4));
    assert!(average(4) >= average(3), "tier 4 {} < tier 3 {}", average(4), average(3));
}

#[test]
fn foreign_key_picks_do_not_depend_on_the_run_seed() {
    let schema = parse_schema_yaml(
        r#"
tables:
  - table_name: parents
    row_count: 50
    columns:
      - column_name: id
        data: row_id
        is_primary_key: true
  - table_name: children
    row_count: 200
    columns:
      - column_name: parent_id
        data: foreign_key("parents", "id", "zipf")
      - column_name: noise
        data: random.random()
"#,
    )
    .unwrap();
    let (first, _) = GenerationEngine::new(options(1)).generate(&schema).unwrap();
    let (second, _) = GenerationEngine::new(options(2)).generate(&schema).unwrap();

    let first = table(&first, "children");
    let second = table(&second, "children");
    assert_eq!(first.column_values("parent_id"), second.column_values("parent_id"));
    assert_ne!(first.column_values("noise"), second.column_values("noise"));
}

#[test]
fn get_table_sees_rows_generated_so_far() {
    let schema = parse_schema_yaml(
        r#"
tables:
  - table_name: customers
    row_count: 4
    columns:
      - column_name: id
        data: row_id
        is_primary_key: true
      - column_name: score
        data: row_id * 10
  - table_name: summary
    row_count: 1
    columns:
      - column_name: customers
        data: len(get_table("customers"))
      - column_name: total_score
        data: sum([row["score"] for row in get_table("customers")])
      - column_name: missing
        data: len(get_table("nowhere"))
  - table_name: running
    row_count: 3
    export_file_row_count: 1
    columns:
      - column_name: seen
        data: len(get_table("running"))
"#,
    )
    .unwrap();
    let (tables, _) = GenerationEngine::new(options(1)).generate(&schema).unwrap();

    let summary = &table(&tables, "summary").rows[0];
    assert_eq!(summary["customers"], GeneratedValue::Int(4));
    assert_eq!(summary["total_score"], GeneratedValue::Int(100));
    assert_eq!(summary["missing"], GeneratedValue::Int(0));
    assert_eq!(
        table(&tables, "running").column_values("seen"),
        vec![GeneratedValue::Int(0), GeneratedValue::Int(1), GeneratedValue::Int(2)]
    );
}

#[test]
fn declared_types_apply_before_export() {
    let schema = fixture("retail.yaml");
    let (tables, _) = GenerationEngine::new(options(2)).generate(&schema).unwrap();
    let orders = table(&tables, "orders");
    for row in &orders.rows {
        assert!(matches!(row["quantity"], GeneratedValue::Int(1..=5)));
        assert!(matches!(row["unit_price"], GeneratedValue::Float(_)));
        assert!(matches!(row["ordered_at"], GeneratedValue::Timestamp(_)));
    }
    for row in &table(&tables, "stores").rows {
        assert!(matches!(row["opened_on"], GeneratedValue::Date(_)));
    }
}
