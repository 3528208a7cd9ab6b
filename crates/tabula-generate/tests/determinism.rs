use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use tabula_core::{SchemaFile, load_schema};
use tabula_generate::{GenerateOptions, GenerationEngine, OutputFormat};

fn fixture(name: &str) -> SchemaFile {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../schemas")
        .join(name);
    load_schema(&path).unwrap_or_else(|err| panic!("load {}: {err}", path.display()))
}

fn temp_out_dir(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("tabula-{label}-{}", uuid::Uuid::new_v4()))
}

fn options(seed: u64) -> GenerateOptions {
    GenerateOptions {
        seed: Some(seed),
        reference_date: NaiveDate::from_ymd_opt(2024, 6, 30),
        ..GenerateOptions::default()
    }
}

fn hash_file(path: &Path) -> String {
    let bytes = fs::read(path).unwrap_or_else(|_| panic!("missing {}", path.display()));
    hex::encode(Sha256::digest(&bytes))
}

fn hash_dir(dir: &Path) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = fs::read_dir(dir)
        .expect("read out dir")
        .map(|entry| {
            let path = entry.expect("dir entry").path();
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            (name, hash_file(&path))
        })
        .collect();
    entries.sort();
    entries
}

#[test]
fn same_seed_produces_identical_files() {
    let schema = fixture("retail.yaml");
    let out_a = temp_out_dir("det-a");
    let out_b = temp_out_dir("det-b");

    let engine = GenerationEngine::new(options(11));
    let report_a = engine
        .export(&schema, &out_a, OutputFormat::Csv, None)
        .expect("run A");
    let report_b = engine
        .export(&schema, &out_b, OutputFormat::Csv, None)
        .expect("run B");

    let hashes_a = hash_dir(&out_a);
    assert_eq!(hashes_a, hash_dir(&out_b));
    assert_eq!(
        hashes_a.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
        vec!["customers.csv", "orders_1.csv", "orders_2.csv", "orders_3.csv", "stores.csv"]
    );
    assert_ne!(report_a.run_id, report_b.run_id);
    assert_eq!(report_a.bytes_written, report_b.bytes_written);
    assert_eq!(report_a.files_written.len(), 5);

    fs::remove_dir_all(out_a).ok();
    fs::remove_dir_all(out_b).ok();
}

#[test]
fn json_export_is_deterministic_too() {
    let schema = fixture("customers_orders.yaml");
    let out_a = temp_out_dir("json-a");
    let out_b = temp_out_dir("json-b");

    let engine = GenerationEngine::new(options(3));
    engine.export(&schema, &out_a, OutputFormat::Json, None).expect("run A");
    engine.export(&schema, &out_b, OutputFormat::Json, None).expect("run B");
    assert_eq!(hash_dir(&out_a), hash_dir(&out_b));

    let orders: serde_json::Value =
        serde_json::from_slice(&fs::read(out_a.join("orders.json")).unwrap()).unwrap();
    assert_eq!(orders.as_array().map(Vec::len), Some(10));

    fs::remove_dir_all(out_a).ok();
    fs::remove_dir_all(out_b).ok();
}

#[test]
fn different_seeds_change_random_columns() {
    let schema = fixture("retail.yaml");
    let (tables_a, report_a) = GenerationEngine::new(options(1)).generate(&schema).unwrap();
    let (tables_b, report_b) = GenerationEngine::new(options(2)).generate(&schema).unwrap();

    assert_eq!(report_a.seed, 1);
    assert!(report_a.seed_explicit);
    assert_eq!(report_b.seed, 2);

    let orders_a = tables_a.iter().find(|table| table.name == "orders").unwrap();
    let orders_b = tables_b.iter().find(|table| table.name == "orders").unwrap();
    assert_eq!(orders_a.column_values("order_id"), orders_b.column_values("order_id"));
    assert_ne!(orders_a.column_values("unit_price"), orders_b.column_values("unit_price"));
    assert_ne!(orders_a.column_values("note"), orders_b.column_values("note"));
}

#[test]
fn option_seed_overrides_schema_seed() {
    let schema = fixture("customers_orders.yaml");
    let (_, from_file) = GenerationEngine::new(GenerateOptions::default())
        .generate(&schema)
        .unwrap();
    assert_eq!(from_file.seed, 42);

    let (_, from_options) = GenerationEngine::new(options(5)).generate(&schema).unwrap();
    assert_eq!(from_options.seed, 5);
}

#[test]
fn chunked_generation_equals_single_pass() {
    let chunked = fixture("retail.yaml");
    let mut single = chunked.clone();
    for table in &mut single.tables {
        table.export_file_row_count = None;
        table.export_file_count = None;
    }
    let mut uneven = chunked.clone();
    for table in &mut uneven.tables {
        table.export_file_row_count = Some(7);
    }

    let engine = GenerationEngine::new(options(99));
    let (single_tables, single_report) = engine.generate(&single).unwrap();
    let (chunked_tables, chunked_report) = engine.generate(&chunked).unwrap();
    let (uneven_tables, uneven_report) = engine.generate(&uneven).unwrap();

    assert_eq!(single_tables, chunked_tables);
    assert_eq!(single_tables, uneven_tables);
    assert_eq!(chunked_report.table("orders").map(|table| table.chunks), Some(3));
    assert_eq!(uneven_report.table("orders").map(|table| table.chunks), Some(143));
    assert_eq!(
        single_report.nulls_injected_total,
        chunked_report.nulls_injected_total
    );
}

#[test]
fn chunk_files_concatenate_to_the_single_file() {
    let chunked = fixture("retail.yaml");
    let mut single = chunked.clone();
    for table in &mut single.tables {
        table.export_file_row_count = None;
    }

    let out_chunked = temp_out_dir("chunked");
    let out_single = temp_out_dir("single");
    let engine = GenerationEngine::new(options(4));
    engine
        .export(&chunked, &out_chunked, OutputFormat::Csv, Some("orders"))
        .expect("chunked run");
    engine
        .export(&single, &out_single, OutputFormat::Csv, Some("orders"))
        .expect("single run");

    let whole = fs::read_to_string(out_single.join("orders.csv")).unwrap();
    let (header, body) = whole.split_once('\n').unwrap();
    let mut joined = String::new();
    for index in 1..=3 {
        let part = fs::read_to_string(out_chunked.join(format!("orders_{index}.csv"))).unwrap();
        let (part_header, part_body) = part.split_once('\n').unwrap();
        assert_eq!(part_header, header);
        joined.push_str(part_body);
    }
    assert_eq!(joined, body);
    assert!(!out_chunked.join("stores.csv").exists());

    fs::remove_dir_all(out_chunked).ok();
    fs::remove_dir_all(out_single).ok();
}

#[test]
fn null_injection_hits_exact_counts() {
    let schema = fixture("retail.yaml");
    let (tables, report) = GenerationEngine::new(options(8)).generate(&schema).unwrap();

    let orders = tables.iter().find(|table| table.name == "orders").unwrap();
    let nulls = orders
        .column_values("note")
        .iter()
        .filter(|value| value.is_null())
        .count();
    assert_eq!(nulls, 300);

    let customers = tables.iter().find(|table| table.name == "customers").unwrap();
    let missing_emails = customers
        .column_values("email")
        .iter()
        .filter(|value| value.is_null())
        .count();
    assert_eq!(missing_emails, 10);
    assert_eq!(report.nulls_injected_total, 310);
}
