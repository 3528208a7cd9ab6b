use schemars::schema_for;
use tabula_core::SchemaFile;

fn main() {
    let schema = schema_for!(SchemaFile);
    let json = serde_json::to_string_pretty(&schema).expect("serialize json schema");
    println!("{json}");
}
