use std::env;
use std::path::PathBuf;

use tabula_core::load_schema;
use tabula_generate::{GenerateOptions, GenerationEngine, OutputFormat};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let mut schema_path: Option<PathBuf> = None;
    let mut out_dir = PathBuf::from("out");
    let mut seed: Option<u64> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--out" => out_dir = args.next().map(PathBuf::from).ok_or("missing --out value")?,
            "--seed" => seed = Some(args.next().ok_or("missing --seed value")?.parse()?),
            _ => {
                if schema_path.is_none() {
                    schema_path = Some(PathBuf::from(arg));
                } else {
                    return Err("unexpected argument".into());
                }
            }
        }
    }

    let schema_path = schema_path.ok_or("missing schema path")?;
    let schema = load_schema(&schema_path)?;

    let options = GenerateOptions {
        seed,
        ..GenerateOptions::default()
    };
    let engine = GenerationEngine::new(options);
    let report = engine.export(&schema, &out_dir, OutputFormat::Csv, None)?;

    for file in &report.files_written {
        println!("{file}");
    }
    Ok(())
}
