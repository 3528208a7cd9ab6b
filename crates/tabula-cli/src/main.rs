mod logging;

use std::path::PathBuf;
use std::time::Instant;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tabula_core::{Error as CoreError, SchemaFile, load_schema};
use tabula_generate::{GenerateOptions, GenerationEngine, GenerationError, OutputFormat};
use thiserror::Error;

use logging::init_logging;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logging setup failed: {0}")]
    Logging(String),
}

#[derive(Parser, Debug)]
#[command(name = "tabula", version, about = "Deterministic relational fake data")]
struct Cli {
    /// Emit JSON log lines with RFC 3339 UTC timestamps.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
    /// Append logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate every table of a schema file and write it out.
    Generate(GenerateArgs),
    /// Load, validate and compile a schema file without generating rows.
    Validate(ValidateArgs),
    /// Print the JSON Schema of the schema file format.
    JsonSchema,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Schema file (.yaml, .yml or .json).
    config: PathBuf,
    /// Output directory.
    #[arg(long, default_value = "output")]
    target: PathBuf,
    /// Output format: csv or json.
    #[arg(long, default_value = "csv")]
    file_type: OutputFormat,
    /// Export only this table; the tables before it are still generated.
    #[arg(long)]
    table: Option<String>,
    /// Run seed; overrides `config.seed`.
    #[arg(long)]
    seed: Option<u64>,
    /// Overrides `config.locale`.
    #[arg(long)]
    locale: Option<String>,
    /// Pin `today()`/`now()` helpers (YYYY-MM-DD); overrides `config.reference_date`.
    #[arg(long)]
    reference_date: Option<NaiveDate>,
    /// Also write the generation report as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Schema file (.yaml, .yml or .json).
    config: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::JsonSchema => {
            let schema = schemars::schema_for!(SchemaFile);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
        Command::Validate(args) => {
            init_logging(cli.log_json, cli.log_file.as_deref())?;
            run_validate(args)
        }
        Command::Generate(args) => {
            init_logging(cli.log_json, cli.log_file.as_deref())?;
            run_generate(args)
        }
    }
}

fn run_validate(args: ValidateArgs) -> Result<(), CliError> {
    let schema = load_schema(&args.config)?;
    let engine = GenerationEngine::new(GenerateOptions::default());
    let session = engine.session(&schema)?;

    let columns: usize = schema.tables.iter().map(|table| table.columns.len()).sum();
    tracing::info!(
        event = "schema_validated",
        path = %args.config.display(),
        tables = schema.tables.len(),
        columns,
        warnings = session.report().warnings.len()
    );
    for issue in &session.report().warnings {
        println!("warning [{}]: {}", issue.code, issue.message);
    }
    println!(
        "{}: {} tables, {} columns ok",
        args.config.display(),
        schema.tables.len(),
        columns
    );
    Ok(())
}

fn run_generate(args: GenerateArgs) -> Result<(), CliError> {
    let GenerateArgs {
        config,
        target,
        file_type,
        table,
        seed,
        locale,
        reference_date,
        report,
    } = args;

    let timer = Instant::now();
    let schema = load_schema(&config)?;
    tracing::info!(event = "schema_loaded", path = %config.display(), tables = schema.tables.len());

    let options = GenerateOptions {
        seed,
        locale,
        reference_date,
        infer_entity_attrs_by_name: None,
    };
    let engine = GenerationEngine::new(options);
    let generation = engine.export(&schema, &target, file_type, table.as_deref())?;

    if let Some(path) = report {
        std::fs::write(&path, serde_json::to_vec_pretty(&generation)?)?;
        tracing::info!(event = "report_written", path = %path.display());
    }

    for file in &generation.files_written {
        println!("{file}");
    }
    tracing::info!(
        event = "run_finished",
        run_id = %generation.run_id,
        seed = generation.seed,
        rows = generation.rows_total,
        files = generation.files_written.len(),
        bytes_written = generation.bytes_written,
        duration_ms = timer.elapsed().as_millis() as u64
    );
    Ok(())
}
