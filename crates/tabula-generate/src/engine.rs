use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Instant;

use chrono::{NaiveDate, NaiveTime, Utc};
use tracing::{info, warn};

use tabula_core::{SchemaFile, Table, validate_schema};

use crate::classify::{ColumnInfo, classify};
use crate::coerce::coerce_column;
use crate::errors::{EvaluationError, GenerationError};
use crate::expr::eval::TableSymbols;
use crate::expr::{Environment, ExprError, Program};
use crate::faker_rs::FakeProvider;
use crate::faker_rs::locales::LocaleKey;
use crate::foreign::InMemoryForeignContext;
use crate::functions::FunctionRegistry;
use crate::infer::{foreign_key_parents, infer_copy_source};
use crate::model::{GenerateOptions, GenerationIssue, GenerationReport};
use crate::output::{OutputFormat, chunk_file_name, write_chunk};
use crate::planner::{GenerationTask, RowRange, plan_tables};
use crate::seed::Determinism;
use crate::value::{GeneratedValue, RowMap, value_key};

/// Rows of one table, or of one chunk of it, in generation order.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedTable {
    pub name: String,
    /// Declared column order.
    pub columns: Vec<String>,
    pub rows: Vec<RowMap>,
    /// Positions of `rows` within the table.
    pub range: RowRange,
}

impl GeneratedTable {
    /// Cells of `column` in row order.
    pub fn column_values(&self, column: &str) -> Vec<GeneratedValue> {
        self.rows
            .iter()
            .map(|row| row.get(column).cloned().unwrap_or(GeneratedValue::Null))
            .collect()
    }
}

/// Entry point for generating datasets from a schema file.
#[derive(Debug, Clone)]
pub struct GenerationEngine {
    options: GenerateOptions,
    functions: FunctionRegistry,
}

impl GenerationEngine {
    pub fn new(options: GenerateOptions) -> Self {
        Self {
            options,
            functions: FunctionRegistry::with_defaults(),
        }
    }

    /// Replace the functions and namespaces visible to expressions.
    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    /// Validate `schema`, compile every column and open a run over it.
    pub fn session<'s>(&'s self, schema: &'s SchemaFile) -> Result<GenerationSession<'s>, GenerationError> {
        GenerationSession::new(schema, &self.options, &self.functions)
    }

    /// Generate every table in memory, chunk by chunk, and merge the chunks.
    pub fn generate(&self, schema: &SchemaFile) -> Result<(Vec<GeneratedTable>, GenerationReport), GenerationError> {
        let mut session = self.session(schema)?;
        let mut tables: Vec<GeneratedTable> = Vec::new();
        session.run(None, |_task, index, chunk| {
            if index > 0
                && let Some(table) = tables.last_mut()
            {
                table.range.len += chunk.range.len;
                table.rows.extend(chunk.rows);
            } else {
                tables.push(chunk);
            }
            Ok(())
        })?;
        Ok((tables, session.finish()))
    }

    /// Generate and write each chunk under `target` as soon as it is complete.
    ///
    /// With `only`, earlier tables are generated but only that table is written.
    pub fn export(
        &self,
        schema: &SchemaFile,
        target: &Path,
        format: OutputFormat,
        only: Option<&str>,
    ) -> Result<GenerationReport, GenerationError> {
        std::fs::create_dir_all(target)?;
        let mut session = self.session(schema)?;
        let mut files = Vec::new();
        session.run(only, |task, index, chunk| {
            if !task.export {
                return Ok(());
            }
            let path = target.join(chunk_file_name(&task.table, index, task.chunks.len(), format));
            let bytes = write_chunk(&path, &chunk, format)?;
            info!(
                table = %task.table,
                path = %path.display(),
                rows = chunk.rows.len(),
                bytes,
                "chunk written"
            );
            files.push((path.display().to_string(), bytes));
            Ok(())
        })?;

        let mut report = session.finish();
        for (path, bytes) in files {
            report.record_file(path, bytes);
        }
        Ok(report)
    }
}

#[derive(Debug)]
struct CompiledColumn {
    name: String,
    program: Program,
    is_primary_key: bool,
    declared_type: Option<String>,
    null_fraction: Option<f64>,
}

#[derive(Debug)]
struct CompiledTable {
    name: String,
    start_row_id: i64,
    row_count: u64,
    columns: Vec<CompiledColumn>,
    column_names: HashSet<String>,
    /// Column indices in evaluation order.
    order: Vec<usize>,
    key_columns: Vec<String>,
}

/// State of one generation run: compiled tables, random sources and the
/// key and parent-row caches shared by every table and chunk of the run.
pub struct GenerationSession<'s> {
    schema: &'s SchemaFile,
    run_id: String,
    started: Instant,
    determinism: Determinism,
    faker: FakeProvider,
    functions: &'s FunctionRegistry,
    imports: Vec<String>,
    tables: Vec<CompiledTable>,
    programs: HashMap<String, Program>,
    foreign: InMemoryForeignContext,
    /// Null positions per (table, column), drawn once over the whole table.
    null_positions: HashMap<(String, String), HashSet<u64>>,
    report: GenerationReport,
}

impl<'s> GenerationSession<'s> {
    pub fn new(
        schema: &'s SchemaFile,
        options: &GenerateOptions,
        functions: &'s FunctionRegistry,
    ) -> Result<Self, GenerationError> {
        validate_schema(schema)?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let determinism = Determinism::new(options.seed.or(schema.config.seed));
        let locale_name = options
            .locale
            .clone()
            .or_else(|| schema.config.locale.clone())
            .unwrap_or_else(|| LocaleKey::default().as_str().to_string());
        let locale = LocaleKey::parse(&locale_name).ok_or_else(|| {
            tabula_core::Error::InvalidSchema(format!("unsupported locale '{locale_name}'"))
        })?;
        let reference_date = match options.reference_date {
            Some(date) => Some(date),
            None => schema
                .config
                .reference_date
                .as_deref()
                .map(|raw| {
                    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                        tabula_core::Error::InvalidSchema(format!(
                            "reference_date '{raw}' must be YYYY-MM-DD"
                        ))
                    })
                })
                .transpose()?,
        };
        let clock = reference_date
            .unwrap_or_else(|| Utc::now().date_naive())
            .and_time(NaiveTime::MIN);

        let mut report = GenerationReport::new(run_id.clone());
        report.seed = determinism.run_seed();
        report.seed_explicit = determinism.is_explicit();
        report.locale = locale.as_str().to_string();

        for import in &schema.config.imports {
            if !functions.has_namespace(import) {
                warn!(run_id = %run_id, import = %import, "import has no registered namespace");
                report.record_warning(GenerationIssue::warning(
                    "unknown_import",
                    format!("import '{import}' has no registered namespace"),
                ));
            }
        }

        let infer = options
            .infer_entity_attrs_by_name
            .unwrap_or(schema.config.infer_entity_attrs_by_name);
        let mut programs = HashMap::new();
        let mut tables = Vec::with_capacity(schema.tables.len());
        for table in &schema.tables {
            let compiled = compile_table(table, infer, &mut programs, &mut report)?;
            tables.push(compiled);
        }

        Ok(Self {
            schema,
            run_id,
            started: Instant::now(),
            determinism,
            faker: FakeProvider::new(locale, clock),
            functions,
            imports: schema.config.imports.clone(),
            tables,
            programs,
            foreign: InMemoryForeignContext::new(),
            null_positions: HashMap::new(),
            report,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn report(&self) -> &GenerationReport {
        &self.report
    }

    /// Key and parent-row caches filled so far.
    pub fn foreign(&self) -> &InMemoryForeignContext {
        &self.foreign
    }

    /// Generate tables in declaration order, handing each finished chunk to `sink`
    /// together with its task and chunk index.
    pub fn run<F>(&mut self, only: Option<&str>, mut sink: F) -> Result<(), GenerationError>
    where
        F: FnMut(&GenerationTask, usize, GeneratedTable) -> Result<(), GenerationError>,
    {
        let tasks = plan_tables(self.schema, only)?;
        info!(
            run_id = %self.run_id,
            tables = tasks.len(),
            seed = self.report.seed,
            seed_explicit = self.report.seed_explicit,
            locale = %self.report.locale,
            "generation started"
        );

        let outcome = self.run_tasks(&tasks, &mut sink);
        match outcome {
            Ok(()) => {
                info!(
                    run_id = %self.run_id,
                    tables = self.report.tables.len(),
                    rows = self.report.rows_total,
                    duration_ms = self.started.elapsed().as_millis() as u64,
                    "generation completed"
                );
                Ok(())
            }
            Err(err) => {
                warn!(run_id = %self.run_id, error = %err, "generation failed");
                Err(err)
            }
        }
    }

    fn run_tasks<F>(&mut self, tasks: &[GenerationTask], sink: &mut F) -> Result<(), GenerationError>
    where
        F: FnMut(&GenerationTask, usize, GeneratedTable) -> Result<(), GenerationError>,
    {
        for task in tasks {
            let table_start = Instant::now();
            info!(
                run_id = %self.run_id,
                table = %task.table,
                rows = task.rows,
                chunks = task.chunks.len(),
                "generating table"
            );
            {
                let entry = self.report.table_mut(&task.table);
                entry.rows_requested = task.rows;
                entry.exported = task.export;
            }
            self.register_table(&task.table)?;
            for (index, range) in task.chunks.iter().enumerate() {
                let chunk = self.generate_chunk(&task.table, *range)?;
                sink(task, index, chunk)?;
            }
            let duration_ms = table_start.elapsed().as_millis() as u64;
            let entry = self.report.table_mut(&task.table);
            entry.duration_ms = duration_ms;
            info!(
                run_id = %self.run_id,
                table = %task.table,
                rows_generated = entry.rows_generated,
                duplicate_keys = entry.duplicate_keys,
                nulls_injected = entry.nulls_injected,
                duration_ms,
                "table generated"
            );
        }
        Ok(())
    }

    /// Open the key and parent-row caches of `table`. Tables without rows are
    /// registered too, so references to them fail on the empty key cache.
    fn register_table(&mut self, table: &str) -> Result<(), GenerationError> {
        if self.foreign.is_registered(table) {
            return Ok(());
        }
        let compiled = self
            .tables
            .iter()
            .find(|compiled| compiled.name == table)
            .ok_or_else(|| GenerationError::UnknownTable(table.to_string()))?;
        let columns: Vec<String> = compiled.columns.iter().map(|column| column.name.clone()).collect();
        self.foreign.register_table(&compiled.name, &columns, &compiled.key_columns);
        Ok(())
    }

    /// Generate every row of `table` in a single pass.
    pub fn generate_table(&mut self, table: &str) -> Result<GeneratedTable, GenerationError> {
        let schema_table = self
            .schema
            .table(table)
            .ok_or_else(|| GenerationError::UnknownTable(table.to_string()))?;
        let range = RowRange {
            offset: 0,
            len: schema_table.row_count(),
        };
        self.generate_chunk(table, range)
    }

    /// Generate the rows of `table` at positions `range`.
    ///
    /// Chunks of one table must be requested in order; the key and parent-row
    /// caches keep growing across chunks and tables.
    pub fn generate_chunk(&mut self, table: &str, range: RowRange) -> Result<GeneratedTable, GenerationError> {
        let chunk_start = Instant::now();
        self.register_table(table)?;
        let Self {
            run_id,
            determinism,
            faker,
            functions,
            imports,
            tables,
            programs,
            foreign,
            null_positions,
            report,
            ..
        } = self;
        let table = tables
            .iter()
            .find(|compiled| compiled.name == table)
            .ok_or_else(|| GenerationError::UnknownTable(table.to_string()))?;

        let symbols = TableSymbols {
            table: &table.name,
            columns: &table.column_names,
            functions: *functions,
            imports: imports.as_slice(),
            programs: &*programs,
        };

        let mut rows = Vec::with_capacity(range.len as usize);
        for position in range.offset..range.end() {
            let row_id = table.start_row_id + position as i64;
            let mut rng = determinism.row_rng(&table.name, row_id);
            let mut row = RowMap::new();
            let mut row_keys: HashSet<String> = HashSet::new();

            for &index in &table.order {
                let column = &table.columns[index];
                let value = {
                    let mut env = Environment::new(symbols, row_id, &row, &mut rng, faker, &*foreign);
                    column
                        .program
                        .evaluate(&mut env)
                        .map_err(|err| column_error(&table.name, column, err))?
                };
                row.insert(column.name.clone(), value.clone());

                if column.is_primary_key {
                    foreign.record_key(&table.name, &column.name, value.clone());
                    let key = value_key(&value);
                    let replaced = foreign.record_parent(&table.name, &value, &row);
                    if replaced.is_some() && !row_keys.contains(&key) {
                        warn!(
                            run_id = %run_id,
                            table = %table.name,
                            column = %column.name,
                            row_id,
                            key = %value,
                            "duplicate primary key replaces cached parent row"
                        );
                        report.record_duplicate_key(&table.name);
                        if report.table(&table.name).is_some_and(|entry| entry.duplicate_keys == 1) {
                            report.record_warning(
                                GenerationIssue::warning(
                                    "duplicate_primary_key",
                                    format!("duplicate primary key {value} in {}.{}", table.name, column.name),
                                )
                                .at(&table.name, Some(&column.name)),
                            );
                        }
                    }
                    row_keys.insert(key);
                }
            }

            // Refresh the cached parent row now that phase B is done.
            for column in table.columns.iter().filter(|column| column.is_primary_key) {
                if let Some(key) = row.get(&column.name) {
                    foreign.record_parent(&table.name, key, &row);
                }
            }
            foreign.record_row(&table.name, row.clone());
            rows.push(row);
        }

        for column in &table.columns {
            if let Some(declared) = &column.declared_type {
                coerce_column(&table.name, &column.name, declared, &mut rows)?;
            }
        }

        for column in &table.columns {
            let Some(fraction) = column.null_fraction.filter(|fraction| *fraction > 0.0) else {
                continue;
            };
            let positions = null_positions
                .entry((table.name.clone(), column.name.clone()))
                .or_insert_with(|| {
                    let total = table.row_count as usize;
                    let amount = ((table.row_count as f64) * fraction).floor() as usize;
                    let mut rng = determinism.null_rng(&table.name, &column.name);
                    rand::seq::index::sample(&mut rng, total, amount.min(total))
                        .into_iter()
                        .map(|position| position as u64)
                        .collect()
                });
            let mut injected = 0_u64;
            for (offset, row) in rows.iter_mut().enumerate() {
                if positions.contains(&(range.offset + offset as u64)) {
                    row.insert(column.name.clone(), GeneratedValue::Null);
                    injected += 1;
                }
            }
            report.record_nulls(&table.name, injected);
        }

        report.record_rows(&table.name, rows.len() as u64);
        report.table_mut(&table.name).chunks += 1;
        info!(
            run_id = %run_id,
            table = %table.name,
            offset = range.offset,
            rows = rows.len(),
            duration_ms = chunk_start.elapsed().as_millis() as u64,
            "chunk generated"
        );

        Ok(GeneratedTable {
            name: table.name.clone(),
            columns: table.columns.iter().map(|column| column.name.clone()).collect(),
            rows,
            range,
        })
    }

    /// Close the run and return its report.
    pub fn finish(mut self) -> GenerationReport {
        self.report.duration_ms = self.started.elapsed().as_millis() as u64;
        self.report
    }
}

fn compile_table(
    table: &Table,
    infer: bool,
    programs: &mut HashMap<String, Program>,
    report: &mut GenerationReport,
) -> Result<CompiledTable, GenerationError> {
    let syntax_error = |column: &str, message: String| GenerationError::Syntax {
        table: table.name.clone(),
        column: column.to_string(),
        message,
    };

    let mut compiled: Vec<Option<Program>> = Vec::with_capacity(table.columns.len());
    for column in &table.columns {
        if column.is_auto() {
            compiled.push(None);
            continue;
        }
        let source = column.expression().unwrap_or_default();
        let program = Program::compile(&source, &function_name(&table.name, &column.name))
            .map_err(|err| syntax_error(&column.name, err.message))?;
        compiled.push(Some(program));
    }

    let parents = foreign_key_parents(
        table
            .columns
            .iter()
            .zip(&compiled)
            .filter_map(|(column, program)| program.as_ref().map(|program| (column.name.as_str(), program))),
    );

    let mut columns = Vec::with_capacity(table.columns.len());
    for (column, program) in table.columns.iter().zip(compiled) {
        let program = match program {
            Some(program) => program,
            None => {
                let source = infer
                    .then(|| infer_copy_source(&column.name, &parents))
                    .flatten()
                    .ok_or_else(|| {
                        syntax_error(
                            &column.name,
                            "data='auto' but could not be automatically inferred".to_string(),
                        )
                    })?;
                Program::compile(&source, &function_name(&table.name, &column.name))
                    .map_err(|err| syntax_error(&column.name, err.message))?
            }
        };
        if let Some(name) = program.function_name() {
            programs.insert(name.to_string(), program.clone());
        }
        columns.push(CompiledColumn {
            name: column.name.clone(),
            program,
            is_primary_key: column.is_primary_key,
            declared_type: column.column_type.clone(),
            null_fraction: column.null_fraction(),
        });
    }

    let infos: Vec<ColumnInfo<'_>> = columns
        .iter()
        .map(|column| ColumnInfo {
            name: &column.name,
            is_primary_key: column.is_primary_key,
            program: &column.program,
        })
        .collect();
    let phases = classify(&table.name, &infos);
    for (index, late) in &phases.early_keys {
        report.record_warning(
            GenerationIssue::warning(
                "primary_key_forward_reference",
                format!(
                    "primary key {} reads {} before they are generated",
                    columns[*index].name,
                    late.join(", ")
                ),
            )
            .at(&table.name, Some(&columns[*index].name)),
        );
    }
    let order = phases.order().collect();

    Ok(CompiledTable {
        name: table.name.clone(),
        start_row_id: table.start_row_id(),
        row_count: table.row_count(),
        column_names: columns.iter().map(|column| column.name.clone()).collect(),
        key_columns: table.primary_key_columns().map(|column| column.name.clone()).collect(),
        columns,
        order,
    })
}

/// `func_<table>_<column>` with anything outside `[A-Za-z0-9_]` replaced.
fn function_name(table: &str, column: &str) -> String {
    format!("func_{table}_{column}")
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect()
}

fn column_error(table: &str, column: &CompiledColumn, err: ExprError) -> GenerationError {
    match err {
        ExprError::Eval { kind, message } => EvaluationError {
            table: table.to_string(),
            column: column.name.clone(),
            expression: column.program.source().to_string(),
            kind,
            message,
        }
        .into(),
        ExprError::ForeignKey(err) => err.into(),
        ExprError::Copy(err) => err.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EvalErrorKind;
    use tabula_core::parse_schema_yaml;

    fn schema(yaml: &str) -> SchemaFile {
        parse_schema_yaml(yaml).unwrap()
    }

    fn options(seed: u64) -> GenerateOptions {
        GenerateOptions {
            seed: Some(seed),
            reference_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..GenerateOptions::default()
        }
    }

    #[test]
    fn phase_b_columns_see_phase_a_values() {
        let schema = schema(
            r#"
tables:
  - table_name: people
    row_count: 3
    columns:
      - column_name: label
        data: "name.upper() + '#' + str(id)"
      - column_name: id
        data: row_id
        is_primary_key: true
      - column_name: name
        data: "'ann'"
"#,
        );
        let engine = GenerationEngine::new(options(1));
        let mut session = engine.session(&schema).unwrap();
        let table = session.generate_table("people").unwrap();
        assert_eq!(table.columns, vec!["label", "id", "name"]);
        assert_eq!(
            table.column_values("label"),
            vec!["ANN#1".into(), "ANN#2".into(), "ANN#3".into()]
        );
    }

    #[test]
    fn statement_bodies_run_as_functions() {
        let schema = schema(
            r#"
tables:
  - table_name: grades
    row_count: 4
    start_row_id: 10
    columns:
      - column_name: grade
        data: |
          if row_id % 2 == 0:
              return 'even'
          return 'odd'
"#,
        );
        let (tables, _) = GenerationEngine::new(options(1)).generate(&schema).unwrap();
        assert_eq!(
            tables[0].column_values("grade"),
            vec!["even".into(), "odd".into(), "even".into(), "odd".into()]
        );
    }

    #[test]
    fn duplicate_primary_keys_are_counted_once_per_collision() {
        let schema = schema(
            r#"
tables:
  - table_name: codes
    row_count: 6
    columns:
      - column_name: code
        data: row_id % 2
        is_primary_key: true
      - column_name: twin
        data: row_id % 2
        is_primary_key: true
"#,
        );
        let (_, report) = GenerationEngine::new(options(1)).generate(&schema).unwrap();
        assert_eq!(report.duplicate_keys_total, 4);
        assert_eq!(report.warnings_by_code.get("duplicate_primary_key"), Some(&1));
    }

    #[test]
    fn text_and_integer_keys_with_equal_text_are_distinct() {
        let schema = schema(
            r#"
tables:
  - table_name: codes
    row_count: 4
    columns:
      - column_name: code
        data: str(row_id) if row_id <= 2 else row_id - 2
        is_primary_key: true
      - column_name: label
        data: "'row ' + str(row_id)"
  - table_name: refs
    row_count: 20
    columns:
      - column_name: code
        data: foreign_key("codes", "code")
      - column_name: label
        data: copy_from_fk("code", "codes", "label")
"#,
        );
        let (tables, report) = GenerationEngine::new(options(1)).generate(&schema).unwrap();
        assert_eq!(
            tables[0].column_values("code"),
            vec!["1".into(), "2".into(), GeneratedValue::Int(1), GeneratedValue::Int(2)]
        );
        assert_eq!(report.duplicate_keys_total, 0);

        let expected = |code: &GeneratedValue| match code {
            GeneratedValue::Text(text) => format!("row {text}"),
            GeneratedValue::Int(value) => format!("row {}", value + 2),
            other => panic!("unexpected key {other:?}"),
        };
        for row in &tables[1].rows {
            assert_eq!(row["label"], GeneratedValue::Text(expected(&row["code"])));
        }
    }

    #[test]
    fn unresolved_auto_columns_fail_before_generation() {
        let schema = schema(
            r#"
config:
  infer_entity_attrs_by_name: true
tables:
  - table_name: orders
    columns:
      - column_name: store_name
        data: auto
"#,
        );
        let err = GenerationEngine::new(options(1)).session(&schema).err().unwrap();
        assert!(matches!(err, GenerationError::Syntax { ref column, .. } if column == "store_name"));
    }

    #[test]
    fn evaluation_errors_carry_the_expression() {
        let schema = schema(
            r#"
tables:
  - table_name: t
    row_count: 1
    columns:
      - column_name: c
        data: fake.not_a_provider()
"#,
        );
        let err = GenerationEngine::new(options(1)).generate(&schema).unwrap_err();
        match err {
            GenerationError::Expression(err) => {
                assert_eq!(err.kind, EvalErrorKind::UnknownAttribute);
                assert_eq!(err.expression, "fake.not_a_provider()");
                assert_eq!(err.column, "c");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn function_names_are_sanitized() {
        assert_eq!(function_name("order-items", "unit price"), "func_order_items_unit_price");
    }
}
