use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Options for the generation engine. Set fields override the schema's
/// `config` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Run-level seed; without one every run draws a fresh seed.
    pub seed: Option<u64>,
    /// Fake-data locale (`en_US`, `pt_BR`).
    pub locale: Option<String>,
    /// Date that `today()`/`now()` helpers and relative date bounds resolve against.
    pub reference_date: Option<NaiveDate>,
    /// Resolve `data: auto` columns from their names.
    pub infer_entity_attrs_by_name: Option<bool>,
}

/// Summary of a generated table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    pub rows_requested: u64,
    pub rows_generated: u64,
    pub chunks: u64,
    pub exported: bool,
    pub duplicate_keys: u64,
    pub nulls_injected: u64,
    pub duration_ms: u64,
}

/// Structured generation issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationIssue {
    pub level: String,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl GenerationIssue {
    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Self {
            level: "warning".to_string(),
            code: code.to_string(),
            message: message.into(),
            table: None,
            column: None,
        }
    }

    pub fn at(mut self, table: &str, column: Option<&str>) -> Self {
        self.table = Some(table.to_string());
        self.column = column.map(str::to_string);
        self
    }
}

/// Report for a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub seed: u64,
    /// `false` when the seed was drawn at random for this run.
    pub seed_explicit: bool,
    pub locale: String,
    pub tables: Vec<TableReport>,
    pub rows_total: u64,
    pub duplicate_keys_total: u64,
    pub nulls_injected_total: u64,
    pub files_written: Vec<String>,
    pub bytes_written: u64,
    pub duration_ms: u64,
    pub warnings_by_code: BTreeMap<String, u64>,
    pub warnings: Vec<GenerationIssue>,
}

impl GenerationReport {
    pub fn new(run_id: String) -> Self {
        Self {
            run_id,
            seed: 0,
            seed_explicit: false,
            locale: String::new(),
            tables: Vec::new(),
            rows_total: 0,
            duplicate_keys_total: 0,
            nulls_injected_total: 0,
            files_written: Vec::new(),
            bytes_written: 0,
            duration_ms: 0,
            warnings_by_code: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Report entry for `table`, created on first use.
    pub fn table_mut(&mut self, table: &str) -> &mut TableReport {
        let index = match self.tables.iter().position(|report| report.table == table) {
            Some(index) => index,
            None => {
                self.tables.push(TableReport {
                    table: table.to_string(),
                    ..TableReport::default()
                });
                self.tables.len() - 1
            }
        };
        &mut self.tables[index]
    }

    pub fn table(&self, table: &str) -> Option<&TableReport> {
        self.tables.iter().find(|report| report.table == table)
    }

    pub fn record_rows(&mut self, table: &str, rows: u64) {
        self.table_mut(table).rows_generated += rows;
        self.rows_total += rows;
    }

    pub fn record_duplicate_key(&mut self, table: &str) {
        self.table_mut(table).duplicate_keys += 1;
        self.duplicate_keys_total += 1;
    }

    pub fn record_nulls(&mut self, table: &str, count: u64) {
        self.table_mut(table).nulls_injected += count;
        self.nulls_injected_total += count;
    }

    pub fn record_file(&mut self, path: String, bytes: u64) {
        self.files_written.push(path);
        self.bytes_written += bytes;
    }

    pub fn record_warning(&mut self, issue: GenerationIssue) {
        *self.warnings_by_code.entry(issue.code.clone()).or_insert(0) += 1;
        self.warnings.push(issue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_table_and_in_total() {
        let mut report = GenerationReport::new("run".to_string());
        report.record_rows("a", 5);
        report.record_rows("a", 3);
        report.record_rows("b", 2);
        report.record_duplicate_key("b");
        report.record_warning(GenerationIssue::warning("duplicate_primary_key", "dup").at("b", Some("id")));

        assert_eq!(report.table("a").map(|table| table.rows_generated), Some(8));
        assert_eq!(report.rows_total, 10);
        assert_eq!(report.duplicate_keys_total, 1);
        assert_eq!(report.warnings_by_code.get("duplicate_primary_key"), Some(&1));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["tables"][1]["table"], "b");
    }
}
