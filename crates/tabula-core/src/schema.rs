use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{DataSpec, NullPercentage};
use crate::{DEFAULT_ROW_COUNT, DEFAULT_START_ROW_ID};

/// Top-level schema file describing every table of a generation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SchemaFile {
    /// Contract version of the schema file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Run-level settings.
    #[serde(default)]
    pub config: RunConfig,
    /// Tables in generation order. A table may only reference tables before it.
    pub tables: Vec<Table>,
}

impl SchemaFile {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|table| table.name == name)
    }
}

/// Run-level settings from the `config` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RunConfig {
    /// Fake-data locale (`en_US`, `pt_BR`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Seed applied once before any table is generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Helper namespaces made visible to expressions.
    #[serde(default, alias = "python_import", skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<String>,
    /// Resolve `data: auto` columns from foreign-key naming conventions.
    #[serde(default)]
    pub infer_entity_attrs_by_name: bool,
    /// Pins the date used by `today`/`now` helpers (`YYYY-MM-DD`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_date: Option<String>,
}

/// A generated table.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Table {
    #[serde(rename = "table_name", alias = "name")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_row_id: Option<i64>,
    /// Chunk size hint for memory-bounded export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_file_row_count: Option<u64>,
    /// Number of chunks; wins over `export_file_row_count` when greater than one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_file_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn row_count(&self) -> u64 {
        self.row_count.unwrap_or(DEFAULT_ROW_COUNT)
    }

    pub fn start_row_id(&self) -> i64 {
        self.start_row_id.unwrap_or(DEFAULT_START_ROW_ID)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|column| column.is_primary_key)
    }
}

/// A column and its generation expression.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Column {
    #[serde(rename = "column_name", alias = "name")]
    pub name: String,
    /// Generation expression or constant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataSpec>,
    /// Declared type applied after generation.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_percentage: Option<NullPercentage>,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Column {
    /// Expression source for this column, if any.
    pub fn expression(&self) -> Option<String> {
        self.data.as_ref().map(DataSpec::source)
    }

    /// `data: auto` or no `data` at all; resolved by name inference.
    pub fn is_auto(&self) -> bool {
        self.data.as_ref().is_none_or(DataSpec::is_auto)
    }

    /// Null fraction in `[0, 1]`; `None` when unset or malformed.
    pub fn null_fraction(&self) -> Option<f64> {
        self.null_percentage.as_ref().and_then(NullPercentage::fraction)
    }
}
