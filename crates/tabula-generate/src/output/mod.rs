//! Reference exporters for generated chunks.

pub mod csv;
pub mod json;

use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::GeneratedTable;
use crate::errors::GenerationError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unsupported file type '{other}' (expected csv or json)")),
        }
    }
}

/// `<table>.<ext>`, or `<table>_<n>.<ext>` (1-based) when the table spans several chunks.
pub fn chunk_file_name(table: &str, index: usize, chunks: usize, format: OutputFormat) -> String {
    let extension = format.extension();
    if chunks > 1 {
        format!("{table}_{}.{extension}", index + 1)
    } else {
        format!("{table}.{extension}")
    }
}

/// Write one chunk to `path`, returning the number of bytes written.
pub fn write_chunk(path: &Path, chunk: &GeneratedTable, format: OutputFormat) -> Result<u64, GenerationError> {
    match format {
        OutputFormat::Csv => Ok(csv::write_table_csv(path, chunk)?),
        OutputFormat::Json => json::write_table_json(path, chunk),
    }
}

pub(crate) struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    pub(crate) fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_suffix_only_for_split_tables() {
        assert_eq!(chunk_file_name("orders", 0, 1, OutputFormat::Csv), "orders.csv");
        assert_eq!(chunk_file_name("orders", 0, 3, OutputFormat::Json), "orders_1.json");
        assert_eq!(chunk_file_name("orders", 2, 3, OutputFormat::Csv), "orders_3.csv");
    }

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("CSV".parse::<OutputFormat>(), Ok(OutputFormat::Csv));
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("parquet".parse::<OutputFormat>().is_err());
    }
}
