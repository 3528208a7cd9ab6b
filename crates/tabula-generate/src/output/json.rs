use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::ser::PrettyFormatter;

use crate::engine::GeneratedTable;
use crate::errors::GenerationError;
use crate::value::{GeneratedValue, RowMap};

use super::CountingWriter;

/// Write a chunk as a JSON array of records indented by four spaces.
pub fn write_table_json(path: &Path, table: &GeneratedTable) -> Result<u64, GenerationError> {
    let file = BufWriter::new(File::create(path)?);
    write_json(CountingWriter::new(file), table)
}

pub(crate) fn write_json<W: Write>(writer: CountingWriter<W>, table: &GeneratedTable) -> Result<u64, GenerationError> {
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
    Records(table).serialize(&mut serializer)?;
    let mut writer = serializer.into_inner();
    writer.flush()?;
    Ok(writer.bytes_written())
}

struct Records<'a>(&'a GeneratedTable);

impl Serialize for Records<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.rows.len()))?;
        for row in &self.0.rows {
            seq.serialize_element(&Record {
                columns: &self.0.columns,
                row,
            })?;
        }
        seq.end()
    }
}

/// One row as an object whose keys follow the declared column order.
struct Record<'a> {
    columns: &'a [String],
    row: &'a RowMap,
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for column in self.columns {
            let value = self.row.get(column).unwrap_or(&GeneratedValue::Null);
            map.serialize_entry(column, &value.to_json())?;
        }
        map.end()
    }
}
