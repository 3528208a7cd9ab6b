use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::engine::GeneratedTable;

use super::CountingWriter;

/// Write a chunk as CSV with the declared column order; null cells are empty.
pub fn write_table_csv(path: &Path, table: &GeneratedTable) -> Result<u64, csv::Error> {
    let file = BufWriter::new(File::create(path).map_err(csv::Error::from)?);
    let bytes = write_csv(CountingWriter::new(file), table)?;
    Ok(bytes)
}

pub(crate) fn write_csv<W: Write>(writer: CountingWriter<W>, table: &GeneratedTable) -> Result<u64, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    writer.write_record(&table.columns)?;
    for row in &table.rows {
        let record: Vec<String> = table
            .columns
            .iter()
            .map(|column| row.get(column).map(|value| value.to_csv()).unwrap_or_default())
            .collect();
        writer.write_record(&record)?;
    }

    writer.flush()?;
    let counting = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(counting.bytes_written())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::RowRange;
    use crate::value::{GeneratedValue, RowMap};

    #[test]
    fn header_then_rows_with_empty_nulls() {
        let table = GeneratedTable {
            name: "t".to_string(),
            columns: vec!["id".to_string(), "note".to_string()],
            rows: vec![
                RowMap::from([("id".to_string(), GeneratedValue::Int(1)), ("note".to_string(), "a,b".into())]),
                RowMap::from([("id".to_string(), GeneratedValue::Int(2)), ("note".to_string(), GeneratedValue::Null)]),
            ],
            range: RowRange { offset: 0, len: 2 },
        };
        let mut buffer = Vec::new();
        let bytes = write_csv(CountingWriter::new(&mut buffer), &table).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "id,note\n1,\"a,b\"\n2,\n");
        assert_eq!(bytes, text.len() as u64);
    }
}
