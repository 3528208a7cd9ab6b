use tabula_core::{SchemaFile, Table};

use crate::errors::GenerationError;

/// Half-open slice `[offset, offset + len)` of a table's row positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub offset: u64,
    pub len: u64,
}

impl RowRange {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Planned generation task for a table.
#[derive(Debug, Clone)]
pub struct GenerationTask {
    pub table: String,
    pub rows: u64,
    /// `false` for tables generated only because a later table may reference them.
    pub export: bool,
    pub chunks: Vec<RowRange>,
}

/// Rows per chunk: `export_file_count` wins over `export_file_row_count`.
pub fn chunk_size(table: &Table) -> u64 {
    let rows = table.row_count();
    let size = match (table.export_file_count, table.export_file_row_count) {
        (Some(count), _) if count > 1 => rows.div_ceil(count),
        (_, Some(size)) => size,
        _ => rows,
    };
    size.max(1)
}

/// Ordered ranges partitioning `[0, row_count)`.
pub fn plan_chunks(table: &Table) -> Vec<RowRange> {
    let rows = table.row_count();
    let size = chunk_size(table);
    let mut chunks = Vec::with_capacity(rows.div_ceil(size) as usize);
    let mut offset = 0;
    while offset < rows {
        let len = size.min(rows - offset);
        chunks.push(RowRange { offset, len });
        offset += len;
    }
    chunks
}

/// Tables in declaration order. With `only`, generation stops at that table
/// and only it is exported; earlier tables still run so references resolve.
pub fn plan_tables(schema: &SchemaFile, only: Option<&str>) -> Result<Vec<GenerationTask>, GenerationError> {
    let last = match only {
        Some(name) => schema
            .tables
            .iter()
            .position(|table| table.name == name)
            .ok_or_else(|| GenerationError::UnknownTable(name.to_string()))?,
        None => schema.tables.len().saturating_sub(1),
    };

    Ok(schema
        .tables
        .iter()
        .take(last + 1)
        .enumerate()
        .map(|(index, table)| GenerationTask {
            table: table.name.clone(),
            rows: table.row_count(),
            export: only.is_none() || index == last,
            chunks: plan_chunks(table),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: u64, file_rows: Option<u64>, files: Option<u64>) -> Table {
        Table {
            name: "t".to_string(),
            row_count: Some(rows),
            start_row_id: None,
            export_file_row_count: file_rows,
            export_file_count: files,
            description: None,
            columns: Vec::new(),
        }
    }

    #[test]
    fn single_chunk_by_default() {
        assert_eq!(plan_chunks(&table(7, None, None)), vec![RowRange { offset: 0, len: 7 }]);
    }

    #[test]
    fn row_count_per_file_splits_with_a_short_tail() {
        let chunks = plan_chunks(&table(10, Some(4), None));
        assert_eq!(
            chunks,
            vec![
                RowRange { offset: 0, len: 4 },
                RowRange { offset: 4, len: 4 },
                RowRange { offset: 8, len: 2 },
            ]
        );
        assert_eq!(chunks[2].end(), 10);
    }

    #[test]
    fn file_count_overrides_file_row_count() {
        let chunks = plan_chunks(&table(10, Some(2), Some(3)));
        assert_eq!(chunks.iter().map(|chunk| chunk.len).collect::<Vec<_>>(), vec![4, 4, 2]);
    }

    #[test]
    fn empty_tables_have_no_chunks() {
        assert!(plan_chunks(&table(0, Some(5), None)).is_empty());
    }
}
