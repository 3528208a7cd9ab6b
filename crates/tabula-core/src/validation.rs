use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::schema::{RunConfig, SchemaFile, Table};
use crate::types::DeclaredType;

/// Locales the fake-data provider understands.
pub const SUPPORTED_LOCALES: &[&str] = &["en_US", "pt_BR"];

/// Validate a schema file before any row is generated.
///
/// This checks:
/// - run config (locale, reference date)
/// - duplicate tables/columns and empty tables
/// - every column carries a `data` expression (or is left to name inference)
/// - primary keys never carry a `null_percentage`
/// - null percentages, declared types and chunk hints are well formed
pub fn validate_schema(schema: &SchemaFile) -> Result<()> {
    validate_config(&schema.config)?;

    if schema.tables.is_empty() {
        return Err(Error::InvalidSchema(
            "schema must declare at least one table".to_string(),
        ));
    }

    let mut tables = BTreeSet::new();
    for table in &schema.tables {
        if table.name.trim().is_empty() {
            return Err(Error::InvalidSchema("table name is empty".to_string()));
        }
        if !tables.insert(table.name.as_str()) {
            return Err(Error::InvalidSchema(format!(
                "duplicate table name: {}",
                table.name
            )));
        }
        validate_table(table, schema.config.infer_entity_attrs_by_name)?;
    }

    Ok(())
}

fn validate_config(config: &RunConfig) -> Result<()> {
    if let Some(locale) = &config.locale
        && !SUPPORTED_LOCALES.contains(&locale.as_str())
    {
        return Err(Error::InvalidSchema(format!(
            "unsupported locale '{locale}' (expected one of: {})",
            SUPPORTED_LOCALES.join(", ")
        )));
    }

    if let Some(reference_date) = &config.reference_date
        && NaiveDate::parse_from_str(reference_date, "%Y-%m-%d").is_err()
    {
        return Err(Error::InvalidSchema(format!(
            "reference_date '{reference_date}' must be YYYY-MM-DD"
        )));
    }

    Ok(())
}

fn validate_table(table: &Table, infer_attrs: bool) -> Result<()> {
    if table.columns.is_empty() {
        return Err(Error::InvalidSchema(format!(
            "table {} declares no columns",
            table.name
        )));
    }

    if table.export_file_row_count == Some(0) {
        return Err(Error::InvalidSchema(format!(
            "table {}: export_file_row_count must be at least 1",
            table.name
        )));
    }
    if table.export_file_count == Some(0) {
        return Err(Error::InvalidSchema(format!(
            "table {}: export_file_count must be at least 1",
            table.name
        )));
    }

    let mut columns = BTreeSet::new();
    for column in &table.columns {
        if column.name.trim().is_empty() {
            return Err(Error::InvalidSchema(format!(
                "table {} has a column with an empty name",
                table.name
            )));
        }
        if !columns.insert(column.name.as_str()) {
            return Err(Error::InvalidSchema(format!(
                "duplicate column name: {}.{}",
                table.name, column.name
            )));
        }

        match column.expression() {
            Some(source) if !source.trim().is_empty() => {}
            None if infer_attrs => {}
            _ => {
                return Err(Error::InvalidSchema(format!(
                    "column {}.{} has no data expression",
                    table.name, column.name
                )));
            }
        }

        if let Some(null_percentage) = &column.null_percentage {
            if column.is_primary_key {
                return Err(Error::InvalidSchema(format!(
                    "primary key column {}.{} cannot have null_percentage",
                    table.name, column.name
                )));
            }
            if null_percentage.fraction().is_none() {
                return Err(Error::InvalidSchema(format!(
                    "column {}.{}: null_percentage {:?} is not a fraction in [0, 1] or a percent",
                    table.name, column.name, null_percentage
                )));
            }
        }

        if let Some(column_type) = &column.column_type
            && DeclaredType::parse(column_type).is_none()
        {
            return Err(Error::InvalidSchema(format!(
                "column {}.{}: unknown type '{}'",
                table.name, column.name, column_type
            )));
        }
    }

    Ok(())
}
