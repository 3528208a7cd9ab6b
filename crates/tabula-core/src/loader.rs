use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::schema::SchemaFile;
use crate::validation::validate_schema;

/// Load and validate a schema file, choosing the format from its extension.
pub fn load_schema(path: impl AsRef<Path>) -> Result<SchemaFile> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let contents = fs::read_to_string(path)?;
    match extension.as_str() {
        "yaml" | "yml" => parse_schema_yaml(&contents),
        "json" => parse_schema_json(&contents),
        _ => Err(Error::UnsupportedFormat(path.display().to_string())),
    }
}

/// Parse and validate a YAML schema document.
pub fn parse_schema_yaml(contents: &str) -> Result<SchemaFile> {
    let schema: SchemaFile = serde_yaml::from_str(contents)?;
    validate_schema(&schema)?;
    Ok(schema)
}

/// Parse and validate a JSON schema document.
pub fn parse_schema_json(contents: &str) -> Result<SchemaFile> {
    let schema: SchemaFile = serde_json::from_str(contents)?;
    validate_schema(&schema)?;
    Ok(schema)
}
