//! Core contracts and helpers for tabula.
//!
//! This crate defines the declarative schema model that drives generation,
//! schema-file loading, and the validation that runs before any row is built.

pub mod error;
pub mod loader;
pub mod schema;
pub mod types;
pub mod validation;

pub use error::{Error, Result};
pub use loader::{load_schema, parse_schema_json, parse_schema_yaml};
pub use schema::{Column, RunConfig, SchemaFile, Table};
pub use types::{DataSpec, DeclaredType, NullPercentage};
pub use validation::validate_schema;

/// Default number of rows generated for a table without `row_count`.
pub const DEFAULT_ROW_COUNT: u64 = 10;

/// Default first `row_id` of a table without `start_row_id`.
pub const DEFAULT_START_ROW_ID: i64 = 1;
