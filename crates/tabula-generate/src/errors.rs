use std::fmt;

use thiserror::Error;

/// Errors emitted by the generation engine.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Schema(#[from] tabula_core::Error),
    #[error("syntax error in {table}.{column}: {message}")]
    Syntax {
        table: String,
        column: String,
        message: String,
    },
    #[error(transparent)]
    Expression(#[from] EvaluationError),
    #[error("foreign key error: {0}")]
    ForeignKey(#[from] ForeignKeyError),
    #[error("copy error: {0}")]
    Copy(#[from] CopyError),
    #[error("cannot convert {table}.{column} to {declared}: {message}")]
    Coercion {
        table: String,
        column: String,
        declared: String,
        message: String,
    },
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Why an expression failed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    /// A generator, namespace member or value attribute does not exist.
    UnknownAttribute,
    /// A bare name or function is not defined.
    UndefinedName,
    Runtime,
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EvalErrorKind::UnknownAttribute => "attribute can not be found",
            EvalErrorKind::UndefinedName => "function can not be found",
            EvalErrorKind::Runtime => "expression failed",
        };
        f.write_str(label)
    }
}

/// An expression failed while generating a column value.
#[derive(Debug, Clone, Error)]
#[error("{kind} in {table}.{column}: {message}\n  expression: {expression}")]
pub struct EvaluationError {
    pub table: String,
    pub column: String,
    pub expression: String,
    pub kind: EvalErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForeignKeyError {
    #[error("table {table} not found while looking for primary key")]
    TableNotFound { table: String },
    #[error("column {column} not found in table {table} while looking for primary key")]
    ColumnNotFound { table: String, column: String },
    #[error("no keys in {table}.{column}")]
    EmptyKeys { table: String, column: String },
    #[error("unknown distribution {0}")]
    UnknownDistribution(String),
    #[error("{distribution} requires {parameter}")]
    MissingParameter {
        distribution: String,
        parameter: String,
    },
    #[error("invalid {parameter} for {distribution}: {message}")]
    InvalidParameter {
        distribution: String,
        parameter: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CopyError {
    #[error("foreign key column {column} has no value in the current row")]
    KeyNotMaterialized { column: String },
    #[error("parent table {table} has no cached rows")]
    ParentTableMissing { table: String },
    #[error("no row in {table} with key {key}")]
    ParentRowMissing { table: String, key: String },
    #[error("parent row {table}[{key}] has no attribute {attribute}")]
    AttributeMissing {
        table: String,
        key: String,
        attribute: String,
    },
}
