use thiserror::Error;

/// Core error type shared across tabula crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The schema violates internal invariants.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// The schema file has an extension we cannot parse.
    #[error("unsupported schema format: {0}")]
    UnsupportedFormat(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for results returned by tabula crates.
pub type Result<T> = std::result::Result<T, Error>;
