use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Value of a column's `data` key.
///
/// Strings are expression source; scalars are constants that compile to
/// themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum DataSpec {
    Expression(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl DataSpec {
    pub fn source(&self) -> String {
        match self {
            DataSpec::Expression(source) => source.clone(),
            DataSpec::Integer(value) => value.to_string(),
            DataSpec::Float(value) => format!("{value:?}"),
            DataSpec::Boolean(true) => "True".to_string(),
            DataSpec::Boolean(false) => "False".to_string(),
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, DataSpec::Expression(source) if source.trim() == "auto")
    }
}

/// Share of rows nulled after generation.
///
/// Accepts a fraction (`0.1`), a percent number (`10`), or a percent string
/// (`"10%"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum NullPercentage {
    Number(f64),
    Text(String),
}

impl NullPercentage {
    pub fn fraction(&self) -> Option<f64> {
        let (value, percent) = match self {
            NullPercentage::Number(value) => (*value, false),
            NullPercentage::Text(text) => {
                let text = text.trim();
                let (digits, percent) = if let Some(stripped) = text.strip_suffix('%') {
                    (stripped, true)
                } else if let Some(stripped) = text.strip_prefix('%') {
                    (stripped, true)
                } else {
                    (text, false)
                };
                (digits.trim().parse::<f64>().ok()?, percent)
            }
        };

        if !value.is_finite() || value < 0.0 {
            return None;
        }
        if !percent && value <= 1.0 {
            return Some(value);
        }
        if value <= 100.0 {
            return Some(value / 100.0);
        }
        None
    }
}

/// Declared column type applied by the coercion post-pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclaredType {
    Text,
    Integer { bits: u8, signed: bool },
    Float { single: bool },
    Boolean,
    Date,
    Timestamp,
    /// Values pass through unchanged (`object`, `category`).
    Passthrough,
}

impl DeclaredType {
    pub fn parse(value: &str) -> Option<Self> {
        let ty = match value.trim() {
            "string" | "str" | "text" => Self::Text,
            "object" | "category" => Self::Passthrough,
            "int" | "integer" | "int64" | "Int64" => Self::Integer {
                bits: 64,
                signed: true,
            },
            "int32" | "Int32" => Self::Integer {
                bits: 32,
                signed: true,
            },
            "int16" | "Int16" => Self::Integer {
                bits: 16,
                signed: true,
            },
            "int8" | "Int8" => Self::Integer {
                bits: 8,
                signed: true,
            },
            "uint64" | "UInt64" => Self::Integer {
                bits: 64,
                signed: false,
            },
            "uint32" | "UInt32" => Self::Integer {
                bits: 32,
                signed: false,
            },
            "uint16" | "UInt16" => Self::Integer {
                bits: 16,
                signed: false,
            },
            "uint8" | "UInt8" => Self::Integer {
                bits: 8,
                signed: false,
            },
            "float" | "float64" | "Float64" | "double" => Self::Float { single: false },
            "float32" | "Float32" => Self::Float { single: true },
            "bool" | "boolean" => Self::Boolean,
            "date" => Self::Date,
            "datetime" | "datetime64" | "datetime64[ns]" | "timestamp" => Self::Timestamp,
            _ => return None,
        };
        Some(ty)
    }

    /// Inclusive integer bounds for the declared width.
    pub fn integer_bounds(&self) -> Option<(i128, i128)> {
        match *self {
            Self::Integer { bits, signed: true } => {
                let max = (1_i128 << (bits - 1)) - 1;
                Some((-max - 1, max))
            }
            Self::Integer {
                bits,
                signed: false,
            } => Some((0, (1_i128 << bits) - 1)),
            _ => None,
        }
    }
}
