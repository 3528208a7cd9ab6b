//! Deterministic, relationally consistent fake data for tabula schema files.
//!
//! Tables are generated in declaration order. Within a row, independent
//! columns (phase A) run before columns reading their siblings (phase B);
//! foreign keys draw from the keys of earlier tables and `copy_from_fk`
//! reads attributes of the referenced parent row.

pub mod classify;
pub mod coerce;
pub mod engine;
pub mod errors;
pub mod expr;
pub mod faker_rs;
pub mod foreign;
pub mod functions;
pub mod infer;
pub mod model;
pub mod output;
pub mod planner;
pub mod seed;
pub mod value;

pub use engine::{GeneratedTable, GenerationEngine, GenerationSession};
pub use errors::{CopyError, EvalErrorKind, EvaluationError, ForeignKeyError, GenerationError};
pub use foreign::{Distribution, ForeignContext, ForeignKeyCall, InMemoryForeignContext};
pub use functions::{CallArgs, CustomFunction, FunctionRegistry};
pub use model::{GenerateOptions, GenerationIssue, GenerationReport, TableReport};
pub use output::OutputFormat;
pub use planner::{RowRange, plan_chunks, plan_tables};
pub use value::{GeneratedValue, RowMap};
