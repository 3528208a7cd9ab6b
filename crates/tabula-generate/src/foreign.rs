use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use rand::Rng;

use crate::errors::{CopyError, ForeignKeyError};
use crate::expr::ExprError;
use crate::functions::{CallArgs, expect_float};
use crate::seed::Determinism;
use crate::value::{GeneratedValue, RowMap, value_key};

const DEFAULT_ZIPF_EXPONENT: f64 = 1.2;

/// How a foreign-key call picks among the cached parent keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    Uniform,
    /// Index `i` in insertion order is weighted by `1 / (i + 1)^exponent`.
    Zipf { exponent: f64 },
    /// Each key is weighted by `weights[str(parent[parent_attr])]`, default 1.0.
    WeightedParent {
        parent_attr: String,
        weights: HashMap<String, f64>,
    },
}

/// A parsed `foreign_key(table, column, distribution, param, parent_attr, weights)` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyCall {
    pub table: String,
    pub column: String,
    pub distribution: Distribution,
    distribution_name: String,
    param: GeneratedValue,
    parent_attr: GeneratedValue,
}

impl ForeignKeyCall {
    pub fn uniform(table: &str, column: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            distribution: Distribution::Uniform,
            distribution_name: "uniform".to_string(),
            param: GeneratedValue::Null,
            parent_attr: GeneratedValue::Null,
        }
    }

    pub fn from_args(args: &CallArgs) -> Result<Self, ExprError> {
        args.check_keywords(
            "foreign_key",
            &[
                "table_name",
                "column_name",
                "distribution",
                "param",
                "parent_attr",
                "weights",
            ],
        )?;
        let table = name_arg(args, 0, "table_name")?;
        let column = name_arg(args, 1, "column_name")?;
        let distribution_name = args
            .text(2, "distribution")?
            .unwrap_or_else(|| "uniform".to_string());
        let param = args.get(3, "param").cloned().unwrap_or(GeneratedValue::Null);
        let parent_attr = args
            .get(4, "parent_attr")
            .cloned()
            .unwrap_or(GeneratedValue::Null);
        let weights = args.present(5, "weights");

        let distribution = match distribution_name.as_str() {
            "uniform" => Distribution::Uniform,
            "zipf" => {
                let exponent = match &param {
                    GeneratedValue::Null => DEFAULT_ZIPF_EXPONENT,
                    value => expect_float(value, "param").map_err(|_| {
                        ForeignKeyError::InvalidParameter {
                            distribution: "zipf".to_string(),
                            parameter: "param".to_string(),
                            message: format!("expected a number, got {}", value.type_name()),
                        }
                    })?,
                };
                if !exponent.is_finite() {
                    return Err(ForeignKeyError::InvalidParameter {
                        distribution: "zipf".to_string(),
                        parameter: "param".to_string(),
                        message: format!("exponent must be finite, got {exponent}"),
                    }
                    .into());
                }
                Distribution::Zipf { exponent }
            }
            "weighted_parent" => {
                let (Some(attr), Some(weights)) = (parent_attr.as_str(), weights) else {
                    return Err(ForeignKeyError::MissingParameter {
                        distribution: "weighted_parent".to_string(),
                        parameter: "parent_attr and weights".to_string(),
                    }
                    .into());
                };
                Distribution::WeightedParent {
                    parent_attr: attr.to_string(),
                    weights: weight_map(weights)?,
                }
            }
            other => return Err(ForeignKeyError::UnknownDistribution(other.to_string()).into()),
        };

        Ok(Self {
            table,
            column,
            distribution,
            distribution_name,
            param,
            parent_attr,
        })
    }

    /// Structural key of one pick: row id, target, distribution name and its
    /// parameters. Weights are not part of the key.
    pub fn seed_parts(&self, row_id: i64) -> [String; 6] {
        [
            row_id.to_string(),
            self.table.clone(),
            self.column.clone(),
            self.distribution_name.clone(),
            self.param.to_string(),
            self.parent_attr.to_string(),
        ]
    }
}

fn name_arg(args: &CallArgs, index: usize, name: &str) -> Result<String, ExprError> {
    match args.required(index, name, "foreign_key")? {
        GeneratedValue::Text(value) => Ok(value.clone()),
        other => Err(ExprError::runtime(format!(
            "foreign_key() argument '{name}' must be str, not {}",
            other.type_name()
        ))),
    }
}

fn weight_map(weights: &GeneratedValue) -> Result<HashMap<String, f64>, ForeignKeyError> {
    let invalid = |message: String| ForeignKeyError::InvalidParameter {
        distribution: "weighted_parent".to_string(),
        parameter: "weights".to_string(),
        message,
    };
    let GeneratedValue::Dict(entries) = weights else {
        return Err(invalid(format!("expected a dict, got {}", weights.type_name())));
    };
    let mut map = HashMap::with_capacity(entries.len());
    for (key, value) in entries {
        let weight = value
            .as_f64()
            .ok_or_else(|| invalid(format!("weight for {key} is not a number")))?;
        if !weight.is_finite() || weight < 0.0 {
            return Err(invalid(format!("weight for {key} must be a non-negative number")));
        }
        map.insert(key.to_string(), weight);
    }
    Ok(map)
}

/// Read access the evaluator needs to rows of earlier tables.
pub trait ForeignContext {
    fn pick_fk(&self, row_id: i64, call: &ForeignKeyCall) -> Result<GeneratedValue, ForeignKeyError>;
    fn lookup_parent(
        &self,
        table: &str,
        key: &GeneratedValue,
        attribute: &str,
    ) -> Result<GeneratedValue, CopyError>;
    /// Rows generated so far for `table`, as a list of dicts.
    fn table_rows(&self, table: &str) -> GeneratedValue;
}

#[derive(Debug, Default)]
struct TableCache {
    columns: Vec<String>,
    /// Primary-key values per key column, in generation order.
    keys: BTreeMap<String, Vec<GeneratedValue>>,
    /// Rows by primary-key value; absent for tables without a primary key.
    parents: Option<HashMap<String, RowMap>>,
    rows: Vec<RowMap>,
}

/// Primary-key and parent-row caches of one generation run.
#[derive(Debug, Default)]
pub struct InMemoryForeignContext {
    tables: HashMap<String, TableCache>,
    zipf_weights: RefCell<HashMap<(String, String, u64), Vec<f64>>>,
}

impl InMemoryForeignContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `table` visible to foreign-key calls. Existing entries are kept.
    pub fn register_table(&mut self, table: &str, columns: &[String], key_columns: &[String]) {
        let cache = self.tables.entry(table.to_string()).or_default();
        cache.columns = columns.to_vec();
        for column in key_columns {
            cache.keys.entry(column.clone()).or_default();
        }
        if !key_columns.is_empty() && cache.parents.is_none() {
            cache.parents = Some(HashMap::new());
        }
    }

    pub fn is_registered(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn record_key(&mut self, table: &str, column: &str, value: GeneratedValue) {
        if let Some(cache) = self.tables.get_mut(table) {
            cache.keys.entry(column.to_string()).or_default().push(value);
        }
    }

    /// Cache `row` under `key`, returning the row it replaces.
    pub fn record_parent(&mut self, table: &str, key: &GeneratedValue, row: &RowMap) -> Option<RowMap> {
        self.tables
            .get_mut(table)
            .and_then(|cache| cache.parents.as_mut())
            .and_then(|parents| parents.insert(value_key(key), row.clone()))
    }

    pub fn record_row(&mut self, table: &str, row: RowMap) {
        if let Some(cache) = self.tables.get_mut(table) {
            cache.rows.push(row);
        }
    }

    pub fn keys(&self, table: &str, column: &str) -> Option<&[GeneratedValue]> {
        self.tables
            .get(table)
            .and_then(|cache| cache.keys.get(column))
            .map(Vec::as_slice)
    }

    fn zipf_pick(&self, call: &ForeignKeyCall, exponent: f64, count: usize, draw: f64) -> usize {
        let mut cache = self.zipf_weights.borrow_mut();
        let cumulative = cache
            .entry((call.table.clone(), call.column.clone(), exponent.to_bits()))
            .or_default();
        let mut total = cumulative.last().copied().unwrap_or(0.0);
        for index in cumulative.len()..count {
            total += 1.0 / ((index + 1) as f64).powf(exponent);
            cumulative.push(total);
        }
        let prefix = &cumulative[..count];
        cumulative_index(prefix, draw * prefix[count - 1])
    }
}

/// First index whose cumulative weight reaches `target`; the last index when
/// rounding leaves `target` above every entry.
fn cumulative_index(cumulative: &[f64], target: f64) -> usize {
    cumulative
        .partition_point(|weight| *weight < target)
        .min(cumulative.len() - 1)
}

impl ForeignContext for InMemoryForeignContext {
    fn pick_fk(&self, row_id: i64, call: &ForeignKeyCall) -> Result<GeneratedValue, ForeignKeyError> {
        let cache = self
            .tables
            .get(&call.table)
            .ok_or_else(|| ForeignKeyError::TableNotFound {
                table: call.table.clone(),
            })?;
        let keys = cache
            .keys
            .get(&call.column)
            .ok_or_else(|| ForeignKeyError::ColumnNotFound {
                table: call.table.clone(),
                column: call.column.clone(),
            })?;
        if keys.is_empty() {
            return Err(ForeignKeyError::EmptyKeys {
                table: call.table.clone(),
                column: call.column.clone(),
            });
        }

        let parts = call.seed_parts(row_id);
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        let mut rng = Determinism::foreign_key_rng(&parts);

        let index = match &call.distribution {
            Distribution::Uniform => rng.random_range(0..keys.len()),
            Distribution::Zipf { exponent } => {
                self.zipf_pick(call, *exponent, keys.len(), rng.random::<f64>())
            }
            Distribution::WeightedParent {
                parent_attr,
                weights,
            } => {
                let mut cumulative = Vec::with_capacity(keys.len());
                let mut total = 0.0;
                for key in keys {
                    let attribute = cache
                        .parents
                        .as_ref()
                        .and_then(|parents| parents.get(&value_key(key)))
                        .and_then(|row| row.get(parent_attr))
                        .cloned()
                        .unwrap_or(GeneratedValue::Null);
                    total += weights.get(&attribute.to_string()).copied().unwrap_or(1.0);
                    cumulative.push(total);
                }
                cumulative_index(&cumulative, rng.random::<f64>() * total)
            }
        };

        Ok(keys[index].clone())
    }

    fn lookup_parent(
        &self,
        table: &str,
        key: &GeneratedValue,
        attribute: &str,
    ) -> Result<GeneratedValue, CopyError> {
        let parents = self
            .tables
            .get(table)
            .and_then(|cache| cache.parents.as_ref())
            .ok_or_else(|| CopyError::ParentTableMissing {
                table: table.to_string(),
            })?;
        let row = parents
            .get(&value_key(key))
            .ok_or_else(|| CopyError::ParentRowMissing {
                table: table.to_string(),
                key: key.to_string(),
            })?;
        row.get(attribute)
            .cloned()
            .ok_or_else(|| CopyError::AttributeMissing {
                table: table.to_string(),
                key: key.to_string(),
                attribute: attribute.to_string(),
            })
    }

    fn table_rows(&self, table: &str) -> GeneratedValue {
        let Some(cache) = self.tables.get(table) else {
            return GeneratedValue::List(Vec::new());
        };
        let rows = cache
            .rows
            .iter()
            .map(|row| {
                GeneratedValue::Dict(
                    cache
                        .columns
                        .iter()
                        .filter_map(|column| {
                            row.get(column)
                                .map(|value| (GeneratedValue::Text(column.clone()), value.clone()))
                        })
                        .collect(),
                )
            })
            .collect();
        GeneratedValue::List(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with_keys(count: i64) -> InMemoryForeignContext {
        let mut context = InMemoryForeignContext::new();
        context.register_table(
            "customers",
            &["id".to_string(), "tier".to_string()],
            &["id".to_string()],
        );
        for id in 1..=count {
            let key = GeneratedValue::Int(id);
            context.record_key("customers", "id", key.clone());
            let row = RowMap::from([
                ("id".to_string(), key.clone()),
                ("tier".to_string(), GeneratedValue::Int(id % 3 + 3)),
            ]);
            context.record_parent("customers", &key, &row);
            context.record_row("customers", row);
        }
        context
    }

    #[test]
    fn missing_targets_are_reported_by_kind() {
        let context = context_with_keys(0);
        let err = context
            .pick_fk(1, &ForeignKeyCall::uniform("vendors", "id"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "table vendors not found while looking for primary key"
        );
        let err = context
            .pick_fk(1, &ForeignKeyCall::uniform("customers", "email"))
            .unwrap_err();
        assert!(matches!(err, ForeignKeyError::ColumnNotFound { .. }));
        let err = context
            .pick_fk(1, &ForeignKeyCall::uniform("customers", "id"))
            .unwrap_err();
        assert_eq!(err.to_string(), "no keys in customers.id");
    }

    #[test]
    fn picks_repeat_for_the_same_row() {
        let context = context_with_keys(50);
        let call = ForeignKeyCall::uniform("customers", "id");
        for row_id in 1..20 {
            assert_eq!(
                context.pick_fk(row_id, &call).unwrap(),
                context.pick_fk(row_id, &call).unwrap()
            );
        }
    }

    #[test]
    fn parses_distribution_arguments() {
        let args = CallArgs::new(vec!["customers".into(), "id".into(), "zipf".into()])
            .with_keyword("param", GeneratedValue::Float(2.0));
        let call = ForeignKeyCall::from_args(&args).unwrap();
        assert_eq!(call.distribution, Distribution::Zipf { exponent: 2.0 });
        assert_eq!(call.seed_parts(3)[4], "2.0");

        let args = CallArgs::new(vec!["customers".into(), "id".into(), "weighted_parent".into()]);
        let err = ForeignKeyCall::from_args(&args).unwrap_err();
        assert_eq!(
            err,
            ExprError::ForeignKey(ForeignKeyError::MissingParameter {
                distribution: "weighted_parent".to_string(),
                parameter: "parent_attr and weights".to_string(),
            })
        );

        let args = CallArgs::new(vec!["customers".into(), "id".into(), "pareto".into()]);
        assert!(matches!(
            ForeignKeyCall::from_args(&args),
            Err(ExprError::ForeignKey(ForeignKeyError::UnknownDistribution(_)))
        ));
    }

    #[test]
    fn zero_weights_exclude_parents() {
        let context = context_with_keys(30);
        let args = CallArgs::new(vec!["customers".into(), "id".into(), "weighted_parent".into()])
            .with_keyword("parent_attr", "tier".into())
            .with_keyword(
                "weights",
                GeneratedValue::Dict(vec![
                    ("3".into(), GeneratedValue::Float(0.0)),
                    ("4".into(), GeneratedValue::Float(0.0)),
                ]),
            );
        let call = ForeignKeyCall::from_args(&args).unwrap();
        for row_id in 1..200 {
            let GeneratedValue::Int(id) = context.pick_fk(row_id, &call).unwrap() else {
                panic!("expected integer key");
            };
            assert_eq!(id % 3 + 3, 5);
        }
    }

    #[test]
    fn lookup_parent_distinguishes_missing_row_and_attribute() {
        let context = context_with_keys(3);
        assert_eq!(
            context
                .lookup_parent("customers", &GeneratedValue::Int(2), "tier")
                .unwrap(),
            GeneratedValue::Int(5)
        );
        assert!(matches!(
            context.lookup_parent("customers", &GeneratedValue::Int(9), "tier"),
            Err(CopyError::ParentRowMissing { .. })
        ));
        assert!(matches!(
            context.lookup_parent("customers", &GeneratedValue::Int(2), "email"),
            Err(CopyError::AttributeMissing { .. })
        ));
        assert!(matches!(
            context.lookup_parent("orders", &GeneratedValue::Int(2), "tier"),
            Err(CopyError::ParentTableMissing { .. })
        ));
    }

    #[test]
    fn table_rows_keep_column_order() {
        let context = context_with_keys(2);
        let GeneratedValue::List(rows) = context.table_rows("customers") else {
            panic!("expected list");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].to_string(), "{'id': 1, 'tier': 4}");
        assert_eq!(context.table_rows("missing"), GeneratedValue::List(Vec::new()));
    }
}
