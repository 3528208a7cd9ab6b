//! Host-provided functions and namespaces callable from column expressions.
//!
//! `config.imports` only makes a namespace visible; the namespace itself has
//! to be registered here before the run starts.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use rand::RngCore;

use crate::expr::ExprError;
use crate::value::GeneratedValue;

/// Evaluated call arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<GeneratedValue>,
    pub keyword: Vec<(String, GeneratedValue)>,
}

impl CallArgs {
    pub fn new(positional: Vec<GeneratedValue>) -> Self {
        Self {
            positional,
            keyword: Vec::new(),
        }
    }

    pub fn with_keyword(mut self, name: &str, value: GeneratedValue) -> Self {
        self.keyword.push((name.to_string(), value));
        self
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Argument by keyword, falling back to its position.
    pub fn get(&self, index: usize, name: &str) -> Option<&GeneratedValue> {
        self.keyword
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
            .or_else(|| self.positional.get(index))
    }

    /// Like [`CallArgs::get`], treating an explicit `None` as absent.
    pub fn present(&self, index: usize, name: &str) -> Option<&GeneratedValue> {
        self.get(index, name).filter(|value| !value.is_null())
    }

    pub fn required(&self, index: usize, name: &str, function: &str) -> Result<&GeneratedValue, ExprError> {
        self.get(index, name).ok_or_else(|| {
            ExprError::runtime(format!(
                "{function}() missing required argument: '{name}'"
            ))
        })
    }

    pub fn int(&self, index: usize, name: &str, default: i64) -> Result<i64, ExprError> {
        match self.present(index, name) {
            Some(value) => expect_int(value, name),
            None => Ok(default),
        }
    }

    pub fn float(&self, index: usize, name: &str, default: f64) -> Result<f64, ExprError> {
        match self.present(index, name) {
            Some(value) => expect_float(value, name),
            None => Ok(default),
        }
    }

    pub fn flag(&self, index: usize, name: &str, default: bool) -> bool {
        self.present(index, name)
            .map(GeneratedValue::truthy)
            .unwrap_or(default)
    }

    pub fn text(&self, index: usize, name: &str) -> Result<Option<String>, ExprError> {
        match self.present(index, name) {
            Some(GeneratedValue::Text(value)) => Ok(Some(value.clone())),
            Some(other) => Err(ExprError::runtime(format!(
                "argument '{name}' must be str, not {}",
                other.type_name()
            ))),
            None => Ok(None),
        }
    }

    /// Reject keywords the callee does not accept.
    pub fn check_keywords(&self, function: &str, accepted: &[&str]) -> Result<(), ExprError> {
        match self
            .keyword
            .iter()
            .find(|(key, _)| !accepted.contains(&key.as_str()))
        {
            Some((key, _)) => Err(ExprError::runtime(format!(
                "{function}() got an unexpected keyword argument '{key}'"
            ))),
            None => Ok(()),
        }
    }
}

pub fn expect_int(value: &GeneratedValue, name: &str) -> Result<i64, ExprError> {
    match value {
        GeneratedValue::Int(value) => Ok(*value),
        GeneratedValue::Bool(value) => Ok(i64::from(*value)),
        GeneratedValue::Float(value) if value.fract() == 0.0 && value.is_finite() => {
            Ok(*value as i64)
        }
        other => Err(ExprError::runtime(format!(
            "argument '{name}' must be int, not {}",
            other.type_name()
        ))),
    }
}

pub fn expect_float(value: &GeneratedValue, name: &str) -> Result<f64, ExprError> {
    value.as_f64().ok_or_else(|| {
        ExprError::runtime(format!(
            "argument '{name}' must be a number, not {}",
            value.type_name()
        ))
    })
}

/// A function the host exposes to expressions.
pub trait CustomFunction: Send + Sync {
    fn call(&self, args: &CallArgs, rng: &mut dyn RngCore) -> Result<GeneratedValue, String>;
}

impl<F> CustomFunction for F
where
    F: Fn(&CallArgs, &mut dyn RngCore) -> Result<GeneratedValue, String> + Send + Sync,
{
    fn call(&self, args: &CallArgs, rng: &mut dyn RngCore) -> Result<GeneratedValue, String> {
        self(args, rng)
    }
}

type FunctionMap = BTreeMap<String, Arc<dyn CustomFunction>>;

/// Registry of custom top-level functions and importable namespaces.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: FunctionMap,
    namespaces: BTreeMap<String, FunctionMap>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("namespaces", &self.namespaces.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the namespaces shipped with the generator.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_namespace_function("calendar", "isleap", |args: &CallArgs, _rng: &mut dyn RngCore| {
            let year = calendar_year(args.int(0, "year", 0).map_err(|err| describe(&err))?)?;
            Ok(GeneratedValue::Bool(NaiveDate::from_ymd_opt(year, 2, 29).is_some()))
        });
        registry.register_namespace_function(
            "calendar",
            "monthrange",
            |args: &CallArgs, _rng: &mut dyn RngCore| {
                let year = calendar_year(args.int(0, "year", 0).map_err(|err| describe(&err))?)?;
                let month = args.int(1, "month", 0).map_err(|err| describe(&err))?;
                let month = u32::try_from(month).map_err(|_| format!("bad month number {month}; must be 1-12"))?;
                let first = NaiveDate::from_ymd_opt(year, month, 1)
                    .ok_or_else(|| format!("bad month number {month}; must be 1-12"))?;
                let next = if month == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(year, month + 1, 1)
                }
                .ok_or_else(|| format!("year {year} is out of range"))?;
                let days = next.signed_duration_since(first).num_days();
                Ok(GeneratedValue::List(vec![
                    GeneratedValue::Int(i64::from(first.weekday().num_days_from_monday())),
                    GeneratedValue::Int(days),
                ]))
            },
        );
        registry
    }

    pub fn register_function<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&CallArgs, &mut dyn RngCore) -> Result<GeneratedValue, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(function));
    }

    pub fn register_namespace_function<F>(&mut self, namespace: &str, name: &str, function: F)
    where
        F: Fn(&CallArgs, &mut dyn RngCore) -> Result<GeneratedValue, String> + Send + Sync + 'static,
    {
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(name.to_string(), Arc::new(function));
    }

    pub fn function(&self, name: &str) -> Option<&Arc<dyn CustomFunction>> {
        self.functions.get(name)
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains_key(namespace)
    }

    pub fn namespace_function(&self, namespace: &str, name: &str) -> Option<&Arc<dyn CustomFunction>> {
        self.namespaces.get(namespace).and_then(|members| members.get(name))
    }
}

fn calendar_year(year: i64) -> Result<i32, String> {
    i32::try_from(year).map_err(|_| format!("year {year} is out of range"))
}

fn describe(err: &ExprError) -> String {
    match err {
        ExprError::Eval { message, .. } => message.clone(),
        ExprError::ForeignKey(err) => err.to_string(),
        ExprError::Copy(err) => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn keyword_arguments_win_over_positions() {
        let args = CallArgs::new(vec![GeneratedValue::Int(1), GeneratedValue::Int(2)])
            .with_keyword("max", GeneratedValue::Int(9));
        assert_eq!(args.int(1, "max", 0).unwrap(), 9);
        assert_eq!(args.int(0, "min", 0).unwrap(), 1);
        assert_eq!(args.int(5, "step", 1).unwrap(), 1);
        assert!(args.check_keywords("random_int", &["min"]).is_err());
    }

    #[test]
    fn default_calendar_namespace_is_registered() {
        let registry = FunctionRegistry::with_defaults();
        let monthrange = registry.namespace_function("calendar", "monthrange").unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let result = monthrange
            .call(
                &CallArgs::new(vec![GeneratedValue::Int(2024), GeneratedValue::Int(2)]),
                &mut rng,
            )
            .unwrap();
        assert_eq!(
            result,
            GeneratedValue::List(vec![GeneratedValue::Int(3), GeneratedValue::Int(29)])
        );
    }

    #[test]
    fn calendar_rejects_out_of_range_arguments() {
        let registry = FunctionRegistry::with_defaults();
        let monthrange = registry.namespace_function("calendar", "monthrange").unwrap();
        let isleap = registry.namespace_function("calendar", "isleap").unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let wrapped_february = (1_i64 << 32) + 2;
        let err = monthrange
            .call(
                &CallArgs::new(vec![GeneratedValue::Int(2024), GeneratedValue::Int(wrapped_february)]),
                &mut rng,
            )
            .unwrap_err();
        assert!(err.contains("bad month number"), "{err}");

        let err = isleap
            .call(&CallArgs::new(vec![GeneratedValue::Int(i64::MAX)]), &mut rng)
            .unwrap_err();
        assert!(err.contains("out of range"), "{err}");
    }
}
