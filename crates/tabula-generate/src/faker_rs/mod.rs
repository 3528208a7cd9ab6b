pub mod adapter;
pub mod dates;
pub mod locales;

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use rand::RngCore;

use crate::expr::ExprError;
use crate::functions::CallArgs;
use crate::value::{GeneratedValue, value_key};
use locales::LocaleKey;

/// Attempts `fake.unique` makes before giving up on a fresh value.
pub const UNIQUE_ATTEMPTS: usize = 1000;

/// Faker-style provider behind the `fake` expression namespace.
#[derive(Debug, Clone)]
pub struct FakeProvider {
    locale: LocaleKey,
    clock: NaiveDateTime,
    seen: HashMap<String, HashSet<String>>,
}

impl FakeProvider {
    pub fn new(locale: LocaleKey, clock: NaiveDateTime) -> Self {
        Self {
            locale,
            clock,
            seen: HashMap::new(),
        }
    }

    pub fn locale(&self) -> LocaleKey {
        self.locale
    }

    /// Instant that `today`, `now` and relative date bounds resolve against.
    pub fn clock(&self) -> NaiveDateTime {
        self.clock
    }

    pub fn call(
        &self,
        method: &str,
        args: &CallArgs,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, ExprError> {
        adapter::generate_value(method, self.locale, self.clock, args, rng).unwrap_or_else(|| {
            Err(ExprError::unknown_attribute(format!(
                "'Generator' object has no attribute '{method}'"
            )))
        })
    }

    /// Like [`FakeProvider::call`], redrawing until the value was not returned
    /// before by the same method and arguments during this run.
    pub fn call_unique(
        &mut self,
        method: &str,
        args: &CallArgs,
        rng: &mut dyn RngCore,
    ) -> Result<GeneratedValue, ExprError> {
        let key = unique_key(method, args);
        for _ in 0..UNIQUE_ATTEMPTS {
            let value = self.call(method, args, rng)?;
            if self.seen.entry(key.clone()).or_default().insert(value_key(&value)) {
                return Ok(value);
            }
        }
        Err(ExprError::runtime(format!(
            "Got duplicated values after {UNIQUE_ATTEMPTS} iterations of fake.unique.{method}()"
        )))
    }
}

fn unique_key(method: &str, args: &CallArgs) -> String {
    let mut key = method.to_string();
    for value in &args.positional {
        key.push('|');
        key.push_str(&value.repr());
    }
    let mut keywords: Vec<_> = args.keyword.iter().collect();
    keywords.sort_by(|left, right| left.0.cmp(&right.0));
    for (name, value) in keywords {
        key.push('|');
        key.push_str(name);
        key.push('=');
        key.push_str(&value.repr());
    }
    key
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::errors::EvalErrorKind;

    fn provider() -> FakeProvider {
        let clock = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        FakeProvider::new(LocaleKey::EnUs, clock)
    }

    #[test]
    fn unknown_methods_are_attribute_errors() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let err = provider()
            .call("definitely_not_a_faker", &CallArgs::default(), &mut rng)
            .unwrap_err();
        assert!(matches!(
            err,
            ExprError::Eval {
                kind: EvalErrorKind::UnknownAttribute,
                ..
            }
        ));
    }

    #[test]
    fn unique_values_do_not_repeat_until_exhausted() {
        let mut provider = provider();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let args = CallArgs::new(vec![GeneratedValue::Int(1), GeneratedValue::Int(5)]);
        let mut values = HashSet::new();
        for _ in 0..5 {
            let value = provider.call_unique("random_int", &args, &mut rng).unwrap();
            assert!(values.insert(value_key(&value)));
        }
        let err = provider.call_unique("random_int", &args, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            ExprError::Eval {
                kind: EvalErrorKind::Runtime,
                ..
            }
        ));
    }
}
