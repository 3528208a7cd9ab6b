//! Tree-walking evaluation of compiled programs against one row.

use std::collections::{HashMap, HashSet};

use rand::RngCore;

use super::builtins::{self, Namespace};
use super::format::format_value;
use super::parser::{Expr, FStringPart, Stmt};
use super::{ExprError, Program, ProgramBody, ops};
use crate::errors::CopyError;
use crate::faker_rs::FakeProvider;
use crate::foreign::{ForeignContext, ForeignKeyCall};
use crate::functions::{CallArgs, FunctionRegistry};
use crate::value::{GeneratedValue, RowMap};

/// Nesting limit for user functions calling each other.
const MAX_CALL_DEPTH: usize = 64;

/// Names that are fixed for every row of one table.
#[derive(Debug, Clone, Copy)]
pub struct TableSymbols<'a> {
    pub table: &'a str,
    /// Declared column names; reading one that is not materialized yet fails.
    pub columns: &'a HashSet<String>,
    pub functions: &'a FunctionRegistry,
    /// Host namespaces made visible by configuration.
    pub imports: &'a [String],
    /// Statement-body programs of the whole schema, by function name.
    pub programs: &'a HashMap<String, Program>,
}

/// Everything an expression can reach while one row is evaluated.
pub struct Environment<'a> {
    pub symbols: TableSymbols<'a>,
    pub row_id: i64,
    pub row: &'a RowMap,
    pub rng: &'a mut dyn RngCore,
    pub faker: &'a mut FakeProvider,
    pub foreign: &'a dyn ForeignContext,
    depth: usize,
}

impl<'a> Environment<'a> {
    pub fn new(
        symbols: TableSymbols<'a>,
        row_id: i64,
        row: &'a RowMap,
        rng: &'a mut dyn RngCore,
        faker: &'a mut FakeProvider,
        foreign: &'a dyn ForeignContext,
    ) -> Self {
        Self {
            symbols,
            row_id,
            row,
            rng,
            faker,
            foreign,
            depth: 0,
        }
    }
}

type Locals = HashMap<String, GeneratedValue>;

/// Namespace an attribute or call resolves against instead of a value.
#[derive(Debug, Clone, Copy)]
enum Target<'n> {
    Fake,
    FakeUnique,
    Builtin(Namespace),
    Imported(&'n str),
}

pub(crate) fn run(body: &ProgramBody, env: &mut Environment<'_>) -> Result<GeneratedValue, ExprError> {
    let mut locals = Locals::new();
    match body {
        ProgramBody::Expression(expr) => eval(expr, env, &mut locals),
        ProgramBody::Function { body, .. } => {
            Ok(exec_block(body, env, &mut locals)?.unwrap_or(GeneratedValue::Null))
        }
    }
}

/// `Some` once a `return` ran.
fn exec_block(
    body: &[Stmt],
    env: &mut Environment<'_>,
    locals: &mut Locals,
) -> Result<Option<GeneratedValue>, ExprError> {
    for stmt in body {
        match stmt {
            Stmt::Assign { target, value } => {
                let value = eval(value, env, locals)?;
                locals.insert(target.clone(), value);
            }
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => eval(expr, env, locals)?,
                    None => GeneratedValue::Null,
                };
                return Ok(Some(value));
            }
            Stmt::If { branches, orelse } => {
                let mut taken = None;
                for (test, body) in branches {
                    if eval(test, env, locals)?.truthy() {
                        taken = Some(body);
                        break;
                    }
                }
                if let Some(returned) = exec_block(taken.unwrap_or(orelse), env, locals)? {
                    return Ok(Some(returned));
                }
            }
            Stmt::Expr(expr) => {
                eval(expr, env, locals)?;
            }
            Stmt::Pass => {}
        }
    }
    Ok(None)
}

fn shadowed(name: &str, env: &Environment<'_>, locals: &Locals) -> bool {
    locals.contains_key(name) || env.row.contains_key(name)
}

fn target<'e>(expr: &'e Expr, env: &Environment<'_>, locals: &Locals) -> Option<Target<'e>> {
    match expr {
        Expr::Name(name) if !shadowed(name, env, locals) => {
            if name == "fake" {
                Some(Target::Fake)
            } else if let Some(namespace) = Namespace::from_name(name) {
                Some(Target::Builtin(namespace))
            } else if env.symbols.imports.iter().any(|import| import == name)
                && env.symbols.functions.has_namespace(name)
            {
                Some(Target::Imported(name))
            } else {
                None
            }
        }
        Expr::Attribute { value, attr } if attr == "unique" => {
            match target(value, env, locals) {
                Some(Target::Fake) => Some(Target::FakeUnique),
                _ => None,
            }
        }
        _ => None,
    }
}

fn lookup(name: &str, env: &Environment<'_>, locals: &Locals) -> Result<GeneratedValue, ExprError> {
    if let Some(value) = locals.get(name).or_else(|| env.row.get(name)) {
        return Ok(value.clone());
    }
    if env.symbols.columns.contains(name) {
        return Err(ExprError::undefined_name(format!(
            "name '{name}' is not defined (column '{name}' of '{}' has no value yet in this row)",
            env.symbols.table
        )));
    }
    match name {
        "row_id" => Ok(GeneratedValue::Int(env.row_id)),
        "MINYEAR" => Ok(GeneratedValue::Int(1)),
        "MAXYEAR" => Ok(GeneratedValue::Int(9999)),
        _ => Err(ExprError::undefined_name(format!("name '{name}' is not defined"))),
    }
}

fn eval(expr: &Expr, env: &mut Environment<'_>, locals: &mut Locals) -> Result<GeneratedValue, ExprError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::FString(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    FStringPart::Literal(text) => out.push_str(text),
                    FStringPart::Field { expr, spec } => {
                        let value = eval(expr, env, locals)?;
                        out.push_str(&format_value(&value, spec.as_deref().unwrap_or(""))?);
                    }
                }
            }
            Ok(GeneratedValue::Text(out))
        }
        Expr::Name(name) => lookup(name, env, locals),
        Expr::Attribute { value, attr } => match target(value, env, locals) {
            Some(Target::Builtin(namespace)) => namespace.constant(attr),
            Some(Target::Fake | Target::FakeUnique) => Err(ExprError::runtime(format!(
                "fake.{attr} must be called"
            ))),
            Some(Target::Imported(namespace)) => Err(ExprError::runtime(format!(
                "{namespace}.{attr} must be called"
            ))),
            None => {
                let receiver = eval(value, env, locals)?;
                builtins::value_attribute(&receiver, attr)
            }
        },
        Expr::Call { func, args, kwargs } => {
            let mut call_args = CallArgs::new(Vec::with_capacity(args.len()));
            for arg in args {
                call_args.positional.push(eval(arg, env, locals)?);
            }
            for (name, value) in kwargs {
                let value = eval(value, env, locals)?;
                call_args.keyword.push((name.clone(), value));
            }
            call(func, &call_args, env, locals)
        }
        Expr::Index { value, index } => {
            let container = eval(value, env, locals)?;
            let key = eval(index, env, locals)?;
            ops::index(&container, &key)
        }
        Expr::Slice { value, start, stop } => {
            let container = eval(value, env, locals)?;
            let start = start.as_deref().map(|expr| eval(expr, env, locals)).transpose()?;
            let stop = stop.as_deref().map(|expr| eval(expr, env, locals)).transpose()?;
            ops::slice(&container, start.as_ref(), stop.as_ref())
        }
        Expr::Unary { op, operand } => {
            let operand = eval(operand, env, locals)?;
            ops::unary(*op, &operand)
        }
        Expr::Binary { op, left, right } => {
            let left = eval(left, env, locals)?;
            let right = eval(right, env, locals)?;
            ops::binary(*op, &left, &right)
        }
        Expr::And(left, right) => {
            let left = eval(left, env, locals)?;
            if left.truthy() { eval(right, env, locals) } else { Ok(left) }
        }
        Expr::Or(left, right) => {
            let left = eval(left, env, locals)?;
            if left.truthy() { Ok(left) } else { eval(right, env, locals) }
        }
        Expr::Not(operand) => Ok(GeneratedValue::Bool(!eval(operand, env, locals)?.truthy())),
        Expr::Compare { first, rest } => {
            let mut left = eval(first, env, locals)?;
            for (op, operand) in rest {
                let right = eval(operand, env, locals)?;
                if !ops::compare(*op, &left, &right)? {
                    return Ok(GeneratedValue::Bool(false));
                }
                left = right;
            }
            Ok(GeneratedValue::Bool(true))
        }
        Expr::Conditional { test, body, orelse } => {
            if eval(test, env, locals)?.truthy() {
                eval(body, env, locals)
            } else {
                eval(orelse, env, locals)
            }
        }
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, env, locals))
            .collect::<Result<Vec<_>, _>>()
            .map(GeneratedValue::List),
        Expr::Dict(entries) => {
            let mut pairs: Vec<(GeneratedValue, GeneratedValue)> = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let key = eval(key, env, locals)?;
                let value = eval(value, env, locals)?;
                match pairs.iter_mut().find(|(existing, _)| ops::equals(existing, &key)) {
                    Some(slot) => slot.1 = value,
                    None => pairs.push((key, value)),
                }
            }
            Ok(GeneratedValue::Dict(pairs))
        }
        Expr::Comprehension {
            element,
            target,
            iter,
            condition,
        } => {
            let items = ops::iterate(&eval(iter, env, locals)?)?;
            let saved = locals.remove(target);
            let result = comprehend(element, target, items, condition.as_deref(), env, locals);
            locals.remove(target);
            if let Some(saved) = saved {
                locals.insert(target.clone(), saved);
            }
            result.map(GeneratedValue::List)
        }
    }
}

fn comprehend(
    element: &Expr,
    target: &str,
    items: Vec<GeneratedValue>,
    condition: Option<&Expr>,
    env: &mut Environment<'_>,
    locals: &mut Locals,
) -> Result<Vec<GeneratedValue>, ExprError> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        locals.insert(target.to_string(), item);
        if let Some(condition) = condition
            && !eval(condition, env, locals)?.truthy()
        {
            continue;
        }
        out.push(eval(element, env, locals)?);
    }
    Ok(out)
}

fn call(
    func: &Expr,
    args: &CallArgs,
    env: &mut Environment<'_>,
    locals: &mut Locals,
) -> Result<GeneratedValue, ExprError> {
    if let Expr::Name(name) = func
        && !shadowed(name, env, locals)
    {
        return call_named(name, args, env);
    }
    if let Expr::Attribute { value, attr } = func {
        return match target(value, env, locals) {
            Some(Target::Fake) => env.faker.call(attr, args, &mut *env.rng),
            Some(Target::FakeUnique) => env.faker.call_unique(attr, args, &mut *env.rng),
            Some(Target::Builtin(namespace)) => {
                namespace.call(attr, args, env.faker.clock(), &mut *env.rng)
            }
            Some(Target::Imported(namespace)) => {
                let function = env
                    .symbols
                    .functions
                    .namespace_function(namespace, attr)
                    .ok_or_else(|| {
                        ExprError::unknown_attribute(format!(
                            "module '{namespace}' has no attribute '{attr}'"
                        ))
                    })?;
                function.call(args, &mut *env.rng).map_err(ExprError::runtime)
            }
            None => {
                let receiver = eval(value, env, locals)?;
                builtins::call_method(&receiver, attr, args)
            }
        };
    }
    let callee = eval(func, env, locals)?;
    Err(ExprError::runtime(format!(
        "'{}' object is not callable",
        callee.type_name()
    )))
}

fn call_named(name: &str, args: &CallArgs, env: &mut Environment<'_>) -> Result<GeneratedValue, ExprError> {
    match name {
        "foreign_key" => {
            let request = ForeignKeyCall::from_args(args)?;
            return Ok(env.foreign.pick_fk(env.row_id, &request)?);
        }
        "copy_from_fk" => return copy_from_fk(args, env),
        "get_table" => {
            let table = args.text(0, "table_name")?.ok_or_else(|| {
                ExprError::runtime("get_table() missing required argument: 'table_name'")
            })?;
            return Ok(env.foreign.table_rows(&table));
        }
        _ => {}
    }

    if let Some(program) = env.symbols.programs.get(name) {
        if !args.is_empty() {
            return Err(ExprError::runtime(format!(
                "{name}() takes 0 positional arguments but {} were given",
                args.len()
            )));
        }
        if env.depth >= MAX_CALL_DEPTH {
            return Err(ExprError::runtime("maximum recursion depth exceeded"));
        }
        env.depth += 1;
        let result = run(program.body(), env);
        env.depth -= 1;
        return result;
    }

    if let Some(function) = env.symbols.functions.function(name) {
        return function.call(args, &mut *env.rng).map_err(ExprError::runtime);
    }

    builtins::call_builtin(name, args)
        .unwrap_or_else(|| Err(ExprError::undefined_name(format!("name '{name}' is not defined"))))
}

fn copy_from_fk(args: &CallArgs, env: &Environment<'_>) -> Result<GeneratedValue, ExprError> {
    args.check_keywords("copy_from_fk", &["fk_col", "parent_table", "parent_attr"])?;
    let required = |index: usize, name: &str| {
        args.text(index, name)?.ok_or_else(|| {
            ExprError::runtime(format!("copy_from_fk() missing required argument: '{name}'"))
        })
    };
    let fk_column = required(0, "fk_col")?;
    let parent_table = required(1, "parent_table")?;
    let parent_attr = required(2, "parent_attr")?;

    let key = env
        .row
        .get(&fk_column)
        .ok_or(CopyError::KeyNotMaterialized { column: fk_column })?;
    Ok(env.foreign.lookup_parent(&parent_table, key, &parent_attr)?)
}
