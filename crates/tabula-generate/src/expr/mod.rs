//! Closed expression language for column `data` sources.
//!
//! A source is either a single expression or, when it contains `return `, a
//! statement body that runs as a zero-argument function named
//! `func_<table>_<column>`. Only the symbols injected through
//! [`eval::Environment`] are reachable.

pub mod builtins;
pub mod eval;
pub mod format;
pub mod lexer;
pub mod ops;
pub mod parser;

use std::collections::BTreeSet;

use thiserror::Error;

use crate::errors::{CopyError, EvalErrorKind, ForeignKeyError};
use crate::value::GeneratedValue;
use lexer::Token;
use parser::{Expr, FStringPart, Parser, Stmt};

pub use eval::Environment;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure raised while running a compiled program.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprError {
    Eval { kind: EvalErrorKind, message: String },
    ForeignKey(ForeignKeyError),
    Copy(CopyError),
}

impl ExprError {
    pub fn unknown_attribute(message: impl Into<String>) -> Self {
        Self::Eval {
            kind: EvalErrorKind::UnknownAttribute,
            message: message.into(),
        }
    }

    pub fn undefined_name(message: impl Into<String>) -> Self {
        Self::Eval {
            kind: EvalErrorKind::UndefinedName,
            message: message.into(),
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Eval {
            kind: EvalErrorKind::Runtime,
            message: message.into(),
        }
    }
}

impl From<ForeignKeyError> for ExprError {
    fn from(err: ForeignKeyError) -> Self {
        Self::ForeignKey(err)
    }
}

impl From<CopyError> for ExprError {
    fn from(err: CopyError) -> Self {
        Self::Copy(err)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgramBody {
    Expression(Expr),
    Function { name: String, body: Vec<Stmt> },
}

/// A compiled column source.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    source: String,
    body: ProgramBody,
}

impl Program {
    pub fn compile(source: &str, function_name: &str) -> Result<Self, SyntaxError> {
        let body = if source.contains("return ") {
            ProgramBody::Function {
                name: function_name.to_string(),
                body: parse_body(source)?,
            }
        } else {
            ProgramBody::Expression(parser::parse_expression(source.trim())?)
        };
        Ok(Self {
            source: source.to_string(),
            body,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn body(&self) -> &ProgramBody {
        &self.body
    }

    pub fn function_name(&self) -> Option<&str> {
        match &self.body {
            ProgramBody::Function { name, .. } => Some(name),
            ProgramBody::Expression(_) => None,
        }
    }

    pub fn evaluate(&self, env: &mut Environment<'_>) -> Result<GeneratedValue, ExprError> {
        eval::run(&self.body, env)
    }

    /// Names the program reads from its environment.
    ///
    /// Locals assigned in a statement body and comprehension variables are
    /// excluded; the foreign-key column named by `copy_from_fk` is included.
    pub fn identifiers(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        match &self.body {
            ProgramBody::Expression(expr) => collect_names(expr, &mut names),
            ProgramBody::Function { body, .. } => {
                let mut assigned = BTreeSet::new();
                for stmt in body {
                    collect_stmt_names(stmt, &mut names, &mut assigned);
                }
                for local in assigned {
                    names.remove(&local);
                }
            }
        }
        names
    }

    pub fn calls(&self, function: &str) -> bool {
        let mut found = false;
        self.visit(&mut |expr| {
            if let Expr::Call { func, .. } = expr
                && matches!(func.as_ref(), Expr::Name(name) if name == function)
            {
                found = true;
            }
        });
        found
    }

    /// `(table, column)` of the first `foreign_key` call with literal arguments.
    pub fn foreign_key_target(&self) -> Option<(String, String)> {
        let mut target = None;
        self.visit(&mut |expr| {
            if target.is_some() {
                return;
            }
            if let Expr::Call { func, args, .. } = expr
                && matches!(func.as_ref(), Expr::Name(name) if name == "foreign_key")
                && let [Expr::Literal(table), Expr::Literal(column), ..] = args.as_slice()
                && let (Some(table), Some(column)) = (table.as_str(), column.as_str())
            {
                target = Some((table.to_string(), column.to_string()));
            }
        });
        target
    }

    fn visit(&self, visitor: &mut dyn FnMut(&Expr)) {
        match &self.body {
            ProgramBody::Expression(expr) => walk_expr(expr, visitor),
            ProgramBody::Function { body, .. } => {
                for stmt in body {
                    walk_stmt(stmt, visitor);
                }
            }
        }
    }
}

fn collect_names(expr: &Expr, names: &mut BTreeSet<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Name(name) => {
            names.insert(name.clone());
        }
        Expr::FString(parts) => {
            for part in parts {
                if let FStringPart::Field { expr, .. } = part {
                    collect_names(expr, names);
                }
            }
        }
        Expr::Attribute { value, .. } => collect_names(value, names),
        Expr::Call { func, args, kwargs } => {
            match func.as_ref() {
                Expr::Name(function) => {
                    if function == "copy_from_fk"
                        && let Some(Expr::Literal(fk_column)) = args.first()
                        && let Some(fk_column) = fk_column.as_str()
                    {
                        names.insert(fk_column.to_string());
                    }
                }
                other => collect_names(other, names),
            }
            for arg in args {
                collect_names(arg, names);
            }
            for (_, value) in kwargs {
                collect_names(value, names);
            }
        }
        Expr::Index { value, index } => {
            collect_names(value, names);
            collect_names(index, names);
        }
        Expr::Slice { value, start, stop } => {
            collect_names(value, names);
            for bound in [start, stop].into_iter().flatten() {
                collect_names(bound, names);
            }
        }
        Expr::Unary { operand, .. } | Expr::Not(operand) => collect_names(operand, names),
        Expr::Binary { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
            collect_names(left, names);
            collect_names(right, names);
        }
        Expr::Compare { first, rest } => {
            collect_names(first, names);
            for (_, operand) in rest {
                collect_names(operand, names);
            }
        }
        Expr::Conditional { test, body, orelse } => {
            collect_names(test, names);
            collect_names(body, names);
            collect_names(orelse, names);
        }
        Expr::List(items) => {
            for item in items {
                collect_names(item, names);
            }
        }
        Expr::Dict(entries) => {
            for (key, value) in entries {
                collect_names(key, names);
                collect_names(value, names);
            }
        }
        Expr::Comprehension {
            element,
            target,
            iter,
            condition,
        } => {
            collect_names(iter, names);
            let mut inner = BTreeSet::new();
            collect_names(element, &mut inner);
            if let Some(condition) = condition {
                collect_names(condition, &mut inner);
            }
            inner.remove(target);
            names.extend(inner);
        }
    }
}

fn collect_stmt_names(stmt: &Stmt, names: &mut BTreeSet<String>, assigned: &mut BTreeSet<String>) {
    match stmt {
        Stmt::Assign { target, value } => {
            collect_names(value, names);
            assigned.insert(target.clone());
        }
        Stmt::Return(Some(expr)) | Stmt::Expr(expr) => collect_names(expr, names),
        Stmt::Return(None) | Stmt::Pass => {}
        Stmt::If { branches, orelse } => {
            for (test, body) in branches {
                collect_names(test, names);
                for stmt in body {
                    collect_stmt_names(stmt, names, assigned);
                }
            }
            for stmt in orelse {
                collect_stmt_names(stmt, names, assigned);
            }
        }
    }
}

fn walk_stmt(stmt: &Stmt, visitor: &mut dyn FnMut(&Expr)) {
    match stmt {
        Stmt::Assign { value, .. } => walk_expr(value, visitor),
        Stmt::Return(Some(expr)) | Stmt::Expr(expr) => walk_expr(expr, visitor),
        Stmt::Return(None) | Stmt::Pass => {}
        Stmt::If { branches, orelse } => {
            for (test, body) in branches {
                walk_expr(test, visitor);
                for stmt in body {
                    walk_stmt(stmt, visitor);
                }
            }
            for stmt in orelse {
                walk_stmt(stmt, visitor);
            }
        }
    }
}

fn walk_expr(expr: &Expr, visitor: &mut dyn FnMut(&Expr)) {
    visitor(expr);
    match expr {
        Expr::Literal(_) | Expr::Name(_) => {}
        Expr::FString(parts) => {
            for part in parts {
                if let FStringPart::Field { expr, .. } = part {
                    walk_expr(expr, visitor);
                }
            }
        }
        Expr::Attribute { value, .. } => walk_expr(value, visitor),
        Expr::Call { func, args, kwargs } => {
            walk_expr(func, visitor);
            for arg in args {
                walk_expr(arg, visitor);
            }
            for (_, value) in kwargs {
                walk_expr(value, visitor);
            }
        }
        Expr::Index { value, index } => {
            walk_expr(value, visitor);
            walk_expr(index, visitor);
        }
        Expr::Slice { value, start, stop } => {
            walk_expr(value, visitor);
            for bound in [start, stop].into_iter().flatten() {
                walk_expr(bound, visitor);
            }
        }
        Expr::Unary { operand, .. } | Expr::Not(operand) => walk_expr(operand, visitor),
        Expr::Binary { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
            walk_expr(left, visitor);
            walk_expr(right, visitor);
        }
        Expr::Compare { first, rest } => {
            walk_expr(first, visitor);
            for (_, operand) in rest {
                walk_expr(operand, visitor);
            }
        }
        Expr::Conditional { test, body, orelse } => {
            walk_expr(test, visitor);
            walk_expr(body, visitor);
            walk_expr(orelse, visitor);
        }
        Expr::List(items) => {
            for item in items {
                walk_expr(item, visitor);
            }
        }
        Expr::Dict(entries) => {
            for (key, value) in entries {
                walk_expr(key, visitor);
                walk_expr(value, visitor);
            }
        }
        Expr::Comprehension {
            element,
            iter,
            condition,
            ..
        } => {
            walk_expr(iter, visitor);
            walk_expr(element, visitor);
            if let Some(condition) = condition {
                walk_expr(condition, visitor);
            }
        }
    }
}

struct Line {
    indent: usize,
    text: String,
}

/// Join physical lines into logical ones (open brackets and trailing `\`
/// continue a line) and drop blanks and comment-only lines.
fn logical_lines(source: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut pending: Option<Line> = None;
    let mut depth = 0_i32;

    for raw in source.lines() {
        match pending.as_mut() {
            Some(line) => {
                line.text.push('\n');
                line.text.push_str(raw.trim());
            }
            None => {
                let trimmed = raw.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    continue;
                }
                let indent = raw
                    .chars()
                    .take_while(|ch| ch.is_whitespace())
                    .map(|ch| if ch == '\t' { 4 } else { 1 })
                    .sum();
                pending = Some(Line {
                    indent,
                    text: trimmed.to_string(),
                });
            }
        }

        depth = (depth + bracket_delta(raw)).max(0);
        if depth == 0 && !raw.trim_end().ends_with('\\') {
            lines.extend(pending.take());
        }
    }

    lines.extend(pending);
    lines
}

fn bracket_delta(line: &str) -> i32 {
    let mut delta = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for ch in line.chars() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == open {
                quote = None;
            }
            continue;
        }
        match ch {
            '#' => break,
            '\'' | '"' => quote = Some(ch),
            '(' | '[' | '{' => delta += 1,
            ')' | ']' | '}' => delta -= 1,
            _ => {}
        }
    }
    delta
}

fn parse_body(source: &str) -> Result<Vec<Stmt>, SyntaxError> {
    let lines = logical_lines(source);
    let Some(base) = lines.iter().map(|line| line.indent).min() else {
        return Err(SyntaxError::new("empty function body"));
    };
    let mut position = 0;
    let body = parse_block(&lines, &mut position, base)?;
    if position < lines.len() {
        return Err(SyntaxError::new(format!(
            "unexpected indentation at '{}'",
            lines[position].text
        )));
    }
    Ok(body)
}

fn parse_block(lines: &[Line], position: &mut usize, indent: usize) -> Result<Vec<Stmt>, SyntaxError> {
    let mut body = Vec::new();
    while let Some(line) = lines.get(*position) {
        if line.indent < indent {
            break;
        }
        if line.indent > indent {
            return Err(SyntaxError::new(format!("unexpected indent at '{}'", line.text)));
        }
        body.push(parse_statement(lines, position, indent)?);
    }
    Ok(body)
}

fn parse_statement(
    lines: &[Line],
    position: &mut usize,
    indent: usize,
) -> Result<Stmt, SyntaxError> {
    let line = &lines[*position];
    let mut parser = Parser::new(&line.text)?;

    match parser.current() {
        Token::If => {
            parser.advance();
            let mut branches = vec![parse_clause(parser, lines, position, indent)?];
            let mut orelse = Vec::new();

            while let Some(next) = lines.get(*position) {
                if next.indent != indent {
                    break;
                }
                let mut parser = Parser::new(&next.text)?;
                match parser.current() {
                    Token::Elif => {
                        parser.advance();
                        branches.push(parse_clause(parser, lines, position, indent)?);
                    }
                    Token::Else => {
                        parser.advance();
                        parser.expect(Token::Colon)?;
                        orelse = parse_suite(parser, lines, position, indent)?;
                        break;
                    }
                    _ => break,
                }
            }

            Ok(Stmt::If { branches, orelse })
        }
        Token::Elif | Token::Else => Err(SyntaxError::new(format!(
            "'{}' without a matching 'if'",
            line.text
        ))),
        _ => {
            let stmt = parser.parse_simple_statement()?;
            parser.expect_end()?;
            *position += 1;
            Ok(stmt)
        }
    }
}

fn parse_clause(
    mut parser: Parser,
    lines: &[Line],
    position: &mut usize,
    indent: usize,
) -> Result<(Expr, Vec<Stmt>), SyntaxError> {
    let test = parser.parse_expression()?;
    parser.expect(Token::Colon)?;
    let body = parse_suite(parser, lines, position, indent)?;
    Ok((test, body))
}

/// Body after a `:`: the rest of the line, or the indented block below it.
fn parse_suite(
    mut parser: Parser,
    lines: &[Line],
    position: &mut usize,
    indent: usize,
) -> Result<Vec<Stmt>, SyntaxError> {
    *position += 1;
    if !parser.is_at_end() {
        let stmt = parser.parse_simple_statement()?;
        parser.expect_end()?;
        return Ok(vec![stmt]);
    }

    match lines.get(*position) {
        Some(next) if next.indent > indent => parse_block(lines, position, next.indent),
        _ => Err(SyntaxError::new("expected an indented block")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_bodies_become_functions() {
        let source = "if row_id % 2 == 0:\n    label = 'even'\nelse:\n    label = 'odd'\nreturn f'{label}-{status}'";
        let program = Program::compile(source, "func_orders_label").unwrap();
        assert_eq!(program.function_name(), Some("func_orders_label"));
        let ProgramBody::Function { body, .. } = program.body() else {
            panic!("expected function body");
        };
        assert_eq!(body.len(), 2);

        let names = program.identifiers();
        assert!(names.contains("row_id"));
        assert!(names.contains("status"));
        assert!(!names.contains("label"));
    }

    #[test]
    fn identifiers_ignore_attribute_names() {
        let program = Program::compile("fake.email()", "f").unwrap();
        let names = program.identifiers();
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["fake".to_string()]);
    }

    #[test]
    fn copy_from_fk_reads_its_key_column() {
        let program =
            Program::compile("copy_from_fk('customer_id', 'customers', 'email')", "f").unwrap();
        assert!(program.identifiers().contains("customer_id"));
        assert!(program.calls("copy_from_fk"));
        assert!(!program.calls("foreign_key"));
    }

    #[test]
    fn finds_foreign_key_targets() {
        let program =
            Program::compile("foreign_key(\"customers\", \"id\", distribution=\"zipf\")", "f")
                .unwrap();
        assert_eq!(
            program.foreign_key_target(),
            Some(("customers".to_string(), "id".to_string()))
        );
    }

    #[test]
    fn multi_line_calls_and_inline_suites_parse() {
        let source = "total = (price *\n         quantity)\nif total > 100: return 'big'\nreturn 'small'";
        let program = Program::compile(source, "f").unwrap();
        let ProgramBody::Function { body, .. } = program.body() else {
            panic!("expected function body");
        };
        assert_eq!(body.len(), 3);
    }

    #[test]
    fn bad_indentation_is_a_syntax_error() {
        let source = "x = 1\n    return x";
        assert!(Program::compile(source, "f").is_err());
    }
}
