use std::mem::discriminant;

use super::SyntaxError;
use super::lexer::{Token, Tokenizer, unescape};
use crate::value::GeneratedValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(GeneratedValue),
    FString(Vec<FStringPart>),
    Name(String),
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Index {
        value: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        value: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    Conditional {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Comprehension {
        element: Box<Expr>,
        target: String,
        iter: Box<Expr>,
        condition: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(String),
    Field { expr: Expr, spec: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        target: String,
        value: Expr,
    },
    Return(Option<Expr>),
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
    Expr(Expr),
    Pass,
}

/// Recursive-descent parser over the tokens of one logical line.
#[derive(Debug)]
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, SyntaxError> {
        Ok(Self {
            tokens: Tokenizer::new(source).tokenize()?,
            position: 0,
        })
    }

    pub fn current(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn peek_next(&self) -> &Token {
        self.tokens.get(self.position + 1).unwrap_or(&Token::Eof)
    }

    pub fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.current() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, expected: Token) -> Result<(), SyntaxError> {
        if discriminant(self.current()) == discriminant(&expected) {
            self.advance();
            Ok(())
        } else {
            Err(SyntaxError::new(format!(
                "expected {:?}, found {:?}",
                expected,
                self.current()
            )))
        }
    }

    pub fn is_at_end(&self) -> bool {
        *self.current() == Token::Eof
    }

    pub fn expect_end(&self) -> Result<(), SyntaxError> {
        if self.is_at_end() {
            Ok(())
        } else {
            Err(SyntaxError::new(format!(
                "unexpected {:?} after expression",
                self.current()
            )))
        }
    }

    /// `name = expr`, `name += expr`, `return expr`, `pass` or a bare expression.
    pub fn parse_simple_statement(&mut self) -> Result<Stmt, SyntaxError> {
        match self.current().clone() {
            Token::Return => {
                self.advance();
                if self.is_at_end() {
                    Ok(Stmt::Return(None))
                } else {
                    Ok(Stmt::Return(Some(self.parse_expression()?)))
                }
            }
            Token::Pass => {
                self.advance();
                Ok(Stmt::Pass)
            }
            Token::Name(target) => {
                let augmented = match self.peek_next() {
                    Token::Assign => None,
                    Token::PlusAssign => Some(BinaryOp::Add),
                    Token::MinusAssign => Some(BinaryOp::Sub),
                    Token::StarAssign => Some(BinaryOp::Mul),
                    Token::SlashAssign => Some(BinaryOp::Div),
                    _ => return Ok(Stmt::Expr(self.parse_expression()?)),
                };
                self.advance();
                self.advance();
                let value = self.parse_expression()?;
                let value = match augmented {
                    None => value,
                    Some(op) => Expr::Binary {
                        op,
                        left: Box::new(Expr::Name(target.clone())),
                        right: Box::new(value),
                    },
                };
                Ok(Stmt::Assign { target, value })
            }
            _ => Ok(Stmt::Expr(self.parse_expression()?)),
        }
    }

    /// Conditional expression: `body if test else orelse`.
    pub fn parse_expression(&mut self) -> Result<Expr, SyntaxError> {
        let body = self.parse_or()?;
        if *self.current() == Token::If {
            self.advance();
            let test = self.parse_or()?;
            self.expect(Token::Else)?;
            let orelse = self.parse_expression()?;
            return Ok(Expr::Conditional {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn parse_or(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            expr = Expr::Or(Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_not()?;
        while self.eat(&Token::And) {
            let right = self.parse_not()?;
            expr = Expr::And(Box::new(expr), Box::new(right));
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat(&Token::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.parse_arith()?;
        let mut rest = Vec::new();

        loop {
            let op = match self.current() {
                Token::Equal => CompareOp::Eq,
                Token::NotEqual => CompareOp::NotEq,
                Token::Less => CompareOp::Lt,
                Token::LessEqual => CompareOp::LtE,
                Token::Greater => CompareOp::Gt,
                Token::GreaterEqual => CompareOp::GtE,
                Token::In => CompareOp::In,
                Token::Not if *self.peek_next() == Token::In => {
                    self.advance();
                    CompareOp::NotIn
                }
                Token::Is => {
                    if *self.peek_next() == Token::Not {
                        self.advance();
                        CompareOp::IsNot
                    } else {
                        CompareOp::Is
                    }
                }
                _ => break,
            };
            self.advance();
            rest.push((op, self.parse_arith()?));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn parse_arith(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_term()?;
        loop {
            let op = match self.current() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(expr),
            };
            self.advance();
            let right = self.parse_term()?;
            expr = binary(op, expr, right);
        }
    }

    fn parse_term(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_factor()?;
        loop {
            let op = match self.current() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::DoubleSlash => BinaryOp::FloorDiv,
                Token::Percent => BinaryOp::Mod,
                _ => return Ok(expr),
            };
            self.advance();
            let right = self.parse_factor()?;
            expr = binary(op, expr, right);
        }
    }

    fn parse_factor(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.current() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.parse_factor()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_power(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::DoubleStar) {
            let exponent = self.parse_factor()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.current() {
                Token::Dot => {
                    self.advance();
                    let Token::Name(attr) = self.advance() else {
                        return Err(SyntaxError::new("expected attribute name after '.'"));
                    };
                    expr = Expr::Attribute {
                        value: Box::new(expr),
                        attr,
                    };
                }
                Token::LeftParen => {
                    self.advance();
                    let (args, kwargs) = self.parse_call_args()?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                        kwargs,
                    };
                }
                Token::LeftBracket => {
                    self.advance();
                    expr = self.parse_subscript(expr)?;
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), SyntaxError> {
        let mut args = Vec::new();
        let mut kwargs = Vec::new();

        while *self.current() != Token::RightParen {
            if let Token::Name(name) = self.current().clone()
                && *self.peek_next() == Token::Assign
            {
                self.advance();
                self.advance();
                kwargs.push((name, self.parse_expression()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(SyntaxError::new(
                        "positional argument follows keyword argument",
                    ));
                }
                let arg = self.parse_expression()?;
                if *self.current() == Token::For {
                    args.push(self.parse_comprehension(arg)?);
                } else {
                    args.push(arg);
                }
            }

            if !self.eat(&Token::Comma) {
                break;
            }
        }

        self.expect(Token::RightParen)?;
        Ok((args, kwargs))
    }

    fn parse_subscript(&mut self, value: Expr) -> Result<Expr, SyntaxError> {
        let start = if *self.current() == Token::Colon {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };

        if self.eat(&Token::Colon) {
            let stop = if *self.current() == Token::RightBracket {
                None
            } else {
                Some(Box::new(self.parse_expression()?))
            };
            self.expect(Token::RightBracket)?;
            return Ok(Expr::Slice {
                value: Box::new(value),
                start,
                stop,
            });
        }

        self.expect(Token::RightBracket)?;
        let index = start.ok_or_else(|| SyntaxError::new("empty subscript"))?;
        Ok(Expr::Index {
            value: Box::new(value),
            index,
        })
    }

    fn parse_comprehension(&mut self, element: Expr) -> Result<Expr, SyntaxError> {
        self.expect(Token::For)?;
        let Token::Name(target) = self.advance() else {
            return Err(SyntaxError::new("expected loop variable after 'for'"));
        };
        self.expect(Token::In)?;
        let iter = self.parse_or()?;
        let condition = if self.eat(&Token::If) {
            Some(Box::new(self.parse_or()?))
        } else {
            None
        };
        Ok(Expr::Comprehension {
            element: Box::new(element),
            target,
            iter: Box::new(iter),
            condition,
        })
    }

    fn parse_atom(&mut self) -> Result<Expr, SyntaxError> {
        match self.advance() {
            Token::Int(value) => Ok(Expr::Literal(GeneratedValue::Int(value))),
            Token::Float(value) => Ok(Expr::Literal(GeneratedValue::Float(value))),
            Token::Str(mut value) => {
                while let Token::Str(next) = self.current().clone() {
                    value.push_str(&next);
                    self.advance();
                }
                Ok(Expr::Literal(GeneratedValue::Text(value)))
            }
            Token::FStr(raw) => Ok(Expr::FString(parse_fstring(&raw)?)),
            Token::True => Ok(Expr::Literal(GeneratedValue::Bool(true))),
            Token::False => Ok(Expr::Literal(GeneratedValue::Bool(false))),
            Token::None => Ok(Expr::Literal(GeneratedValue::Null)),
            Token::Name(name) => Ok(Expr::Name(name)),
            Token::LeftParen => {
                if self.eat(&Token::RightParen) {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.parse_expression()?;
                if *self.current() == Token::For {
                    let comprehension = self.parse_comprehension(first)?;
                    self.expect(Token::RightParen)?;
                    return Ok(comprehension);
                }
                if self.eat(&Token::RightParen) {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat(&Token::Comma) {
                    if *self.current() == Token::RightParen {
                        break;
                    }
                    items.push(self.parse_expression()?);
                }
                self.expect(Token::RightParen)?;
                Ok(Expr::List(items))
            }
            Token::LeftBracket => {
                if self.eat(&Token::RightBracket) {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.parse_expression()?;
                if *self.current() == Token::For {
                    let comprehension = self.parse_comprehension(first)?;
                    self.expect(Token::RightBracket)?;
                    return Ok(comprehension);
                }
                let mut items = vec![first];
                while self.eat(&Token::Comma) {
                    if *self.current() == Token::RightBracket {
                        break;
                    }
                    items.push(self.parse_expression()?);
                }
                self.expect(Token::RightBracket)?;
                Ok(Expr::List(items))
            }
            Token::LeftBrace => {
                let mut entries = Vec::new();
                while *self.current() != Token::RightBrace {
                    let key = self.parse_expression()?;
                    self.expect(Token::Colon)?;
                    let value = self.parse_expression()?;
                    entries.push((key, value));
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(Token::RightBrace)?;
                Ok(Expr::Dict(entries))
            }
            Token::Eof => Err(SyntaxError::new("unexpected end of expression")),
            other => Err(SyntaxError::new(format!("unexpected token {other:?}"))),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Parse a complete single expression.
pub fn parse_expression(source: &str) -> Result<Expr, SyntaxError> {
    let mut parser = Parser::new(source)?;
    let expr = parser.parse_expression()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Split an f-string body into literal text and `{expr[:spec]}` fields.
fn parse_fstring(raw: &str) -> Result<Vec<FStringPart>, SyntaxError> {
    let chars: Vec<char> = raw.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];
        match ch {
            '{' if chars.get(index + 1) == Some(&'{') => {
                literal.push('{');
                index += 2;
            }
            '}' if chars.get(index + 1) == Some(&'}') => {
                literal.push('}');
                index += 2;
            }
            '}' => return Err(SyntaxError::new("single '}' is not allowed in f-string")),
            '\\' => {
                if let Some(escaped) = chars.get(index + 1) {
                    literal.push_str(&unescape(*escaped));
                }
                index += 2;
            }
            '{' => {
                if !literal.is_empty() {
                    parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                }
                let (field, next) = read_field(&chars, index + 1)?;
                parts.push(field);
                index = next;
            }
            _ => {
                literal.push(ch);
                index += 1;
            }
        }
    }

    if !literal.is_empty() {
        parts.push(FStringPart::Literal(literal));
    }
    Ok(parts)
}

/// Read one replacement field starting after `{`; returns the index after `}`.
fn read_field(chars: &[char], start: usize) -> Result<(FStringPart, usize), SyntaxError> {
    let mut depth = 0_usize;
    let mut quote: Option<char> = None;
    let mut spec_start = None;
    let mut index = start;

    while index < chars.len() {
        let ch = chars[index];
        if let Some(open) = quote {
            if ch == open {
                quote = None;
            }
            index += 1;
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '}' if depth > 0 => depth -= 1,
            ':' if depth == 0 && spec_start.is_none() => spec_start = Some(index),
            '}' => {
                let expr_end = spec_start.unwrap_or(index);
                let source: String = chars[start..expr_end].iter().collect();
                let source = source.trim_end_matches("!s").trim_end_matches("!r");
                if source.trim().is_empty() {
                    return Err(SyntaxError::new("empty expression in f-string"));
                }
                let spec = spec_start.map(|at| chars[at + 1..index].iter().collect::<String>());
                let expr = parse_expression(source)?;
                return Ok((FStringPart::Field { expr, spec }, index + 1));
            }
            _ => {}
        }
        index += 1;
    }

    Err(SyntaxError::new("unterminated '{' in f-string"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_arithmetic_precedence() {
        let expr = parse_expression("1 + 2 * 3 ** 2").unwrap();
        let Expr::Binary { op, right, .. } = expr else {
            panic!("expected binary expression");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(
            *right,
            Expr::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn parses_keyword_arguments_and_chained_comparisons() {
        let expr = parse_expression(
            "foreign_key('customers', 'id', distribution='zipf', param=1.5)",
        )
        .unwrap();
        let Expr::Call { args, kwargs, .. } = expr else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert_eq!(kwargs[0].0, "distribution");
        assert_eq!(kwargs[1].0, "param");

        let expr = parse_expression("0 < x <= 10").unwrap();
        let Expr::Compare { rest, .. } = expr else {
            panic!("expected comparison");
        };
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn splits_fstring_fields_and_specs() {
        let parts = parse_fstring("ORD-{row_id:05d} {{x}} {d['k']}").unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], FStringPart::Literal("ORD-".to_string()));
        assert!(matches!(
            &parts[1],
            FStringPart::Field { spec: Some(spec), .. } if spec == "05d"
        ));
        assert_eq!(parts[2], FStringPart::Literal(" {x} ".to_string()));
    }

    #[test]
    fn rejects_trailing_tokens() {
        assert!(parse_expression("fake.name() fake.email()").is_err());
        assert!(parse_expression("(1 + 2").is_err());
    }
}
