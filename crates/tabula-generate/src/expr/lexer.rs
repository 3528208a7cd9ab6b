use super::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    /// Raw body of an f-string; split into parts by the parser.
    FStr(String),
    Name(String),

    And,
    Or,
    Not,
    In,
    Is,
    If,
    Elif,
    Else,
    For,
    Return,
    Pass,
    True,
    False,
    None,

    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Colon,
    Dot,

    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,

    Eof,
}

/// Tokenizer for one logical line of expression source.
#[derive(Debug)]
pub struct Tokenizer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl Tokenizer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self {
            input: chars,
            position: 0,
            current_char,
        }
    }

    /// Tokenize the whole input, ending with `Token::Eof`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() || ch == '\\' && matches!(self.peek(), Some('\n')) {
                self.advance();
            } else if ch == '#' {
                while let Some(ch) = self.current_char {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn read_string(&mut self, quote_char: char) -> Result<String, SyntaxError> {
        let mut value = String::new();
        self.advance();

        while let Some(ch) = self.current_char {
            if ch == quote_char {
                self.advance();
                return Ok(value);
            } else if ch == '\\' {
                self.advance();
                if let Some(escaped) = self.current_char {
                    value.push_str(&unescape(escaped));
                    self.advance();
                }
            } else {
                value.push(ch);
                self.advance();
            }
        }

        Err(SyntaxError::new("unterminated string literal"))
    }

    /// Reads an f-string body verbatim; escapes are resolved per literal part.
    fn read_raw_string(&mut self, quote_char: char) -> Result<String, SyntaxError> {
        let mut value = String::new();
        self.advance();

        while let Some(ch) = self.current_char {
            if ch == quote_char {
                self.advance();
                return Ok(value);
            }
            if ch == '\\' {
                value.push(ch);
                self.advance();
                if let Some(escaped) = self.current_char {
                    value.push(escaped);
                    self.advance();
                }
                continue;
            }
            value.push(ch);
            self.advance();
        }

        Err(SyntaxError::new("unterminated f-string literal"))
    }

    fn read_number(&mut self) -> Result<Token, SyntaxError> {
        let mut value = String::new();
        let mut is_float = false;

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                value.push(ch);
                self.advance();
            } else if ch == '_' {
                self.advance();
            } else if ch == '.' && !is_float && self.peek().is_none_or(|next| next != '.') {
                is_float = true;
                value.push(ch);
                self.advance();
            } else if (ch == 'e' || ch == 'E')
                && self
                    .peek()
                    .is_some_and(|next| next.is_ascii_digit() || next == '-' || next == '+')
            {
                is_float = true;
                value.push(ch);
                self.advance();
                if let Some(sign) = self.current_char
                    && (sign == '-' || sign == '+')
                {
                    value.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }

        if is_float {
            let float_val = value
                .parse::<f64>()
                .map_err(|_| SyntaxError::new(format!("invalid float: {value}")))?;
            Ok(Token::Float(float_val))
        } else {
            let int_val = value
                .parse::<i64>()
                .map_err(|_| SyntaxError::new(format!("invalid integer: {value}")))?;
            Ok(Token::Int(int_val))
        }
    }

    fn read_identifier(&mut self) -> String {
        let mut value = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' {
                value.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        value
    }

    /// Consume `ch` and return `long` when the next char is `second`, else `short`.
    fn pair(&mut self, second: char, long: Token, short: Token) -> Token {
        self.advance();
        if self.current_char == Some(second) {
            self.advance();
            long
        } else {
            short
        }
    }

    pub fn next_token(&mut self) -> Result<Token, SyntaxError> {
        self.skip_whitespace_and_comments();

        let Some(ch) = self.current_char else {
            return Ok(Token::Eof);
        };

        let token = match ch {
            '(' => self.single(Token::LeftParen),
            ')' => self.single(Token::RightParen),
            '[' => self.single(Token::LeftBracket),
            ']' => self.single(Token::RightBracket),
            '{' => self.single(Token::LeftBrace),
            '}' => self.single(Token::RightBrace),
            ',' => self.single(Token::Comma),
            ':' => self.single(Token::Colon),
            '.' if self.peek().is_some_and(|next| next.is_ascii_digit()) => {
                self.read_number_with_leading_dot()?
            }
            '.' => self.single(Token::Dot),
            '+' => self.pair('=', Token::PlusAssign, Token::Plus),
            '-' => self.pair('=', Token::MinusAssign, Token::Minus),
            '%' => self.single(Token::Percent),
            '*' => {
                self.advance();
                match self.current_char {
                    Some('*') => self.single(Token::DoubleStar),
                    Some('=') => self.single(Token::StarAssign),
                    _ => Token::Star,
                }
            }
            '/' => {
                self.advance();
                match self.current_char {
                    Some('/') => self.single(Token::DoubleSlash),
                    Some('=') => self.single(Token::SlashAssign),
                    _ => Token::Slash,
                }
            }
            '=' => self.pair('=', Token::Equal, Token::Assign),
            '<' => self.pair('=', Token::LessEqual, Token::Less),
            '>' => self.pair('=', Token::GreaterEqual, Token::Greater),
            '!' => {
                self.advance();
                if self.current_char == Some('=') {
                    self.single(Token::NotEqual)
                } else {
                    return Err(SyntaxError::new("unexpected character '!'"));
                }
            }
            '"' | '\'' => Token::Str(self.read_string(ch)?),
            ch if ch.is_ascii_digit() => self.read_number()?,
            ch if ch.is_alphabetic() || ch == '_' => {
                if (ch == 'f' || ch == 'F') && matches!(self.peek(), Some('"') | Some('\'')) {
                    self.advance();
                    let quote = self.current_char.unwrap_or('"');
                    return Ok(Token::FStr(self.read_raw_string(quote)?));
                }
                if (ch == 'r' || ch == 'R') && matches!(self.peek(), Some('"') | Some('\'')) {
                    self.advance();
                    let quote = self.current_char.unwrap_or('"');
                    return Ok(Token::Str(self.read_raw_string(quote)?));
                }
                keyword_or_name(self.read_identifier())
            }
            other => {
                return Err(SyntaxError::new(format!("unexpected character '{other}'")));
            }
        };

        Ok(token)
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn read_number_with_leading_dot(&mut self) -> Result<Token, SyntaxError> {
        self.advance();
        let mut digits = String::from("0.");
        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                digits.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        digits
            .parse::<f64>()
            .map(Token::Float)
            .map_err(|_| SyntaxError::new(format!("invalid float: {digits}")))
    }
}

fn keyword_or_name(word: String) -> Token {
    match word.as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "in" => Token::In,
        "is" => Token::Is,
        "if" => Token::If,
        "elif" => Token::Elif,
        "else" => Token::Else,
        "for" => Token::For,
        "return" => Token::Return,
        "pass" => Token::Pass,
        "True" => Token::True,
        "False" => Token::False,
        "None" => Token::None,
        _ => Token::Name(word),
    }
}

pub(crate) fn unescape(escaped: char) -> String {
    match escaped {
        'n' => "\n".to_string(),
        't' => "\t".to_string(),
        'r' => "\r".to_string(),
        '0' => "\0".to_string(),
        '\\' => "\\".to_string(),
        '\'' => "'".to_string(),
        '"' => "\"".to_string(),
        other => format!("\\{other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_calls_and_operators() {
        let tokens = Tokenizer::new("fake.random_int(1, 10) ** 2 // 3 != 4.5")
            .tokenize()
            .unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Name("fake".to_string()),
                Token::Dot,
                Token::Name("random_int".to_string()),
                Token::LeftParen,
                Token::Int(1),
                Token::Comma,
                Token::Int(10),
                Token::RightParen,
                Token::DoubleStar,
                Token::Int(2),
                Token::DoubleSlash,
                Token::Int(3),
                Token::NotEqual,
                Token::Float(4.5),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn keeps_fstring_bodies_raw() {
        let tokens = Tokenizer::new(r#"f"id-{row_id:05d}\n" # trailing"#)
            .tokenize()
            .unwrap();
        assert_eq!(
            tokens,
            vec![Token::FStr(r"id-{row_id:05d}\n".to_string()), Token::Eof]
        );
    }
}
