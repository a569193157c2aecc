//! Lexer for the smart playlist language.
//!
//! The lexer yields one `Result<Token, LexError>` per call to `next()` and
//! stops after the first error. [`tokenize`] collects the whole input up
//! front and terminates the sequence with an `Eof` token, which is what the
//! parser expects.

use chrono::NaiveDate;
use thiserror::Error;

use crate::token::{Keyword, Number, Span, Token, TokenKind};

#[derive(Debug, Clone, PartialEq, Error)]
#[error("lexical error at offset {position}: {kind}")]
pub struct LexError {
    /// Byte offset where the offending token starts.
    pub position: usize,
    pub kind: LexErrorKind,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexErrorKind {
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("invalid escape sequence \\{0}")]
    InvalidEscape(char),
    #[error("malformed number `{0}`")]
    MalformedNumber(String),
    #[error("invalid date `{0}`")]
    InvalidDate(String),
}

impl LexError {
    /// Creates an error at a byte offset.
    fn new(position: usize, kind: LexErrorKind) -> Self {
        Self { position, kind }
    }
}

pub struct Lexer<'a> {
    input: &'a str,
    /// Current byte offset into `input`.
    position: usize,
    /// Set once an error has been produced; the lexer yields nothing after that.
    failed: bool,
}

/// Scans the whole input into a token vector terminated by `Eof`.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, LexError> {
    let mut tokens = Lexer::new(input).collect::<Result<Vec<_>, _>>()?;
    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(input.len(), input.len()),
    });
    Ok(tokens)
}

impl<'a> Lexer<'a> {
    /// Creates a lexer positioned at the start of `input`.
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            position: 0,
            failed: false,
        }
    }

    /// Returns the current character without consuming it.
    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    /// Returns the character after the current one.
    fn peek_next(&self) -> Option<char> {
        self.input[self.position..].chars().nth(1)
    }

    /// Consumes and returns the current character.
    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    /// Consumes characters while `pred` holds.
    fn bump_while(&mut self, pred: impl Fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if pred(c) {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// Builds a token spanning `start` to the current position.
    fn token(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token {
            kind,
            span: Span::new(start, self.position),
        }
    }

    /// Skips whitespace, `#` line comments and `/* */` block comments.
    fn skip_trivia(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => self.bump_while(|c| c != '\n'),
                Some('/') if self.peek_next() == Some('*') => {
                    let start = self.position;
                    self.position += 2;
                    match self.input[self.position..].find("*/") {
                        Some(end) => self.position += end + 2,
                        None => {
                            return Err(LexError::new(start, LexErrorKind::UnterminatedComment))
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Reads a quoted string. The opening quote has been consumed by the caller.
    fn read_string(&mut self, start: usize, quote: char) -> Result<Token<'a>, LexError> {
        let mut value = String::new();
        loop {
            let escape_at = self.position;
            match self.bump() {
                None => return Err(LexError::new(start, LexErrorKind::UnterminatedString)),
                Some(c) if c == quote => break,
                Some('\\') => match self.bump() {
                    Some(c @ ('\\' | '\'' | '"')) => value.push(c),
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some(other) => {
                        return Err(LexError::new(escape_at, LexErrorKind::InvalidEscape(other)))
                    }
                    None => return Err(LexError::new(start, LexErrorKind::UnterminatedString)),
                },
                Some(c) => value.push(c),
            }
        }
        Ok(self.token(TokenKind::String(value), start))
    }

    /// Reads an integer, a decimal, or a `YYYY-MM-DD` date.
    /// A leading `-`, if any, has been consumed by the caller.
    fn read_number(&mut self, start: usize) -> Result<Token<'a>, LexError> {
        let digits_start = self.position;
        self.bump_while(|c| c.is_ascii_digit());
        let negative = digits_start != start;

        if !negative
            && self.position - digits_start == 4
            && self.peek() == Some('-')
            && self.peek_next().is_some_and(|c| c.is_ascii_digit())
        {
            return self.read_date(start);
        }

        let mut decimal = false;
        if self.peek() == Some('.') {
            self.bump();
            let fraction_start = self.position;
            self.bump_while(|c| c.is_ascii_digit());
            decimal = true;
            if self.position == fraction_start {
                return Err(self.malformed_number(start));
            }
        }
        if matches!(self.peek(), Some(c) if c == '.' || c == '_' || c.is_alphanumeric()) {
            return Err(self.malformed_number(start));
        }

        let text = &self.input[start..self.position];
        let number = if decimal {
            text.parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Number::Decimal)
        } else {
            text.parse::<i64>().map(Number::Integer).ok()
        };
        match number {
            Some(number) => Ok(self.token(TokenKind::Number(number), start)),
            None => Err(LexError::new(
                start,
                LexErrorKind::MalformedNumber(text.to_string()),
            )),
        }
    }

    /// Consumes the rest of a bad numeric token so the error shows all of it.
    fn malformed_number(&mut self, start: usize) -> LexError {
        self.bump_while(|c| c == '.' || c == '_' || c.is_alphanumeric());
        LexError::new(
            start,
            LexErrorKind::MalformedNumber(self.input[start..self.position].to_string()),
        )
    }

    /// Reads a `YYYY-MM-DD` literal and checks it is a real calendar day.
    fn read_date(&mut self, start: usize) -> Result<Token<'a>, LexError> {
        self.bump_while(|c| c.is_ascii_digit() || c == '-');
        self.bump_while(|c| c == '_' || c.is_alphanumeric());
        let text = &self.input[start..self.position];

        let shaped = text.len() == 10
            && text.char_indices().all(|(i, c)| match i {
                4 | 7 => c == '-',
                _ => c.is_ascii_digit(),
            });
        let date = if shaped {
            NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
        } else {
            None
        };
        match date {
            Some(date) => Ok(self.token(TokenKind::Date(date), start)),
            None => Err(LexError::new(
                start,
                LexErrorKind::InvalidDate(text.to_string()),
            )),
        }
    }

    /// Reads an identifier or keyword.
    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        self.bump_while(|c| c == '_' || c.is_alphanumeric());
        let word = &self.input[start..self.position];
        let kind = match Keyword::lookup(word) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Identifier(word),
        };
        self.token(kind, start)
    }

    /// Reads the next token, or `None` at end of input.
    fn read_token(&mut self) -> Option<Result<Token<'a>, LexError>> {
        if let Err(e) = self.skip_trivia() {
            return Some(Err(e));
        }
        let start = self.position;
        let c = self.bump()?;

        let token = match c {
            '{' => self.token(TokenKind::LBrace, start),
            '}' => self.token(TokenKind::RBrace, start),
            '(' => self.token(TokenKind::LParen, start),
            ')' => self.token(TokenKind::RParen, start),
            ',' => self.token(TokenKind::Comma, start),
            '=' => self.token(TokenKind::Eq, start),
            '<' => match self.peek() {
                Some('=') => {
                    self.bump();
                    self.token(TokenKind::Lte, start)
                }
                Some('>') => {
                    self.bump();
                    self.token(TokenKind::NotEq, start)
                }
                _ => self.token(TokenKind::Lt, start),
            },
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::Gte, start)
                } else {
                    self.token(TokenKind::Gt, start)
                }
            }
            '!' if self.peek() == Some('=') => {
                self.bump();
                self.token(TokenKind::NotEq, start)
            }
            '"' | '\'' => return Some(self.read_string(start, c)),
            '-' if self.peek().is_some_and(|c| c.is_ascii_digit()) => {
                return Some(self.read_number(start))
            }
            c if c.is_ascii_digit() => {
                // Re-read from the first digit so read_number sees the whole literal.
                self.position = start;
                return Some(self.read_number(start));
            }
            c if c.is_alphabetic() || c == '_' => self.read_identifier(start),
            other => {
                return Some(Err(LexError::new(
                    start,
                    LexErrorKind::UnexpectedChar(other),
                )))
            }
        };
        Some(Ok(token))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.read_token();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}
