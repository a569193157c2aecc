//! Recursive descent parser for smart playlist definitions.
//!
//! ## Parse flow
//!
//! ```text
//! parse()
//!   ├─ "smart" "playlist" STRING "{"
//!   ├─ parse_or_expression()
//!   │    └─ parse_and_expression()
//!   │         └─ parse_unary()
//!   │              ├─ "not" → parse_unary() (recursive)
//!   │              ├─ "("   → parse_or_expression() (recursive), ")"
//!   │              ├─ "in" "playlist" STRING
//!   │              └─ IDENT → parse_comparison()
//!   │                          ├─ "is in the last" N UNIT → TimeWindow
//!   │                          └─ comparator parse_value()
//!   ├─ ["having" parse_comparison()]
//!   ├─ ["order" "by" term ("," term)*]
//!   ├─ ["limit" N]
//!   └─ "}" EOF
//! ```
//!
//! ## Precedence (high to low)
//!
//! 1. **Grouping** `( expression )`
//! 2. **NOT** `not expression`
//! 3. **AND** `a and b`
//! 4. **OR** `a or b`
//!
//! AND and OR are left-associative: `a or b or c` is `(a or b) or c`.
//!
//! ## Examples
//!
//! ```text
//! smart playlist "Rock" { genre is "Rock" }
//!
//! smart playlist "Recent favourites" {
//!     rating >= 80 and time_added is in the last 3 months
//!     order by time_added desc
//!     limit 50
//! }
//!
//! smart playlist "Unplayed rock" { in playlist "Rock" and not play_count > 0 }
//! ```
//!
//! The parser stops at the first error; there is no recovery.

use thiserror::Error;

use crate::ast::{
    Comparator, DateValue, Direction, Expr, ExprArena, ExprId, Identifier, OrderKey, OrderSpec,
    OrderTerm, Playlist, TimeUnit, Value,
};
use crate::token::{Keyword, Number, Span, Token, TokenKind};

/// Maximum nesting of parentheses and `not` the parser will recurse into.
pub const MAX_NESTING: usize = 64;

/// Maximum height of the expression tree, counting chained `and`/`or`.
pub const MAX_TREE_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("syntax error at offset {}: expected {}, found {}", .span.start, .expected.join(" or "), .found)]
pub struct SyntaxError {
    pub span: Span,
    /// Human-readable descriptions of what would have been accepted.
    pub expected: Vec<String>,
    pub found: String,
}

pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    position: usize,
    arena: ExprArena,
    /// Height of each arena node, indexed like the arena.
    heights: Vec<usize>,
    nesting: usize,
}

/// Parses a token sequence (normally ending with `Eof`) into a playlist.
pub fn parse(tokens: &[Token<'_>]) -> Result<Playlist, SyntaxError> {
    Parser::new(tokens).parse()
}

impl<'a> Parser<'a> {
    /// Creates a parser over a token slice ending in `Eof`.
    pub fn new(tokens: &'a [Token<'a>]) -> Self {
        Self {
            tokens,
            position: 0,
            arena: ExprArena::new(),
            heights: Vec::new(),
            nesting: 0,
        }
    }

    /// Returns the current token without advancing.
    fn peek(&self) -> Option<&'a Token<'a>> {
        self.tokens.get(self.position)
    }

    /// Kind of the current token.
    fn peek_kind(&self) -> Option<&'a TokenKind<'a>> {
        self.peek().map(|t| &t.kind)
    }

    /// Returns the current token and advances.
    fn advance(&mut self) -> Option<&'a Token<'a>> {
        let token = self.peek();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// Is the current token `keyword`?
    fn check_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Keyword(k)) if *k == keyword)
    }

    /// Consumes `keyword` if it is next.
    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.check_keyword(keyword) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    /// Consumes `keyword` or fails.
    fn expect_keyword(&mut self, keyword: Keyword) -> Result<Span, SyntaxError> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Keyword(keyword) => {
                self.position += 1;
                Ok(token.span)
            }
            _ => {
                let expected = format!("`{}`", keyword.as_str());
                Err(self.error(&[expected.as_str()]))
            }
        }
    }

    /// Expects a payload-free token such as punctuation or `Eof`.
    fn expect(&mut self, expected: TokenKind<'_>, what: &[&str]) -> Result<Span, SyntaxError> {
        match self.peek() {
            Some(token)
                if std::mem::discriminant(&token.kind) == std::mem::discriminant(&expected) =>
            {
                self.position += 1;
                Ok(token.span)
            }
            _ => Err(self.error(what)),
        }
    }

    /// Consumes a string literal.
    fn expect_string(&mut self, what: &str) -> Result<(String, Span), SyntaxError> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::String(s),
                span,
            }) => {
                self.position += 1;
                Ok((s.clone(), *span))
            }
            _ => Err(self.error(&[what])),
        }
    }

    /// Consumes a field name.
    fn expect_identifier(&mut self, what: &str) -> Result<Identifier, SyntaxError> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Identifier(name),
                span,
            }) => {
                self.position += 1;
                Ok(Identifier::new(*name, *span))
            }
            _ => Err(self.error(&[what])),
        }
    }

    /// Consumes an integer in `1..=u32::MAX`.
    fn expect_positive_integer(&mut self, what: &str) -> Result<u32, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::Number(Number::Integer(n))) if *n >= 1 => match u32::try_from(*n) {
                Ok(n) => {
                    self.position += 1;
                    Ok(n)
                }
                Err(_) => Err(self.error(&[what])),
            },
            _ => Err(self.error(&[what])),
        }
    }

    /// Consumes `day(s)`, `week(s)`, `month(s)` or `year(s)`.
    fn expect_time_unit(&mut self) -> Result<TimeUnit, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::Identifier(word)) => match TimeUnit::parse(word) {
                Some(unit) => {
                    self.position += 1;
                    Ok(unit)
                }
                None => Err(self.unit_error()),
            },
            _ => Err(self.unit_error()),
        }
    }

    /// Error for a missing or misspelled time unit.
    fn unit_error(&self) -> SyntaxError {
        self.error(&["`days`", "`weeks`", "`months`", "`years`"])
    }

    /// Syntax error at the current token.
    fn error(&self, expected: &[&str]) -> SyntaxError {
        let (span, found) = match self.peek() {
            Some(token) => (token.span, token.kind.to_string()),
            None => {
                let end = self.tokens.last().map(|t| t.span.end).unwrap_or(0);
                (Span::new(end, end), "end of input".to_string())
            }
        };
        SyntaxError {
            span,
            expected: expected.iter().map(|s| s.to_string()).collect(),
            found,
        }
    }

    /// Span of the current token.
    fn current_span(&self) -> Span {
        self.peek().map(|t| t.span).unwrap_or_default()
    }

    /// Adds a node of the given height to the arena.
    fn alloc(&mut self, expr: Expr, height: usize, span: Span) -> Result<ExprId, SyntaxError> {
        if height > MAX_TREE_DEPTH {
            return Err(SyntaxError {
                span,
                expected: vec![format!("at most {} levels of expression depth", MAX_TREE_DEPTH)],
                found: "a deeper expression".to_string(),
            });
        }
        self.heights.push(height);
        Ok(self.arena.alloc(expr))
    }

    /// Height of an allocated node.
    fn height(&self, id: ExprId) -> usize {
        self.heights[id.index()]
    }

    /// Enters a parenthesized group or `not`.
    fn enter_nested(&mut self) -> Result<(), SyntaxError> {
        self.nesting += 1;
        if self.nesting > MAX_NESTING {
            return Err(SyntaxError {
                span: self.current_span(),
                expected: vec![format!("at most {} levels of nesting", MAX_NESTING)],
                found: "deeper nesting".to_string(),
            });
        }
        Ok(())
    }

    /// Leaves a group entered with `enter_nested`.
    fn leave_nested(&mut self) {
        self.nesting -= 1;
    }

    /// Parses one complete playlist definition.
    pub fn parse(&mut self) -> Result<Playlist, SyntaxError> {
        self.expect_keyword(Keyword::Smart)?;
        self.expect_keyword(Keyword::Playlist)?;
        let title = self.parse_title()?;
        self.expect(TokenKind::LBrace, &["`{`"])?;

        let criteria = self.parse_or_expression()?;
        let mut expected = vec!["`and`", "`or`", "`having`", "`order by`", "`limit`", "`}`"];

        let having = if self.eat_keyword(Keyword::Having) {
            expected = vec!["`order by`", "`limit`", "`}`"];
            Some(self.parse_comparison()?)
        } else {
            None
        };

        let order = if self.eat_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            expected = vec!["`,`", "`limit`", "`}`"];
            Some(self.parse_order()?)
        } else {
            None
        };

        let limit = if self.eat_keyword(Keyword::Limit) {
            expected = vec!["`}`"];
            Some(self.expect_positive_integer("positive integer limit")?)
        } else {
            None
        };

        self.expect(TokenKind::RBrace, &expected)?;
        self.expect(TokenKind::Eof, &["end of input"])?;

        Ok(Playlist {
            title,
            criteria,
            having,
            order,
            limit,
            arena: std::mem::take(&mut self.arena),
        })
    }

    /// The non-empty title string.
    fn parse_title(&mut self) -> Result<String, SyntaxError> {
        let (title, span) = self.expect_string("playlist title string")?;
        if title.trim().is_empty() {
            return Err(SyntaxError {
                span,
                expected: vec!["non-empty playlist title".to_string()],
                found: "empty string".to_string(),
            });
        }
        Ok(title)
    }

    /// `and_expr (OR and_expr)*`
    fn parse_or_expression(&mut self) -> Result<ExprId, SyntaxError> {
        let mut left = self.parse_and_expression()?;

        while self.check_keyword(Keyword::Or) {
            let span = self.current_span();
            self.advance();
            let right = self.parse_and_expression()?;
            let height = self.height(left).max(self.height(right)) + 1;
            left = self.alloc(Expr::Or(left, right), height, span)?;
        }

        Ok(left)
    }

    /// `unary (AND unary)*`
    fn parse_and_expression(&mut self) -> Result<ExprId, SyntaxError> {
        let mut left = self.parse_unary()?;

        while self.check_keyword(Keyword::And) {
            let span = self.current_span();
            self.advance();
            let right = self.parse_unary()?;
            let height = self.height(left).max(self.height(right)) + 1;
            left = self.alloc(Expr::And(left, right), height, span)?;
        }

        Ok(left)
    }

    /// `not unary`, `( or_expr )`, `in playlist` or a comparison.
    fn parse_unary(&mut self) -> Result<ExprId, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::Keyword(Keyword::Not)) => {
                let span = self.current_span();
                self.advance();
                self.enter_nested()?;
                let inner = self.parse_unary()?;
                self.leave_nested();
                let height = self.height(inner) + 1;
                self.alloc(Expr::Not(inner), height, span)
            }
            Some(TokenKind::LParen) => {
                self.advance();
                self.enter_nested()?;
                let expr = self.parse_or_expression()?;
                self.expect(TokenKind::RParen, &["`and`", "`or`", "`)`"])?;
                self.leave_nested();
                Ok(expr)
            }
            Some(TokenKind::Keyword(Keyword::In)) => self.parse_in_playlist(),
            Some(TokenKind::Identifier(_)) => self.parse_comparison(),
            _ => Err(self.error(&["`not`", "`(`", "`in playlist`", "field name"])),
        }
    }

    /// `in playlist STRING`
    fn parse_in_playlist(&mut self) -> Result<ExprId, SyntaxError> {
        let start = self.current_span();
        self.expect_keyword(Keyword::In)?;
        self.expect_keyword(Keyword::Playlist)?;
        let (name, end) = self.expect_string("playlist name string")?;
        let span = Span::new(start.start, end.end);
        self.alloc(Expr::InPlaylist { name, span }, 1, span)
    }

    /// `field comparator value`, or `field is [not] in the last N unit`.
    fn parse_comparison(&mut self) -> Result<ExprId, SyntaxError> {
        let field = self.expect_identifier("field name")?;
        let Some(token) = self.peek() else {
            return Err(self.error(&["comparison operator"]));
        };

        let op = match &token.kind {
            TokenKind::Keyword(Keyword::Is) => {
                self.advance();
                let negated = self.eat_keyword(Keyword::Not);
                if self.check_keyword(Keyword::In) {
                    return self.parse_time_window(field, negated);
                }
                if negated {
                    Comparator::NotEq
                } else {
                    Comparator::Eq
                }
            }
            TokenKind::Eq => {
                self.advance();
                Comparator::Eq
            }
            TokenKind::NotEq => {
                self.advance();
                Comparator::NotEq
            }
            TokenKind::Gt | TokenKind::Keyword(Keyword::After) => {
                self.advance();
                Comparator::Gt
            }
            TokenKind::Lt | TokenKind::Keyword(Keyword::Before) => {
                self.advance();
                Comparator::Lt
            }
            TokenKind::Gte => {
                self.advance();
                Comparator::Gte
            }
            TokenKind::Lte => {
                self.advance();
                Comparator::Lte
            }
            TokenKind::Keyword(Keyword::Contains | Keyword::Includes) => {
                self.advance();
                Comparator::Contains
            }
            TokenKind::Keyword(Keyword::Starts) => {
                self.advance();
                self.expect_keyword(Keyword::With)?;
                Comparator::StartsWith
            }
            TokenKind::Keyword(Keyword::Ends) => {
                self.advance();
                self.expect_keyword(Keyword::With)?;
                Comparator::EndsWith
            }
            _ => return Err(self.error(&["comparison operator"])),
        };

        let value = self.parse_value()?;
        let span = field.span;
        self.alloc(Expr::Compare { field, op, value }, 1, span)
    }

    /// The remainder of `field is [not] in the last N unit`, starting at `in`.
    fn parse_time_window(&mut self, field: Identifier, negated: bool) -> Result<ExprId, SyntaxError> {
        self.expect_keyword(Keyword::In)?;
        self.expect_keyword(Keyword::The)?;
        self.expect_keyword(Keyword::Last)?;
        let amount = self.expect_positive_integer("positive integer amount")?;
        let unit = self.expect_time_unit()?;

        let span = field.span;
        let window = self.alloc(Expr::TimeWindow { field, amount, unit }, 1, span)?;
        if negated {
            self.alloc(Expr::Not(window), 2, span)
        } else {
            Ok(window)
        }
    }

    /// Right-hand side of a comparison.
    fn parse_value(&mut self) -> Result<Value, SyntaxError> {
        let Some(token) = self.peek() else {
            return Err(self.error(&["value"]));
        };

        let value = match &token.kind {
            TokenKind::String(s) => Value::Str(s.clone()),
            TokenKind::Number(Number::Integer(_)) if self.is_relative_date() => {
                let amount = self.expect_positive_integer("positive integer amount")?;
                let unit = self.expect_time_unit()?;
                self.expect_keyword(Keyword::Ago)?;
                return Ok(Value::Date(DateValue::Ago { amount, unit }));
            }
            TokenKind::Number(n) => Value::Num(*n),
            TokenKind::Date(d) => Value::Date(DateValue::Absolute(*d)),
            TokenKind::Keyword(Keyword::Today) => Value::Date(DateValue::Today),
            TokenKind::Keyword(Keyword::Yesterday) => Value::Date(DateValue::Yesterday),
            TokenKind::Keyword(Keyword::True) => Value::Bool(true),
            TokenKind::Keyword(Keyword::False) => Value::Bool(false),
            TokenKind::Identifier(word) => Value::Symbol(word.to_string()),
            _ => {
                return Err(self.error(&[
                    "string",
                    "number",
                    "date",
                    "`today`",
                    "`yesterday`",
                    "`true`",
                    "`false`",
                    "symbol",
                ]))
            }
        };
        self.advance();
        Ok(value)
    }

    /// True when the current integer is followed by a time unit (`3 weeks ago`).
    fn is_relative_date(&self) -> bool {
        matches!(
            self.tokens.get(self.position + 1).map(|t| &t.kind),
            Some(TokenKind::Identifier(word)) if TimeUnit::parse(word).is_some()
        )
    }

    /// `term ("," term)*`, where `term := (IDENT | "random") ["asc" | "desc"]`
    fn parse_order(&mut self) -> Result<OrderSpec, SyntaxError> {
        let mut terms = Vec::new();

        loop {
            let key = if self.eat_keyword(Keyword::Random) {
                OrderKey::Random
            } else {
                OrderKey::Field(self.expect_identifier("field name or `random`")?)
            };

            let direction = if self.eat_keyword(Keyword::Desc) {
                Direction::Desc
            } else {
                self.eat_keyword(Keyword::Asc);
                Direction::Asc
            };

            terms.push(OrderTerm { key, direction });

            if !matches!(self.peek_kind(), Some(TokenKind::Comma)) {
                break;
            }
            self.advance();
        }

        Ok(OrderSpec { terms })
    }
}
