//! The token definition for the smart playlist language.

use std::fmt;

use chrono::NaiveDate;

/// A token is a single unit of the language, with a specific kind and location.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    Keyword(Keyword),

    // Literals
    Identifier(&'a str),
    String(String), // Escapes already resolved, quotes stripped
    Number(Number),
    Date(NaiveDate),

    // Punctuation
    LBrace, // {
    RBrace, // }
    LParen, // (
    RParen, // )
    Comma,  // ,

    // Operators
    Eq,    // =
    NotEq, // != or <>
    Gt,    // >
    Lt,    // <
    Gte,   // >=
    Lte,   // <=

    Eof,
}

/// Reserved words. Matched case-insensitively by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Smart,
    Playlist,
    Having,
    Order,
    By,
    Limit,
    And,
    Or,
    Not,
    Is,
    In,
    The,
    Last,
    Asc,
    Desc,
    Contains,
    Includes,
    Starts,
    Ends,
    With,
    After,
    Before,
    Ago,
    Today,
    Yesterday,
    True,
    False,
    Random,
}

impl Keyword {
    pub fn lookup(word: &str) -> Option<Keyword> {
        let keyword = match word.to_ascii_lowercase().as_str() {
            "smart" => Keyword::Smart,
            "playlist" => Keyword::Playlist,
            "having" => Keyword::Having,
            "order" => Keyword::Order,
            "by" => Keyword::By,
            "limit" => Keyword::Limit,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "not" => Keyword::Not,
            "is" => Keyword::Is,
            "in" => Keyword::In,
            "the" => Keyword::The,
            "last" => Keyword::Last,
            "asc" => Keyword::Asc,
            "desc" => Keyword::Desc,
            "contains" => Keyword::Contains,
            "includes" => Keyword::Includes,
            "starts" => Keyword::Starts,
            "ends" => Keyword::Ends,
            "with" => Keyword::With,
            "after" => Keyword::After,
            "before" => Keyword::Before,
            "ago" => Keyword::Ago,
            "today" => Keyword::Today,
            "yesterday" => Keyword::Yesterday,
            "true" => Keyword::True,
            "false" => Keyword::False,
            "random" => Keyword::Random,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Smart => "smart",
            Keyword::Playlist => "playlist",
            Keyword::Having => "having",
            Keyword::Order => "order",
            Keyword::By => "by",
            Keyword::Limit => "limit",
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::Not => "not",
            Keyword::Is => "is",
            Keyword::In => "in",
            Keyword::The => "the",
            Keyword::Last => "last",
            Keyword::Asc => "asc",
            Keyword::Desc => "desc",
            Keyword::Contains => "contains",
            Keyword::Includes => "includes",
            Keyword::Starts => "starts",
            Keyword::Ends => "ends",
            Keyword::With => "with",
            Keyword::After => "after",
            Keyword::Before => "before",
            Keyword::Ago => "ago",
            Keyword::Today => "today",
            Keyword::Yesterday => "yesterday",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::Random => "random",
        }
    }
}

/// A numeric literal as written in the source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(i64),
    Decimal(f64),
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(n) => write!(f, "{}", n),
            Number::Decimal(n) => write!(f, "{}", n),
        }
    }
}

impl fmt::Display for TokenKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Keyword(k) => write!(f, "`{}`", k.as_str()),
            TokenKind::Identifier(name) => write!(f, "identifier `{}`", name),
            TokenKind::String(s) => write!(f, "string {:?}", s),
            TokenKind::Number(n) => write!(f, "number {}", n),
            TokenKind::Date(d) => write!(f, "date {}", d.format("%Y-%m-%d")),
            TokenKind::LBrace => f.write_str("`{`"),
            TokenKind::RBrace => f.write_str("`}`"),
            TokenKind::LParen => f.write_str("`(`"),
            TokenKind::RParen => f.write_str("`)`"),
            TokenKind::Comma => f.write_str("`,`"),
            TokenKind::Eq => f.write_str("`=`"),
            TokenKind::NotEq => f.write_str("`!=`"),
            TokenKind::Gt => f.write_str("`>`"),
            TokenKind::Lt => f.write_str("`<`"),
            TokenKind::Gte => f.write_str("`>=`"),
            TokenKind::Lte => f.write_str("`<=`"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

/// Represents a span in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// The starting byte offset.
    pub start: usize,
    /// The ending byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// 1-based line and column of the span start within `source`.
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        line_col(source, self.start)
    }
}

/// 1-based line and column of a byte offset.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(source.len());
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(nl) => before[nl + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup_is_case_insensitive() {
        assert_eq!(Keyword::lookup("ORDER"), Some(Keyword::Order));
        assert_eq!(Keyword::lookup("Playlist"), Some(Keyword::Playlist));
        assert_eq!(Keyword::lookup("genre"), None);
    }

    #[test]
    fn test_line_col() {
        let source = "smart playlist\n  \"x\" {";
        assert_eq!(line_col(source, 0), (1, 1));
        assert_eq!(line_col(source, 6), (1, 7));
        assert_eq!(line_col(source, 17), (2, 3));
    }
}
