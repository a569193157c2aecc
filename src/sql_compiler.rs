//! SQL compiler that turns a playlist AST into SQLite query fragments.
//!
//! The output is four fragments (WHERE, HAVING, ORDER BY and the LIMIT value)
//! that a caller splices into its own statement. Every column comes from the
//! [`FieldCatalog`]; user text reaches the SQL only through [`quote_literal`].
//!
//! Dates are day-granular and evaluated by SQLite when the query runs, so a
//! cached statement keeps meaning "the last 7 days" on later executions.
//! Month and year arithmetic clamps to the last day of the target month:
//! one month before March 31 is February 28 (or 29).

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use crate::ast::{
    Comparator, DateValue, Direction, Expr, ExprId, Identifier, OrderKey, OrderSpec, Playlist,
    TimeUnit, Value,
};
use crate::catalog::{FieldCatalog, FieldSpec, FieldType};
use crate::library::PlaylistResolver;
use crate::parser::MAX_TREE_DEPTH;
use crate::token::Span;
use crate::CompileError;

/// Longest chain of `in playlist` references followed from one playlist.
pub const MAX_REFERENCE_DEPTH: usize = 32;

/// Expression depth across a playlist and every playlist it expands.
pub const MAX_EXPANDED_DEPTH: usize = MAX_TREE_DEPTH;

/// Largest WHERE or HAVING clause the compiler builds, in bytes.
pub const MAX_CLAUSE_LEN: usize = 1 << 20;

/// Result of compiling one smart playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledPlaylist {
    pub title: String,
    pub where_clause: String,
    pub having_clause: Option<String>,
    pub order_clause: Option<String>,
    /// `None` means unbounded.
    pub limit: Option<u32>,
}

impl CompiledPlaylist {
    /// Splices the fragments into a statement.
    ///
    /// `select` is everything up to and including the `FROM` clause. A playlist
    /// with a having clause needs a `GROUP BY` expression; otherwise `group_by`
    /// is ignored.
    pub fn to_sql(&self, select: &str, group_by: Option<&str>) -> Result<String, StatementError> {
        let mut sql = format!("{} WHERE {}", select, self.where_clause);
        if let Some(having) = &self.having_clause {
            let group_by = group_by
                .filter(|g| !g.trim().is_empty())
                .ok_or_else(|| StatementError::MissingGroupBy {
                    title: self.title.clone(),
                })?;
            sql.push_str(" GROUP BY ");
            sql.push_str(group_by);
            sql.push_str(" HAVING ");
            sql.push_str(having);
        }
        if let Some(order) = &self.order_clause {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        Ok(sql)
    }
}

#[derive(Debug, Error)]
pub enum StatementError {
    #[error("playlist \"{title}\" has a having clause, which needs a GROUP BY expression")]
    MissingGroupBy { title: String },
}

#[derive(Debug, Error)]
pub enum SemanticError {
    #[error("unknown field `{field}`")]
    UnknownField { field: String, span: Span },

    #[error("operator `{operator}` is not allowed for field `{field}`")]
    OperatorNotAllowed {
        field: String,
        operator: Comparator,
        span: Span,
    },

    #[error("field `{field}` holds {expected} values, found {found} {value}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
        value: String,
        span: Span,
    },

    #[error("invalid value for field `{field}`: {message}")]
    InvalidValue {
        field: String,
        message: String,
        span: Span,
    },

    #[error("field `{field}` is not an aggregate field and cannot be used in a having clause")]
    NotAggregate { field: String, span: Span },

    #[error("unknown playlist \"{name}\"")]
    UnknownPlaylist { name: String, span: Span },

    #[error("cyclic playlist reference: {}", .chain.join(" -> "))]
    CyclicReference { chain: Vec<String> },

    #[error("playlist references nest too deeply: {}", .chain.join(" -> "))]
    ReferenceTooDeep { chain: Vec<String> },

    #[error("compiled clause exceeds {limit} bytes")]
    ClauseTooLarge { limit: usize },

    #[error("referenced playlist \"{name}\" does not compile: {source}")]
    InvalidReference {
        name: String,
        span: Span,
        #[source]
        source: Box<CompileError>,
    },
}

impl SemanticError {
    pub fn span(&self) -> Option<Span> {
        match self {
            SemanticError::UnknownField { span, .. }
            | SemanticError::OperatorNotAllowed { span, .. }
            | SemanticError::TypeMismatch { span, .. }
            | SemanticError::InvalidValue { span, .. }
            | SemanticError::NotAggregate { span, .. }
            | SemanticError::UnknownPlaylist { span, .. }
            | SemanticError::InvalidReference { span, .. } => Some(*span),
            SemanticError::CyclicReference { .. }
            | SemanticError::ReferenceTooDeep { .. }
            | SemanticError::ClauseTooLarge { .. } => None,
        }
    }
}

/// How a fragment's top level is built, for deciding where parentheses go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grouping {
    Atom,
    And,
    Or,
}

struct Fragment {
    sql: String,
    grouping: Grouping,
}

impl Fragment {
    fn atom(sql: String) -> Self {
        Self {
            sql,
            grouping: Grouping::Atom,
        }
    }

    /// The fragment as an operand of `parent`. Chains of one connective stay
    /// flat; a different connective is always parenthesized.
    fn operand_of(self, parent: Grouping) -> String {
        if self.grouping == Grouping::Atom || self.grouping == parent {
            self.sql
        } else {
            format!("({})", self.sql)
        }
    }
}

/// `in playlist` expansion state for one compile.
struct Expansion {
    /// Titles being expanded, outermost first.
    chain: Vec<String>,
    /// WHERE clauses of playlists already expanded, by title.
    compiled: HashMap<String, String>,
    /// Current expression depth, counted across expansions.
    depth: usize,
}

impl Expansion {
    fn new(title: &str) -> Self {
        Self {
            chain: vec![title.to_string()],
            compiled: HashMap::new(),
            depth: 0,
        }
    }

    fn too_deep(&self, next: &str) -> SemanticError {
        let mut chain = self.chain.clone();
        chain.push(next.to_string());
        SemanticError::ReferenceTooDeep { chain }
    }
}

/// Compiles a playlist AST against a catalog.
pub fn generate(
    playlist: &Playlist,
    catalog: &FieldCatalog,
    resolver: &dyn PlaylistResolver,
) -> Result<CompiledPlaylist, SemanticError> {
    SqlCompiler::new(catalog, resolver).compile(playlist)
}

/// SQL compiler over a borrowed catalog and playlist resolver.
pub struct SqlCompiler<'c> {
    catalog: &'c FieldCatalog,
    resolver: &'c dyn PlaylistResolver,
}

impl<'c> SqlCompiler<'c> {
    pub fn new(catalog: &'c FieldCatalog, resolver: &'c dyn PlaylistResolver) -> Self {
        Self { catalog, resolver }
    }

    pub fn compile(&self, playlist: &Playlist) -> Result<CompiledPlaylist, SemanticError> {
        // The playlist being compiled counts as expanded, so a reference back
        // to it is reported as a cycle.
        let mut expansion = Expansion::new(&playlist.title);
        let where_clause = self.compile_expr(playlist, playlist.criteria, &mut expansion)?.sql;

        let having_clause = match playlist.having {
            Some(id) => Some(self.compile_having(playlist, id, &mut expansion)?),
            None => None,
        };

        let order_clause = match &playlist.order {
            Some(order) => Some(self.compile_order(order)?),
            None => None,
        };

        Ok(CompiledPlaylist {
            title: playlist.title.clone(),
            where_clause,
            having_clause,
            order_clause,
            limit: playlist.limit,
        })
    }

    fn lookup(&self, field: &Identifier) -> Result<&'c FieldSpec, SemanticError> {
        self.catalog
            .get(&field.name)
            .ok_or_else(|| SemanticError::UnknownField {
                field: field.name.clone(),
                span: field.span,
            })
    }

    fn compile_expr(
        &self,
        playlist: &Playlist,
        id: ExprId,
        expansion: &mut Expansion,
    ) -> Result<Fragment, SemanticError> {
        if expansion.depth >= MAX_EXPANDED_DEPTH {
            return Err(SemanticError::ReferenceTooDeep {
                chain: expansion.chain.clone(),
            });
        }
        expansion.depth += 1;
        let fragment = self.compile_node(playlist, id, expansion);
        expansion.depth -= 1;

        let fragment = fragment?;
        if fragment.sql.len() > MAX_CLAUSE_LEN {
            return Err(SemanticError::ClauseTooLarge {
                limit: MAX_CLAUSE_LEN,
            });
        }
        Ok(fragment)
    }

    fn compile_node(
        &self,
        playlist: &Playlist,
        id: ExprId,
        expansion: &mut Expansion,
    ) -> Result<Fragment, SemanticError> {
        let fragment = match playlist.expr(id) {
            Expr::Compare { field, op, value } => {
                Fragment::atom(self.compile_comparison(field, *op, value)?)
            }
            Expr::TimeWindow {
                field,
                amount,
                unit,
            } => Fragment::atom(self.compile_time_window(field, *amount, *unit)?),
            Expr::And(left, right) => {
                let left = self.compile_expr(playlist, *left, expansion)?;
                let right = self.compile_expr(playlist, *right, expansion)?;
                Fragment {
                    sql: format!(
                        "{} AND {}",
                        left.operand_of(Grouping::And),
                        right.operand_of(Grouping::And)
                    ),
                    grouping: Grouping::And,
                }
            }
            Expr::Or(left, right) => {
                let left = self.compile_expr(playlist, *left, expansion)?;
                let right = self.compile_expr(playlist, *right, expansion)?;
                Fragment {
                    sql: format!(
                        "{} OR {}",
                        left.operand_of(Grouping::Or),
                        right.operand_of(Grouping::Or)
                    ),
                    grouping: Grouping::Or,
                }
            }
            Expr::Not(inner) => {
                let inner = self.compile_expr(playlist, *inner, expansion)?;
                Fragment::atom(format!("NOT ({})", inner.sql))
            }
            Expr::InPlaylist { name, span } => {
                Fragment::atom(format!("({})", self.compile_reference(name, *span, expansion)?))
            }
        };
        Ok(fragment)
    }

    /// Expands `in playlist "name"` into the referenced playlist's WHERE clause.
    /// Each playlist is compiled once per call; later references reuse it.
    fn compile_reference(
        &self,
        name: &str,
        span: Span,
        expansion: &mut Expansion,
    ) -> Result<String, SemanticError> {
        if let Some(start) = expansion.chain.iter().position(|n| n == name) {
            let mut chain = expansion.chain[start..].to_vec();
            chain.push(name.to_string());
            return Err(SemanticError::CyclicReference { chain });
        }
        if let Some(sql) = expansion.compiled.get(name) {
            return Ok(sql.clone());
        }
        if expansion.chain.len() > MAX_REFERENCE_DEPTH {
            return Err(expansion.too_deep(name));
        }

        let source =
            self.resolver
                .playlist_source(name)
                .ok_or_else(|| SemanticError::UnknownPlaylist {
                    name: name.to_string(),
                    span,
                })?;

        let invalid = |source: CompileError| SemanticError::InvalidReference {
            name: name.to_string(),
            span,
            source: Box::new(source),
        };

        let referenced = crate::parse_str(source).map_err(invalid)?;

        expansion.chain.push(name.to_string());
        let result = self.compile_expr(&referenced, referenced.criteria, expansion);
        expansion.chain.pop();

        match result {
            Ok(fragment) => {
                expansion
                    .compiled
                    .insert(name.to_string(), fragment.sql.clone());
                Ok(fragment.sql)
            }
            Err(
                e @ (SemanticError::CyclicReference { .. }
                | SemanticError::ReferenceTooDeep { .. }
                | SemanticError::ClauseTooLarge { .. }),
            ) => Err(e),
            Err(e) => Err(invalid(CompileError::Semantic(e))),
        }
    }

    fn compile_comparison(
        &self,
        field: &Identifier,
        op: Comparator,
        value: &Value,
    ) -> Result<String, SemanticError> {
        let spec = self.lookup(field)?;
        let not_allowed = || SemanticError::OperatorNotAllowed {
            field: field.name.clone(),
            operator: op,
            span: field.span,
        };
        if !spec.allows(op) {
            return Err(not_allowed());
        }
        let column = spec.column.as_str();

        let sql = match (&spec.kind, value) {
            (FieldType::String, Value::Str(s)) => {
                if s.contains('\0') {
                    return Err(SemanticError::InvalidValue {
                        field: field.name.clone(),
                        message: "strings cannot contain NUL characters".to_string(),
                        span: field.span,
                    });
                }
                match op {
                    Comparator::Contains => like(column, &format!("%{}%", escape_like(s))),
                    Comparator::StartsWith => like(column, &format!("{}%", escape_like(s))),
                    Comparator::EndsWith => like(column, &format!("%{}", escape_like(s))),
                    _ => scalar(column, op, &quote_literal(s)).ok_or_else(not_allowed)?,
                }
            }
            (FieldType::Number, Value::Num(n)) => {
                scalar(column, op, &n.to_string()).ok_or_else(not_allowed)?
            }
            (FieldType::Boolean, Value::Bool(b)) => {
                scalar(column, op, if *b { "1" } else { "0" }).ok_or_else(not_allowed)?
            }
            (FieldType::Enum { values }, Value::Symbol(s) | Value::Str(s)) => {
                let code = values
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(s))
                    .map(|(_, code)| *code)
                    .ok_or_else(|| SemanticError::InvalidValue {
                        field: field.name.clone(),
                        message: format!(
                            "`{}` is not one of: {}",
                            s,
                            values.keys().cloned().collect::<Vec<_>>().join(", ")
                        ),
                        span: field.span,
                    })?;
                scalar(column, op, &code.to_string()).ok_or_else(not_allowed)?
            }
            (FieldType::Date, Value::Date(date)) => {
                date_comparison(column, op, date).ok_or_else(not_allowed)?
            }
            (kind, value) => {
                return Err(SemanticError::TypeMismatch {
                    field: field.name.clone(),
                    expected: kind.name(),
                    found: value.type_name(),
                    value: value.to_string(),
                    span: field.span,
                })
            }
        };
        Ok(sql)
    }

    fn compile_time_window(
        &self,
        field: &Identifier,
        amount: u32,
        unit: TimeUnit,
    ) -> Result<String, SemanticError> {
        let spec = self.lookup(field)?;
        if !spec.allows(Comparator::InLast) {
            return Err(SemanticError::OperatorNotAllowed {
                field: field.name.clone(),
                operator: Comparator::InLast,
                span: field.span,
            });
        }
        if spec.kind != FieldType::Date {
            return Err(SemanticError::TypeMismatch {
                field: field.name.clone(),
                expected: spec.kind.name(),
                found: "date",
                value: format!("window of {} {}", amount, unit),
                span: field.span,
            });
        }
        Ok(format!(
            "{} >= {}",
            spec.column,
            epoch(&day_before_today(amount, unit), false)
        ))
    }

    fn compile_having(
        &self,
        playlist: &Playlist,
        id: ExprId,
        expansion: &mut Expansion,
    ) -> Result<String, SemanticError> {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            match playlist.expr(id) {
                Expr::Compare { field, .. } | Expr::TimeWindow { field, .. } => {
                    if !self.lookup(field)?.aggregate {
                        return Err(SemanticError::NotAggregate {
                            field: field.name.clone(),
                            span: field.span,
                        });
                    }
                }
                Expr::And(left, right) | Expr::Or(left, right) => {
                    stack.push(*right);
                    stack.push(*left);
                }
                Expr::Not(inner) => stack.push(*inner),
                Expr::InPlaylist { .. } => {}
            }
        }
        Ok(self.compile_expr(playlist, id, expansion)?.sql)
    }

    fn compile_order(&self, order: &OrderSpec) -> Result<String, SemanticError> {
        let terms = order
            .terms
            .iter()
            .map(|term| match &term.key {
                OrderKey::Random => Ok("random()".to_string()),
                OrderKey::Field(field) => {
                    let direction = match term.direction {
                        Direction::Asc => "ASC",
                        Direction::Desc => "DESC",
                    };
                    Ok(format!("{} {}", self.lookup(field)?.column, direction))
                }
            })
            .collect::<Result<Vec<_>, SemanticError>>()?;
        Ok(terms.join(", "))
    }
}

/// Quotes a string as an SQL literal, doubling embedded single quotes.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Escapes the LIKE wildcards `%` and `_` and the escape character itself.
pub fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn like(column: &str, pattern: &str) -> String {
    format!("{} LIKE {} ESCAPE '\\'", column, quote_literal(pattern))
}

/// `column op literal` for the plain comparison operators.
fn scalar(column: &str, op: Comparator, literal: &str) -> Option<String> {
    let op = match op {
        Comparator::Eq => "=",
        Comparator::NotEq => "<>",
        Comparator::Gt => ">",
        Comparator::Lt => "<",
        Comparator::Gte => ">=",
        Comparator::Lte => "<=",
        Comparator::Contains
        | Comparator::StartsWith
        | Comparator::EndsWith
        | Comparator::InLast => return None,
    };
    Some(format!("{} {} {}", column, op, literal))
}

/// Compares an epoch-seconds column against whole days.
fn date_comparison(column: &str, op: Comparator, date: &DateValue) -> Option<String> {
    let day = day_expr(date);
    let start = epoch(&day, false);
    let next = epoch(&day, true);
    let sql = match op {
        Comparator::Eq => format!("({c} >= {start} AND {c} < {next})", c = column),
        Comparator::NotEq => format!("({c} < {start} OR {c} >= {next})", c = column),
        Comparator::Gt => format!("{} >= {}", column, next),
        Comparator::Gte => format!("{} >= {}", column, start),
        Comparator::Lt => format!("{} < {}", column, start),
        Comparator::Lte => format!("{} < {}", column, next),
        Comparator::Contains
        | Comparator::StartsWith
        | Comparator::EndsWith
        | Comparator::InLast => return None,
    };
    Some(sql)
}

/// Epoch seconds at the start of `day` (or of the following day).
fn epoch(day: &str, following: bool) -> String {
    if following {
        format!("CAST(strftime('%s', {}, '+1 days') AS INTEGER)", day)
    } else {
        format!("CAST(strftime('%s', {}) AS INTEGER)", day)
    }
}

/// SQL expression yielding a `YYYY-MM-DD` string.
fn day_expr(date: &DateValue) -> String {
    match date {
        DateValue::Absolute(d) => format!("'{}'", d.format("%Y-%m-%d")),
        DateValue::Today => "date('now')".to_string(),
        DateValue::Yesterday => "date('now', '-1 days')".to_string(),
        DateValue::Ago { amount, unit } => day_before_today(*amount, *unit),
    }
}

/// The day `amount` units before today, using calendar arithmetic.
fn day_before_today(amount: u32, unit: TimeUnit) -> String {
    let amount = u64::from(amount);
    match unit {
        TimeUnit::Days => format!("date('now', '-{} days')", amount),
        TimeUnit::Weeks => format!("date('now', '-{} days')", amount * 7),
        TimeUnit::Months => months_before_today(amount),
        TimeUnit::Years => months_before_today(amount * 12),
    }
}

/// Today's day-of-month in the month `months` back, clamped to that month's
/// last day. SQLite's own `'-N months'` would roll March 31 over to March 3.
fn months_before_today(months: u64) -> String {
    format!(
        "min(date('now', 'start of month', '-{m} months', \
         '+' || (CAST(strftime('%d', 'now') AS INTEGER) - 1) || ' days'), \
         date('now', 'start of month', '-{m} months', '+1 months', '-1 days'))",
        m = months
    )
}
