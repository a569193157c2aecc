//! Abstract syntax tree for smart playlist definitions.
//!
//! Expression nodes live in an [`ExprArena`] owned by the [`Playlist`] and
//! refer to their children by [`ExprId`]. Dropping a playlist frees the arena
//! as one flat vector, whatever the shape of the tree.

use std::fmt;
use std::ops::Index;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::token::{Number, Span};

/// Root of the AST: one complete playlist definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    pub title: String,
    pub criteria: ExprId,
    /// A single comparison or time window, possibly negated.
    pub having: Option<ExprId>,
    pub order: Option<OrderSpec>,
    pub limit: Option<u32>,
    pub arena: ExprArena,
}

impl Playlist {
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.arena[id]
    }
}

/// Index of an expression node inside its playlist's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

impl ExprId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExprArena {
    nodes: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(expr);
        id
    }

    pub fn get(&self, id: ExprId) -> Option<&Expr> {
        self.nodes.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Index<ExprId> for ExprArena {
    type Output = Expr;

    fn index(&self, id: ExprId) -> &Expr {
        &self.nodes[id.0 as usize]
    }
}

/// A field name as written by the user, with its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

impl Identifier {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

/// Criteria expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Leaf comparison of a field against a literal.
    Compare {
        field: Identifier,
        op: Comparator,
        value: Value,
    },
    And(ExprId, ExprId),
    Or(ExprId, ExprId),
    Not(ExprId),
    /// Membership in another smart playlist, by title.
    InPlaylist { name: String, span: Span },
    /// `field is in the last N unit`
    TimeWindow {
        field: Identifier,
        amount: u32,
        unit: TimeUnit,
    },
}

/// Comparison operators. The serialized names are the ones used in catalog files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Eq,
    NotEq,
    Contains,
    StartsWith,
    EndsWith,
    Gt,
    Lt,
    Gte,
    Lte,
    /// Relative date window, only produced by `TimeWindow` nodes.
    InLast,
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Comparator::Eq => "is",
            Comparator::NotEq => "is not",
            Comparator::Contains => "contains",
            Comparator::StartsWith => "starts with",
            Comparator::EndsWith => "ends with",
            Comparator::Gt => ">",
            Comparator::Lt => "<",
            Comparator::Gte => ">=",
            Comparator::Lte => "<=",
            Comparator::InLast => "is in the last",
        };
        f.write_str(s)
    }
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Num(Number),
    Date(DateValue),
    Bool(bool),
    /// Unquoted word, e.g. `music` in `media_kind is music`.
    Symbol(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Num(_) => "number",
            Value::Date(_) => "date",
            Value::Bool(_) => "boolean",
            Value::Symbol(_) => "symbol",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Num(n) => write!(f, "{}", n),
            Value::Date(d) => write!(f, "{}", d),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Symbol(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateValue {
    Absolute(NaiveDate),
    Today,
    Yesterday,
    /// `N units ago`
    Ago { amount: u32, unit: TimeUnit },
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateValue::Absolute(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            DateValue::Today => f.write_str("today"),
            DateValue::Yesterday => f.write_str("yesterday"),
            DateValue::Ago { amount, unit } => write!(f, "{} {} ago", amount, unit),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Days,
    Weeks,
    Months,
    Years,
}

impl TimeUnit {
    /// Accepts singular and plural spellings, case-insensitively.
    pub fn parse(word: &str) -> Option<TimeUnit> {
        match word.to_ascii_lowercase().as_str() {
            "day" | "days" => Some(TimeUnit::Days),
            "week" | "weeks" => Some(TimeUnit::Weeks),
            "month" | "months" => Some(TimeUnit::Months),
            "year" | "years" => Some(TimeUnit::Years),
            _ => None,
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeUnit::Days => "days",
            TimeUnit::Weeks => "weeks",
            TimeUnit::Months => "months",
            TimeUnit::Years => "years",
        };
        f.write_str(s)
    }
}

/// `order by` terms, in declared order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub terms: Vec<OrderTerm>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub key: OrderKey,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderKey {
    Field(Identifier),
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}
