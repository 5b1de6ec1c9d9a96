//! TQL abstract syntax (spec §4.10).
//!
//! The parser builds one of these from a query string; the compiler
//! turns it into SQL. Every `Vec` here is bounded at push time so a
//! pathological query fails fast instead of growing an unbounded plan.

use rusqlite::types::{ToSql, ToSqlOutput};
use tix_core::TixError;

/// Maximum number of filter clauses across all filter-list stages.
pub const MAX_FILTERS: usize = 16;
/// Maximum number of fields in a `select` stage.
pub const MAX_SELECTS: usize = 16;
/// Maximum number of fields in a `sort` stage.
pub const MAX_SORTS: usize = 4;
/// Maximum number of aggregate stages in one pipeline.
pub const MAX_AGGREGATES: usize = 8;
/// Maximum number of clauses in a `having` stage.
pub const MAX_HAVINGS: usize = 8;
/// Maximum number of distinct `meta.` keys joined by one query.
pub const MAX_META_JOINS: usize = 8;

/// The ticket subset a query runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// `type = task` only.
    Tasks,
    /// `type = issue` only.
    Issues,
    /// `type = note` only.
    Notes,
    /// Every ticket type, no implicit type filter.
    Tickets,
}

impl Source {
    /// Resolve a source token (the first `|`-segment of a query).
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "tasks" => Some(Self::Tasks),
            "issues" => Some(Self::Issues),
            "notes" => Some(Self::Notes),
            "tickets" => Some(Self::Tickets),
            _ => None,
        }
    }

    /// The implicit `type` column filter this source adds, if any.
    #[must_use]
    pub const fn type_code(self) -> Option<i64> {
        match self {
            Self::Tasks => Some(0),
            Self::Issues => Some(1),
            Self::Notes => Some(2),
            Self::Tickets => None,
        }
    }
}

/// A filter/having comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `~` (LIKE, with `*`/`?` glob translation)
    Like,
}

impl CompareOp {
    /// Match the longest operator token at the start of `s`, returning
    /// it with its byte length so the caller can advance past it.
    /// Longer tokens (`!=`, `>=`, `<=`) must be tried before their
    /// single-character prefixes.
    #[must_use]
    pub fn from_prefix(s: &str) -> Option<(Self, usize)> {
        const TOKENS: &[(&str, CompareOp)] = &[
            ("!=", CompareOp::NotEq),
            (">=", CompareOp::Ge),
            ("<=", CompareOp::Le),
            ("=", CompareOp::Eq),
            (">", CompareOp::Gt),
            ("<", CompareOp::Lt),
            ("~", CompareOp::Like),
        ];
        TOKENS.iter().find(|(tok, _)| s.starts_with(tok)).map(|(tok, op)| (*op, tok.len()))
    }
}

/// The right-hand side of a filter, before enum-sugar/type coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Empty value: `IS NULL` / `IS NOT NULL`.
    Null,
    /// A single bareword or quoted literal.
    Single(String),
    /// A comma-separated value: `IN` / `NOT IN`.
    List(Vec<String>),
}

/// One `field op value` clause, optionally negated by a `!` prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    /// Field name: a ticket column, `label`, or `meta.<key>`.
    pub field: String,
    /// `!` prefix seen before the field name.
    pub negate: bool,
    /// The comparison operator.
    pub op: CompareOp,
    /// The parsed right-hand side.
    pub value: FilterValue,
}

/// A `sort` stage entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    /// Field to order by.
    pub field: String,
    /// `true` for `desc`, `false` for the default `asc`.
    pub desc: bool,
}

/// An aggregate stage (`count`, `sum <field>`, …).
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateKind {
    /// `count`
    Count,
    /// `count_distinct <field>`
    CountDistinct(String),
    /// `sum <field>`
    Sum(String),
    /// `avg <field>`
    Avg(String),
    /// `min <field>`
    Min(String),
    /// `max <field>`
    Max(String),
}

impl AggregateKind {
    /// The JSON/SQL output alias for this aggregate.
    #[must_use]
    pub fn alias(&self) -> String {
        match self {
            Self::Count => "count".to_owned(),
            Self::CountDistinct(f) => format!("count_distinct_{f}"),
            Self::Sum(f) => format!("sum_{f}"),
            Self::Avg(f) => format!("avg_{f}"),
            Self::Min(f) => format!("min_{f}"),
            Self::Max(f) => format!("max_{f}"),
        }
    }
}

/// A parsed, bound-checked TQL pipeline, ready for [`crate::compile`].
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// The source named in the first `|`-segment.
    pub source: Source,
    /// Every filter clause across all filter-list stages.
    pub filters: Vec<Filter>,
    /// `select` fields; empty means the default ticket projection.
    pub select: Vec<String>,
    /// `group` field, if any.
    pub group: Option<String>,
    /// Whether a `distinct` stage was seen.
    pub distinct: bool,
    /// `having` clauses.
    pub having: Vec<Filter>,
    /// Aggregate stages, in the order they were written.
    pub aggregates: Vec<AggregateKind>,
    /// `sort` fields.
    pub sort: Vec<SortKey>,
    /// `limit` stage value.
    pub limit: Option<i64>,
    /// `offset` stage value.
    pub offset: Option<i64>,
    /// The `all` modifier was seen: skip the default `status < accepted` scope.
    pub all_scope: bool,
    /// An explicit `status` filter was seen: also skips the default scope.
    pub explicit_status: bool,
}

impl Pipeline {
    /// Start a new, empty pipeline over `source`.
    #[must_use]
    pub const fn new(source: Source) -> Self {
        Self {
            source,
            filters: Vec::new(),
            select: Vec::new(),
            group: None,
            distinct: false,
            having: Vec::new(),
            aggregates: Vec::new(),
            sort: Vec::new(),
            limit: None,
            offset: None,
            all_scope: false,
            explicit_status: false,
        }
    }

    /// Append a filter clause, enforcing [`MAX_FILTERS`].
    ///
    /// # Errors
    /// Returns [`TixError::Overflow`] past the bound.
    pub fn push_filter(&mut self, filter: Filter) -> Result<(), TixError> {
        if self.filters.len() >= MAX_FILTERS {
            return Err(TixError::Overflow(format!("query has more than {MAX_FILTERS} filters")));
        }
        if filter.field == "status" {
            self.explicit_status = true;
        }
        self.filters.push(filter);
        Ok(())
    }

    /// Append a `having` clause, enforcing [`MAX_HAVINGS`].
    ///
    /// # Errors
    /// Returns [`TixError::Overflow`] past the bound.
    pub fn push_having(&mut self, filter: Filter) -> Result<(), TixError> {
        if self.having.len() >= MAX_HAVINGS {
            return Err(TixError::Overflow(format!("query has more than {MAX_HAVINGS} having clauses")));
        }
        self.having.push(filter);
        Ok(())
    }

    /// Append a `select` field, enforcing [`MAX_SELECTS`].
    ///
    /// # Errors
    /// Returns [`TixError::Overflow`] past the bound.
    pub fn push_select(&mut self, field: String) -> Result<(), TixError> {
        if self.select.len() >= MAX_SELECTS {
            return Err(TixError::Overflow(format!("query selects more than {MAX_SELECTS} fields")));
        }
        self.select.push(field);
        Ok(())
    }

    /// Append a `sort` key, enforcing [`MAX_SORTS`].
    ///
    /// # Errors
    /// Returns [`TixError::Overflow`] past the bound.
    pub fn push_sort(&mut self, key: SortKey) -> Result<(), TixError> {
        if self.sort.len() >= MAX_SORTS {
            return Err(TixError::Overflow(format!("query sorts by more than {MAX_SORTS} fields")));
        }
        self.sort.push(key);
        Ok(())
    }

    /// Append an aggregate stage, enforcing [`MAX_AGGREGATES`].
    ///
    /// # Errors
    /// Returns [`TixError::Overflow`] past the bound.
    pub fn push_aggregate(&mut self, kind: AggregateKind) -> Result<(), TixError> {
        if self.aggregates.len() >= MAX_AGGREGATES {
            return Err(TixError::Overflow(format!("query has more than {MAX_AGGREGATES} aggregates")));
        }
        self.aggregates.push(kind);
        Ok(())
    }
}

/// A single bind value, tagged by SQLite storage class, matching the
/// "parallel list of bind values tagged by kind" the compiler spec
/// calls for.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// `INTEGER`
    Int(i64),
    /// `REAL`
    Real(f64),
    /// `TEXT`
    Text(String),
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Int(i) => Ok(ToSqlOutput::from(*i)),
            Self::Real(r) => Ok(ToSqlOutput::from(*r)),
            Self::Text(s) => Ok(ToSqlOutput::from(s.as_str())),
        }
    }
}
