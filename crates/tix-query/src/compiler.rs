//! Compiles a [`Pipeline`] AST into parameterized SQL against the
//! cache schema (spec §4.10).

use std::collections::HashMap;

use tix_core::{Priority, Status, TicketType, TixError};

use crate::types::{AggregateKind, CompareOp, Filter, FilterValue, Pipeline, SqlValue, MAX_META_JOINS};

/// Ticket columns a filter/select/sort/group may address directly.
const TICKET_COLUMNS: &[&str] = &[
    "id",
    "type",
    "status",
    "priority",
    "name",
    "spec",
    "notes",
    "accept",
    "done_at",
    "branch",
    "parent",
    "created_from",
    "supersedes",
    "kill_reason",
    "created_from_name",
    "supersedes_name",
    "supersedes_reason",
    "author",
    "completed_at",
    "cost",
    "tokens_in",
    "tokens_out",
    "iterations",
    "model",
    "retries",
    "kill_count",
    "created_at",
    "updated_at",
    "resolved_at",
    "compacted_at",
];

/// Columns a row query without an explicit `select` stage returns.
const DEFAULT_PROJECTION: &[&str] = TICKET_COLUMNS;

/// Compiled SQL buffer bound (spec §5 resource bounds).
const MAX_SQL_LEN: usize = 4096;
/// Bind-list bound (spec §5 resource bounds).
const MAX_BINDS: usize = 48;

/// A compiled query: SQL text, its parallel bind list, and the output
/// column/alias names in emission order.
#[derive(Debug, Clone)]
pub struct Compiled {
    /// The parameterized SQL text.
    pub sql: String,
    /// Bind values, in the order their `?` placeholders appear.
    pub binds: Vec<SqlValue>,
    /// Output column or alias names, in `SELECT` order.
    pub columns: Vec<String>,
}

/// Accumulates joins discovered while compiling filters/having clauses.
/// Joins always precede `WHERE`/`HAVING` textually, so their binds are
/// kept in a separate list and prepended to the final bind vector
/// regardless of which stage triggered the join.
struct Ctx {
    joins: Vec<String>,
    join_binds: Vec<SqlValue>,
    meta_aliases: HashMap<String, String>,
}

impl Ctx {
    fn meta_alias(&mut self, key: &str) -> Result<String, TixError> {
        if let Some(alias) = self.meta_aliases.get(key) {
            return Ok(alias.clone());
        }
        if self.meta_aliases.len() >= MAX_META_JOINS {
            return Err(TixError::Overflow(format!("query joins more than {MAX_META_JOINS} meta keys")));
        }
        let alias = format!("m{}", self.meta_aliases.len());
        self.joins.push(format!("LEFT JOIN ticket_meta {alias} ON {alias}.ticket_id = t.id AND {alias}.key = ?"));
        self.join_binds.push(SqlValue::Text(key.to_owned()));
        self.meta_aliases.insert(key.to_owned(), alias.clone());
        Ok(alias)
    }
}

fn column_expr(field: &str) -> Result<String, TixError> {
    if TICKET_COLUMNS.contains(&field) {
        Ok(format!("t.{field}"))
    } else {
        Err(TixError::Parse(format!("unknown field `{field}`")))
    }
}

fn enum_sugar(field: &str, raw: &str) -> Option<i64> {
    match field {
        "status" => Status::from_tql_token(raw).map(Status::code),
        "type" => TicketType::from_tql_token(raw).map(TicketType::code),
        "priority" => Priority::from_tql_token(raw).map(Priority::code),
        _ => None,
    }
}

fn literal_bind(field: &str, raw: &str) -> SqlValue {
    if let Some(code) = enum_sugar(field, raw) {
        return SqlValue::Int(code);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return SqlValue::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return SqlValue::Real(f);
    }
    SqlValue::Text(raw.to_owned())
}

fn like_pattern(raw: &str) -> String {
    raw.replace('*', "%").replace('?', "_")
}

fn sql_op(op: CompareOp, negate: bool) -> &'static str {
    match (op, negate) {
        (CompareOp::Eq, false) | (CompareOp::NotEq, true) => "=",
        (CompareOp::NotEq, false) | (CompareOp::Eq, true) => "!=",
        (CompareOp::Gt, false) | (CompareOp::Le, true) => ">",
        (CompareOp::Lt, false) | (CompareOp::Ge, true) => "<",
        (CompareOp::Ge, false) | (CompareOp::Lt, true) => ">=",
        (CompareOp::Le, false) | (CompareOp::Gt, true) => "<=",
        (CompareOp::Like, false) => "LIKE",
        (CompareOp::Like, true) => "NOT LIKE",
    }
}

fn compile_label_filter(ctx: &mut Ctx, binds: &mut Vec<SqlValue>, filter: &Filter) -> Result<Option<String>, TixError> {
    if filter.op != CompareOp::Eq {
        return Err(TixError::Parse("`label` only supports `=` (optionally negated with `!`)".into()));
    }
    let FilterValue::Single(label) = &filter.value else {
        return Err(TixError::Parse("`label` requires a single value".into()));
    };
    if filter.negate {
        binds.push(SqlValue::Text(label.clone()));
        Ok(Some("NOT EXISTS (SELECT 1 FROM ticket_labels tl WHERE tl.ticket_id = t.id AND tl.label = ?)".to_owned()))
    } else {
        let alias = format!("tl{}", ctx.joins.len());
        ctx.joins.push(format!("INNER JOIN ticket_labels {alias} ON {alias}.ticket_id = t.id AND {alias}.label = ?"));
        ctx.join_binds.push(SqlValue::Text(label.clone()));
        Ok(None)
    }
}

/// Compile one [`Filter`] into a SQL predicate, pushing its binds into
/// `binds` (either the where-clause or having-clause bind list). A
/// positive `label` filter resolves entirely via `ctx.joins` and
/// returns `Ok(None)`: it needs no predicate of its own.
fn compile_predicate(ctx: &mut Ctx, binds: &mut Vec<SqlValue>, filter: &Filter) -> Result<Option<String>, TixError> {
    if filter.field == "label" {
        return compile_label_filter(ctx, binds, filter);
    }

    let expr = if let Some(key) = filter.field.strip_prefix("meta.") {
        let alias = ctx.meta_alias(key)?;
        format!("COALESCE({alias}.value_text, CAST({alias}.value_num AS TEXT))")
    } else {
        column_expr(&filter.field)?
    };

    match (&filter.value, filter.op) {
        (FilterValue::Null, CompareOp::Eq | CompareOp::NotEq) => {
            let want_null = matches!(filter.op, CompareOp::Eq) != filter.negate;
            Ok(Some(format!("{expr} IS {}NULL", if want_null { "" } else { "NOT " })))
        }
        (FilterValue::List(items), CompareOp::Eq | CompareOp::NotEq) => {
            let want_in = matches!(filter.op, CompareOp::Eq) != filter.negate;
            let placeholders = items.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            for item in items {
                binds.push(literal_bind(&filter.field, item));
            }
            Ok(Some(format!("{expr} {}IN ({placeholders})", if want_in { "" } else { "NOT " })))
        }
        (FilterValue::Single(raw), op) => {
            binds.push(if matches!(op, CompareOp::Like) {
                SqlValue::Text(like_pattern(raw))
            } else {
                literal_bind(&filter.field, raw)
            });
            Ok(Some(format!("{expr} {} ?", sql_op(op, filter.negate))))
        }
        (FilterValue::List(_), _) => {
            Err(TixError::Parse(format!("field `{}` does not support a comma-separated value", filter.field)))
        }
        (FilterValue::Null, _) => {
            Err(TixError::Parse(format!("field `{}` only supports an empty value with `=`/`!=`", filter.field)))
        }
    }
}

fn select_aggregates(pipeline: &Pipeline) -> Result<(String, Vec<String>), TixError> {
    let mut parts = Vec::new();
    let mut columns = Vec::new();
    if let Some(group) = &pipeline.group {
        parts.push(format!("{} AS {group}", column_expr(group)?));
        columns.push(group.clone());
    }
    for agg in &pipeline.aggregates {
        let alias = agg.alias();
        let expr = match agg {
            AggregateKind::Count => "COUNT(*)".to_owned(),
            AggregateKind::CountDistinct(f) => format!("COUNT(DISTINCT {})", column_expr(f)?),
            AggregateKind::Sum(f) => format!("SUM({})", column_expr(f)?),
            AggregateKind::Avg(f) => format!("AVG({})", column_expr(f)?),
            AggregateKind::Min(f) => format!("MIN({})", column_expr(f)?),
            AggregateKind::Max(f) => format!("MAX({})", column_expr(f)?),
        };
        parts.push(format!("{expr} AS {alias}"));
        columns.push(alias);
    }
    Ok((parts.join(", "), columns))
}

fn select_columns(pipeline: &Pipeline) -> Result<(String, Vec<String>), TixError> {
    let fields: Vec<String> =
        if pipeline.select.is_empty() { DEFAULT_PROJECTION.iter().map(|s| (*s).to_owned()).collect() } else { pipeline.select.clone() };
    let mut parts = Vec::with_capacity(fields.len());
    for field in &fields {
        parts.push(format!("{} AS {field}", column_expr(field)?));
    }
    Ok((parts.join(", "), fields))
}

/// Compile a parsed [`Pipeline`] into parameterized SQL.
///
/// # Errors
/// Returns [`TixError::Parse`] on an unknown field or a `having` stage
/// with no `group`/aggregate, or [`TixError::Overflow`] if the
/// compiled SQL or bind list exceeds its bound.
pub fn compile(pipeline: &Pipeline) -> Result<Compiled, TixError> {
    let mut ctx = Ctx { joins: Vec::new(), join_binds: Vec::new(), meta_aliases: HashMap::new() };
    let mut where_binds = Vec::new();
    let mut wheres = Vec::new();

    if let Some(code) = pipeline.source.type_code() {
        wheres.push("t.type = ?".to_owned());
        where_binds.push(SqlValue::Int(code));
    }
    if !pipeline.explicit_status && !pipeline.all_scope {
        wheres.push("t.status < ?".to_owned());
        where_binds.push(SqlValue::Int(Status::Accepted.code()));
    }
    for filter in &pipeline.filters {
        if let Some(pred) = compile_predicate(&mut ctx, &mut where_binds, filter)? {
            wheres.push(pred);
        }
    }

    let (select_clause, columns) =
        if pipeline.aggregates.is_empty() { select_columns(pipeline)? } else { select_aggregates(pipeline)? };

    let mut sql = String::from("SELECT ");
    if pipeline.distinct && pipeline.aggregates.is_empty() {
        sql.push_str("DISTINCT ");
    }
    sql.push_str(&select_clause);
    sql.push_str(" FROM tickets t");
    for join in &ctx.joins {
        sql.push(' ');
        sql.push_str(join);
    }
    if !wheres.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&wheres.join(" AND "));
    }
    if let Some(group) = &pipeline.group {
        sql.push_str(&format!(" GROUP BY {}", column_expr(group)?));
    }

    let mut having_binds = Vec::new();
    if !pipeline.having.is_empty() {
        if pipeline.group.is_none() && pipeline.aggregates.is_empty() {
            return Err(TixError::Parse("`having` requires a `group` or aggregate stage".into()));
        }
        let mut having_parts = Vec::new();
        for filter in &pipeline.having {
            if let Some(pred) = compile_predicate(&mut ctx, &mut having_binds, filter)? {
                having_parts.push(pred);
            }
        }
        if !having_parts.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&having_parts.join(" AND "));
        }
    }

    if !pipeline.sort.is_empty() {
        let mut parts = Vec::with_capacity(pipeline.sort.len());
        for key in &pipeline.sort {
            parts.push(format!("{} {}", column_expr(&key.field)?, if key.desc { "DESC" } else { "ASC" }));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&parts.join(", "));
    }
    if let Some(limit) = pipeline.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = pipeline.offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }

    if sql.len() > MAX_SQL_LEN {
        return Err(TixError::Overflow(format!("compiled SQL exceeds {MAX_SQL_LEN} bytes")));
    }

    let mut binds = ctx.join_binds;
    binds.extend(where_binds);
    binds.extend(having_binds);
    if binds.len() > MAX_BINDS {
        return Err(TixError::Overflow(format!("query exceeds {MAX_BINDS} bind values")));
    }

    Ok(Compiled { sql, binds, columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn compile_str(query: &str) -> Compiled {
        let pipeline = parse(query).unwrap_or_else(|e| panic!("{e}"));
        compile(&pipeline).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn scenario_four_enum_and_label_join() {
        let compiled = compile_str("tasks | status=pending priority=high | label=blocked | limit 5");
        assert!(compiled.sql.contains("INNER JOIN ticket_labels tl"));
        assert!(compiled.sql.contains("LIMIT 5"));
        assert!(compiled.binds.contains(&SqlValue::Int(3)), "priority=high should bind code 3: {:?}", compiled.binds);
    }

    #[test]
    fn default_scope_hides_resolved_work_unless_all() {
        let compiled = compile_str("tickets");
        assert!(compiled.sql.contains("t.status < ?"));
        let compiled_all = compile_str("tickets | all");
        assert!(!compiled_all.sql.contains("t.status"));
    }

    #[test]
    fn explicit_status_filter_suppresses_default_scope() {
        let compiled = compile_str("tickets | status=accepted");
        assert_eq!(compiled.sql.matches("t.status").count(), 1);
    }

    #[test]
    fn negated_label_uses_not_exists() {
        let compiled = compile_str("tickets | !label=blocked");
        assert!(compiled.sql.contains("NOT EXISTS"));
        assert!(!compiled.sql.contains("JOIN ticket_labels"));
    }

    #[test]
    fn meta_filter_joins_once_per_key() {
        let compiled = compile_str("tickets | meta.area=infra meta.area=backend");
        assert_eq!(compiled.sql.matches("LEFT JOIN ticket_meta").count(), 1);
    }

    #[test]
    fn aggregate_query_groups_and_aliases() {
        let compiled = compile_str("tickets | group status | count");
        assert!(compiled.sql.contains("GROUP BY t.status"));
        assert!(compiled.columns.contains(&"count".to_owned()));
    }

    #[test]
    fn having_without_group_or_aggregate_errors() {
        let pipeline = parse("tickets | having status=pending").unwrap_or_else(|e| panic!("{e}"));
        assert!(compile(&pipeline).is_err());
    }

    #[test]
    fn comma_value_compiles_to_in_clause() {
        let compiled = compile_str("tickets | status=pending,done | all");
        assert!(compiled.sql.contains("IN (?, ?)"));
    }

    #[test]
    fn like_operator_translates_globs() {
        let compiled = compile_str(r#"tickets | name~"release-*""#);
        assert!(compiled.sql.contains("LIKE"));
        assert_eq!(compiled.binds.last(), Some(&SqlValue::Text("release-%".to_owned())));
    }
}
