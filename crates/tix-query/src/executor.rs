//! Runs a compiled TQL pipeline, or the `sql` escape hatch, against
//! the cache and emits rows as JSON (spec §4.10).

use rusqlite::types::ValueRef;
use rusqlite::{Connection, Statement, ToSql};
use serde_json::{Map, Value};
use tix_core::TixError;

use crate::compiler::Compiled;

fn value_to_json(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

fn rows_to_json(
    stmt: &mut Statement<'_>,
    params: &[&dyn ToSql],
    column_names: &[String],
) -> Result<Vec<Value>, TixError> {
    let mut rows = stmt.query(params).map_err(|e| TixError::Db(format!("run query: {e}")))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| TixError::Db(format!("fetch row: {e}")))? {
        let mut obj = Map::with_capacity(column_names.len());
        for (i, name) in column_names.iter().enumerate() {
            let value = row.get_ref(i).map_err(|e| TixError::Db(format!("read column `{name}`: {e}")))?;
            obj.insert(name.clone(), value_to_json(value));
        }
        out.push(Value::Object(obj));
    }
    Ok(out)
}

/// Run a compiled pipeline and return its rows as a JSON array of
/// objects, one key per output column/alias.
///
/// # Errors
/// Returns [`TixError::Db`] if SQLite rejects the prepared statement
/// or a row read fails.
pub fn run(conn: &Connection, compiled: &Compiled) -> Result<Vec<Value>, TixError> {
    let mut stmt = conn.prepare(&compiled.sql).map_err(|e| TixError::Db(format!("prepare TQL query: {e}")))?;
    let params: Vec<&dyn ToSql> = compiled.binds.iter().map(|b| b as &dyn ToSql).collect();
    rows_to_json(&mut stmt, &params, &compiled.columns)
}

/// The `sql` escape hatch: run an operator-provided SQL string with no
/// bind parameters and emit its rows as JSON, column names taken from
/// the prepared statement itself.
///
/// # Errors
/// Returns [`TixError::Db`] if SQLite rejects the statement or a row
/// read fails.
pub fn run_raw_sql(conn: &Connection, sql: &str) -> Result<Vec<Value>, TixError> {
    let mut stmt = conn.prepare(sql).map_err(|e| TixError::Db(format!("prepare sql: {e}")))?;
    let column_names: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
    rows_to_json(&mut stmt, &[], &column_names)
}
