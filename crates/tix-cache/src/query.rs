//! Read-side reconstruction of typed [`Ticket`] rows from the cache.
//!
//! The projector (`project.rs`) only ever writes; compaction and the
//! façade's `tree`/`log` inspections need the reverse direction, so
//! this module rebuilds a [`Ticket`] (with its dep/label/meta side
//! tables) from a `tickets` row.

use rusqlite::{Connection, OptionalExtension, Row, params};
use tix_core::{MetaValue, Priority, Status, Ticket, TicketId, TicketType, Tombstone, TixError};

fn deps_of(conn: &Connection, id: &str) -> Result<Vec<TicketId>, TixError> {
    let mut stmt = conn
        .prepare("SELECT dep_id FROM ticket_deps WHERE ticket_id = ?1 ORDER BY dep_id")
        .map_err(|e| TixError::Db(format!("prepare deps for {id}: {e}")))?;
    let rows = stmt
        .query_map(params![id], |row| row.get::<_, String>(0))
        .map_err(|e| TixError::Db(format!("run deps for {id}: {e}")))?;
    rows.map(|r| {
        let raw = r.map_err(|e| TixError::Db(format!("read dep for {id}: {e}")))?;
        TicketId::parse(&raw)
    })
    .collect()
}

fn labels_of(conn: &Connection, id: &str) -> Result<Vec<String>, TixError> {
    let mut stmt = conn
        .prepare("SELECT label FROM ticket_labels WHERE ticket_id = ?1 ORDER BY label")
        .map_err(|e| TixError::Db(format!("prepare labels for {id}: {e}")))?;
    let rows = stmt
        .query_map(params![id], |row| row.get(0))
        .map_err(|e| TixError::Db(format!("run labels for {id}: {e}")))?;
    rows.collect::<Result<_, _>>().map_err(|e| TixError::Db(format!("read labels for {id}: {e}")))
}

fn meta_of(conn: &Connection, id: &str) -> Result<std::collections::BTreeMap<String, MetaValue>, TixError> {
    let mut stmt = conn
        .prepare("SELECT key, value_text, value_num FROM ticket_meta WHERE ticket_id = ?1")
        .map_err(|e| TixError::Db(format!("prepare meta for {id}: {e}")))?;
    let rows = stmt
        .query_map(params![id], |row| {
            let key: String = row.get(0)?;
            let text: Option<String> = row.get(1)?;
            let num: Option<f64> = row.get(2)?;
            Ok((key, text, num))
        })
        .map_err(|e| TixError::Db(format!("run meta for {id}: {e}")))?;
    let mut map = std::collections::BTreeMap::new();
    for row in rows {
        let (key, text, num) = row.map_err(|e| TixError::Db(format!("read meta for {id}: {e}")))?;
        let value = match (text, num) {
            (Some(t), _) => MetaValue::Text(t),
            (None, Some(n)) => MetaValue::Num(n),
            (None, None) => continue,
        };
        map.insert(key, value);
    }
    Ok(map)
}

fn ticket_from_row(conn: &Connection, row: &Row<'_>) -> rusqlite::Result<Ticket> {
    let id_str: String = row.get("id")?;
    let type_code: i64 = row.get("type")?;
    let status_code: i64 = row.get("status")?;
    let priority_code: i64 = row.get("priority")?;
    let parent: Option<String> = row.get("parent")?;
    let created_from: Option<String> = row.get("created_from")?;
    let supersedes: Option<String> = row.get("supersedes")?;

    let id = TicketId::parse(&id_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;
    let ticket_type = TicketType::from_code(type_code)
        .ok_or_else(|| rusqlite::Error::IntegralValueOutOfRange(1, type_code))?;
    let status = Status::from_code(status_code)
        .ok_or_else(|| rusqlite::Error::IntegralValueOutOfRange(2, status_code))?;
    let priority = Priority::from_code(priority_code)
        .ok_or_else(|| rusqlite::Error::IntegralValueOutOfRange(3, priority_code))?;

    let parse_ref = |s: Option<String>| -> rusqlite::Result<Option<TicketId>> {
        s.map(|v| {
            TicketId::parse(&v)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
        })
        .transpose()
    };

    Ok(Ticket {
        deps: deps_of(conn, &id_str).unwrap_or_default(),
        labels: labels_of(conn, &id_str).unwrap_or_default(),
        meta: meta_of(conn, &id_str).unwrap_or_default(),
        id,
        ticket_type,
        status,
        priority,
        name: row.get("name")?,
        spec: row.get("spec")?,
        notes: row.get("notes")?,
        accept: row.get("accept")?,
        done_at: row.get("done_at")?,
        branch: row.get("branch")?,
        parent: parse_ref(parent)?,
        created_from: parse_ref(created_from)?,
        supersedes: parse_ref(supersedes)?,
        created_from_name: row.get("created_from_name")?,
        supersedes_name: row.get("supersedes_name")?,
        supersedes_reason: row.get("supersedes_reason")?,
        kill_reason: row.get("kill_reason")?,
        author: row.get("author")?,
        completed_at: row.get("completed_at")?,
        cost: row.get("cost")?,
        tokens_in: row.get("tokens_in")?,
        tokens_out: row.get("tokens_out")?,
        iterations: row.get("iterations")?,
        model: row.get("model")?,
        retries: row.get("retries")?,
        kill_count: row.get("kill_count")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        resolved_at: row.get("resolved_at")?,
        compacted_at: row.get("compacted_at")?,
    })
}

const SELECT_TICKET: &str = "SELECT id, type, status, priority, name, spec, notes, accept, done_at, branch,
     parent, created_from, supersedes, kill_reason, created_from_name, supersedes_name,
     supersedes_reason, author, completed_at, cost, tokens_in, tokens_out, iterations,
     model, retries, kill_count, created_at, updated_at, resolved_at, compacted_at
     FROM tickets";

/// Load one ticket by id, with its deps/labels/meta populated.
///
/// # Errors
/// Returns [`TixError::Db`] on any underlying query failure.
pub fn load_ticket(conn: &Connection, id: &str) -> Result<Option<Ticket>, TixError> {
    conn.query_row(&format!("{SELECT_TICKET} WHERE id = ?1"), params![id], |row| ticket_from_row(conn, row))
        .optional()
        .map_err(|e| TixError::Db(format!("load ticket {id}: {e}")))
}

/// List every ticket whose `status` column is one of `codes`, ordered
/// by id. Used by compaction to rebuild the canonical live set.
///
/// # Errors
/// Returns [`TixError::Db`] on any underlying query failure.
pub fn list_by_status(conn: &Connection, codes: &[i64]) -> Result<Vec<Ticket>, TixError> {
    let placeholders = codes.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!("{SELECT_TICKET} WHERE status IN ({placeholders}) ORDER BY id");
    let mut stmt = sql_prepare(conn, &sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(codes.iter()), |row| ticket_from_row(conn, row))
        .map_err(|e| TixError::Db(format!("run list_by_status: {e}")))?;
    rows.collect::<Result<_, _>>().map_err(|e| TixError::Db(format!("read list_by_status rows: {e}")))
}

fn sql_prepare<'c>(conn: &'c Connection, sql: &str) -> Result<rusqlite::Statement<'c>, TixError> {
    conn.prepare(sql).map_err(|e| TixError::Db(format!("prepare query: {e}")))
}

/// Load the tombstone for a resolved ticket id, if one exists.
///
/// # Errors
/// Returns [`TixError::Db`] on any underlying query failure.
pub fn load_tombstone(conn: &Connection, id: &str) -> Result<Option<Tombstone>, TixError> {
    conn.query_row(
        "SELECT id, done_at, reason, name, is_accept, timestamp FROM tombstones WHERE id = ?1",
        params![id],
        |row| {
            Ok(Tombstone {
                id: TicketId::parse(&row.get::<_, String>(0)?).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
                })?,
                done_at: row.get(1)?,
                reason: row.get(2)?,
                name: row.get(3)?,
                is_accept: row.get::<_, i64>(4)? != 0,
                timestamp: row.get(5)?,
            })
        },
    )
    .optional()
    .map_err(|e| TixError::Db(format!("load tombstone {id}: {e}")))
}
