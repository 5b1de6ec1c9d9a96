//! Cache projector (spec §4.4): apply one decoded event line to the
//! cache, idempotently.

use rusqlite::{Connection, params};
use tix_core::{EventLine, Ticket, TixError};

use crate::search;

/// Apply a single decoded event line to the cache inside a
/// transaction already owned by the caller (so a batch of lines, or
/// a whole log replay, commits atomically).
///
/// # Errors
/// Returns [`TixError::Db`] on any underlying query failure.
pub fn apply(conn: &Connection, line: &EventLine, now: i64) -> Result<(), TixError> {
    match line {
        EventLine::Task(t) | EventLine::Issue(t) | EventLine::Note(t) => upsert_ticket(conn, t),
        EventLine::Accept(e) => apply_accept(conn, &e.id, e.done_at.as_deref(), e.timestamp, now),
        EventLine::Reject(e) => apply_reject(conn, &e.id, &e.reason, e.timestamp),
        EventLine::Delete(e) => apply_delete(conn, &e.id, now),
        EventLine::Other(_) => Ok(()),
    }
}

/// Upsert a ticket row plus its dep/label/meta side tables. Last
/// write wins; a re-application with identical data is a no-op
/// modulo `updated_at`.
///
/// # Errors
/// Returns [`TixError::Db`] on any underlying query failure.
pub fn upsert_ticket(conn: &Connection, ticket: &Ticket) -> Result<(), TixError> {
    let db_err = |e: rusqlite::Error| TixError::Db(format!("upsert ticket {}: {e}", ticket.id));

    conn.execute(
        "INSERT INTO tickets (
            id, type, status, priority, name, spec, notes, accept, done_at, branch,
            parent, created_from, supersedes, kill_reason, created_from_name,
            supersedes_name, supersedes_reason, author, completed_at, cost,
            tokens_in, tokens_out, iterations, model, retries, kill_count,
            created_at, updated_at, resolved_at, compacted_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
            ?11, ?12, ?13, ?14, ?15,
            ?16, ?17, ?18, ?19, ?20,
            ?21, ?22, ?23, ?24, ?25, ?26,
            ?27, ?28, ?29, ?30
        )
        ON CONFLICT(id) DO UPDATE SET
            type = excluded.type, status = excluded.status, priority = excluded.priority,
            name = excluded.name, spec = excluded.spec, notes = excluded.notes,
            accept = excluded.accept, done_at = excluded.done_at, branch = excluded.branch,
            parent = excluded.parent, created_from = excluded.created_from,
            supersedes = excluded.supersedes, kill_reason = excluded.kill_reason,
            created_from_name = excluded.created_from_name,
            supersedes_name = excluded.supersedes_name,
            supersedes_reason = excluded.supersedes_reason,
            author = excluded.author, completed_at = excluded.completed_at,
            cost = excluded.cost, tokens_in = excluded.tokens_in,
            tokens_out = excluded.tokens_out, iterations = excluded.iterations,
            model = excluded.model, retries = excluded.retries,
            kill_count = excluded.kill_count, created_at = excluded.created_at,
            updated_at = excluded.updated_at, resolved_at = excluded.resolved_at,
            compacted_at = excluded.compacted_at",
        params![
            ticket.id.as_str(),
            ticket.ticket_type.code(),
            ticket.status.code(),
            ticket.priority.code(),
            ticket.name,
            ticket.spec,
            ticket.notes,
            ticket.accept,
            ticket.done_at,
            ticket.branch,
            ticket.parent.as_ref().map(tix_core::TicketId::as_str),
            ticket.created_from.as_ref().map(tix_core::TicketId::as_str),
            ticket.supersedes.as_ref().map(tix_core::TicketId::as_str),
            ticket.kill_reason,
            ticket.created_from_name,
            ticket.supersedes_name,
            ticket.supersedes_reason,
            ticket.author,
            ticket.completed_at,
            ticket.cost,
            ticket.tokens_in,
            ticket.tokens_out,
            ticket.iterations,
            ticket.model,
            ticket.retries,
            ticket.kill_count,
            ticket.created_at,
            ticket.updated_at,
            ticket.resolved_at,
            ticket.compacted_at,
        ],
    )
    .map_err(db_err)?;

    conn.execute("DELETE FROM ticket_deps WHERE ticket_id = ?1", params![ticket.id.as_str()])
        .map_err(db_err)?;
    for dep in &ticket.deps {
        conn.execute(
            "INSERT OR IGNORE INTO ticket_deps (ticket_id, dep_id) VALUES (?1, ?2)",
            params![ticket.id.as_str(), dep.as_str()],
        )
        .map_err(db_err)?;
    }

    conn.execute("DELETE FROM ticket_labels WHERE ticket_id = ?1", params![ticket.id.as_str()])
        .map_err(db_err)?;
    for label in &ticket.labels {
        conn.execute(
            "INSERT OR IGNORE INTO ticket_labels (ticket_id, label) VALUES (?1, ?2)",
            params![ticket.id.as_str(), label],
        )
        .map_err(db_err)?;
    }

    conn.execute("DELETE FROM ticket_meta WHERE ticket_id = ?1", params![ticket.id.as_str()])
        .map_err(db_err)?;
    for (key, value) in &ticket.meta {
        let (text, num) = match value {
            tix_core::MetaValue::Text(t) => (Some(t.as_str()), None),
            tix_core::MetaValue::Num(n) => (None, Some(*n)),
        };
        conn.execute(
            "INSERT INTO ticket_meta (ticket_id, key, value_text, value_num) VALUES (?1, ?2, ?3, ?4)",
            params![ticket.id.as_str(), key, text, num],
        )
        .map_err(db_err)?;
    }

    search::index_ticket(conn, ticket)?;

    Ok(())
}

/// `accept`: resolve a done task.
///
/// # Errors
/// Returns [`TixError::Db`] on any underlying query failure.
pub fn apply_accept(conn: &Connection, id: &str, done_at: Option<&str>, timestamp: i64, now: i64) -> Result<(), TixError> {
    let db_err = |e: rusqlite::Error| TixError::Db(format!("accept {id}: {e}"));
    conn.execute(
        "INSERT INTO tombstones (id, done_at, reason, name, is_accept, timestamp)
         SELECT ?1, ?2, '', name, 1, ?3 FROM tickets WHERE id = ?1
         ON CONFLICT(id) DO UPDATE SET done_at = excluded.done_at, is_accept = 1, timestamp = excluded.timestamp",
        params![id, done_at, timestamp],
    )
    .map_err(db_err)?;
    conn.execute(
        "UPDATE tickets SET status = ?2, resolved_at = ?3, updated_at = ?3 WHERE id = ?1",
        params![id, tix_core::Status::Accepted.code(), now],
    )
    .map_err(db_err)?;
    Ok(())
}

/// `reject`: return a task to pending.
///
/// # Errors
/// Returns [`TixError::Db`] on any underlying query failure.
pub fn apply_reject(conn: &Connection, id: &str, reason: &str, timestamp: i64) -> Result<(), TixError> {
    let db_err = |e: rusqlite::Error| TixError::Db(format!("reject {id}: {e}"));
    conn.execute(
        "INSERT INTO tombstones (id, done_at, reason, name, is_accept, timestamp)
         SELECT ?1, NULL, ?2, name, 0, ?3 FROM tickets WHERE id = ?1
         ON CONFLICT(id) DO UPDATE SET reason = excluded.reason, is_accept = 0, timestamp = excluded.timestamp",
        params![id, reason, timestamp],
    )
    .map_err(db_err)?;
    conn.execute(
        "UPDATE tickets SET status = ?2, done_at = NULL, resolved_at = 0, updated_at = ?3 WHERE id = ?1",
        params![id, tix_core::Status::Pending.code(), timestamp],
    )
    .map_err(db_err)?;
    Ok(())
}

/// `delete`: mark a ticket deleted. The row is retained, not
/// physically removed, so history replay can stamp `compacted_at`
/// later.
///
/// # Errors
/// Returns [`TixError::Db`] on any underlying query failure.
pub fn apply_delete(conn: &Connection, id: &str, now: i64) -> Result<(), TixError> {
    conn.execute(
        "UPDATE tickets SET status = ?2, resolved_at = ?3, updated_at = ?3 WHERE id = ?1",
        params![id, tix_core::Status::Deleted.code(), now],
    )
    .map_err(|e| TixError::Db(format!("delete {id}: {e}")))?;
    Ok(())
}
