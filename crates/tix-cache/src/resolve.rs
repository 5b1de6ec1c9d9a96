//! Reference resolver (spec §4.8) and cross-reference denormalization
//! (spec §4.7 step 2).

use rusqlite::{Connection, OptionalExtension, params};
use tix_core::TixError;

/// Classification of a reference target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A live ticket with that id exists.
    Resolved,
    /// No live ticket, but a tombstone with that id exists.
    Stale,
    /// Neither a live ticket nor a tombstone exists.
    Broken,
}

/// Resolve one id against the cache's live ticket set and tombstones.
///
/// # Errors
/// Returns [`TixError::Db`] on any underlying query failure.
pub fn resolve(conn: &Connection, id: &str) -> Result<Resolution, TixError> {
    let exists: bool = conn
        .query_row("SELECT 1 FROM tickets WHERE id = ?1", params![id], |_| Ok(()))
        .optional()
        .map_err(|e| TixError::Db(format!("resolve {id}: {e}")))?
        .is_some();
    if exists {
        return Ok(Resolution::Resolved);
    }
    let tombstoned: bool = conn
        .query_row("SELECT 1 FROM tombstones WHERE id = ?1", params![id], |_| Ok(()))
        .optional()
        .map_err(|e| TixError::Db(format!("resolve {id}: {e}")))?
        .is_some();
    Ok(if tombstoned { Resolution::Stale } else { Resolution::Broken })
}

fn target_name(conn: &Connection, id: &str) -> Result<Option<String>, TixError> {
    if let Some(name) = conn
        .query_row("SELECT name FROM tickets WHERE id = ?1", params![id], |r| r.get(0))
        .optional()
        .map_err(|e| TixError::Db(format!("lookup name for {id}: {e}")))?
    {
        return Ok(Some(name));
    }
    conn.query_row("SELECT name FROM tombstones WHERE id = ?1", params![id], |r| r.get(0))
        .optional()
        .map_err(|e| TixError::Db(format!("lookup tombstone name for {id}: {e}")))
}

fn target_kill_reason(conn: &Connection, id: &str) -> Result<Option<String>, TixError> {
    conn.query_row("SELECT kill_reason FROM tickets WHERE id = ?1", params![id], |r| r.get(0))
        .optional()
        .map_err(|e| TixError::Db(format!("lookup kill_reason for {id}: {e}")))
}

/// Copy `created_from`'s name, and `supersedes`'s name and
/// `kill_reason`, onto every ticket whose denormalized columns are
/// still empty. Idempotent: a ticket with an already-populated
/// denormalized column is left untouched.
///
/// # Errors
/// Returns [`TixError::Db`] on any underlying query failure.
pub fn denormalize(conn: &Connection) -> Result<usize, TixError> {
    let mut updated = 0usize;

    let created_from_targets: Vec<(String, String)> = {
        let mut stmt = conn
            .prepare(
                "SELECT id, created_from FROM tickets
                 WHERE created_from IS NOT NULL AND created_from_name = ''",
            )
            .map_err(|e| TixError::Db(format!("query created_from candidates: {e}")))?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| TixError::Db(format!("read created_from candidates: {e}")))?
            .collect::<Result<_, _>>()
            .map_err(|e| TixError::Db(format!("collect created_from candidates: {e}")))?
    };
    for (id, target) in created_from_targets {
        if let Some(name) = target_name(conn, &target)? {
            conn.execute(
                "UPDATE tickets SET created_from_name = ?2 WHERE id = ?1",
                params![id, name],
            )
            .map_err(|e| TixError::Db(format!("denormalize created_from for {id}: {e}")))?;
            updated += 1;
        }
    }

    let supersedes_targets: Vec<(String, String)> = {
        let mut stmt = conn
            .prepare(
                "SELECT id, supersedes FROM tickets
                 WHERE supersedes IS NOT NULL AND supersedes_name = ''",
            )
            .map_err(|e| TixError::Db(format!("query supersedes candidates: {e}")))?;
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| TixError::Db(format!("read supersedes candidates: {e}")))?
            .collect::<Result<_, _>>()
            .map_err(|e| TixError::Db(format!("collect supersedes candidates: {e}")))?
    };
    for (id, target) in supersedes_targets {
        let name = target_name(conn, &target)?;
        let kill_reason = target_kill_reason(conn, &target)?;
        if name.is_some() || kill_reason.is_some() {
            conn.execute(
                "UPDATE tickets SET
                    supersedes_name = COALESCE(?2, supersedes_name),
                    supersedes_reason = COALESCE(?3, supersedes_reason)
                 WHERE id = ?1",
                params![id, name, kill_reason],
            )
            .map_err(|e| TixError::Db(format!("denormalize supersedes for {id}: {e}")))?;
            updated += 1;
        }
    }

    Ok(updated)
}
