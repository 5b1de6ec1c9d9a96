//! Report generator (spec §4.14): aggregate counts, velocity, actors,
//! and models from the cache.

use std::collections::BTreeMap;

use rusqlite::Connection;
use tix_core::TixError;

use crate::resolve::{self, Resolution};

/// Counts of broken references, by which column they were found in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrokenRefCounts {
    /// Broken `deps` entries.
    pub deps: i64,
    /// Broken `parent` references.
    pub parent: i64,
    /// Broken `created_from` references.
    pub created_from: i64,
    /// Broken `supersedes` references.
    pub supersedes: i64,
}

/// Aggregate statistics over the current cache state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    /// Live ticket counts keyed by status wire tag.
    pub by_status: BTreeMap<String, i64>,
    /// Live ticket counts keyed by type wire tag.
    pub by_type: BTreeMap<String, i64>,
    /// Number of tickets resolved (status >= accepted) at or after `since`.
    pub resolved_since: i64,
    /// Resolved-ticket counts keyed by `author` (unattributed tickets
    /// are omitted).
    pub by_actor: BTreeMap<String, i64>,
    /// Resolved-ticket counts keyed by `model` (unattributed tickets
    /// are omitted).
    pub by_model: BTreeMap<String, i64>,
    /// Reference-resolution health, per the resolver of spec §4.8.
    pub broken_refs: BrokenRefCounts,
}

/// Build a [`Report`] from the current cache state. `since` bounds
/// the velocity count (unix seconds); pass `0` for "all time".
///
/// # Errors
/// Returns [`TixError::Db`] on any underlying query failure.
pub fn generate(conn: &Connection, since: i64) -> Result<Report, TixError> {
    let mut report = Report::default();

    let mut stmt = conn
        .prepare("SELECT status, COUNT(*) FROM tickets GROUP BY status")
        .map_err(|e| TixError::Db(format!("prepare status counts: {e}")))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))
        .map_err(|e| TixError::Db(format!("run status counts: {e}")))?;
    for row in rows {
        let (code, count) = row.map_err(|e| TixError::Db(format!("read status count: {e}")))?;
        if let Some(status) = tix_core::Status::from_code(code) {
            report.by_status.insert(status.wire_tag().to_owned(), count);
        }
    }

    let mut stmt = conn
        .prepare("SELECT type, COUNT(*) FROM tickets GROUP BY type")
        .map_err(|e| TixError::Db(format!("prepare type counts: {e}")))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))
        .map_err(|e| TixError::Db(format!("run type counts: {e}")))?;
    for row in rows {
        let (code, count) = row.map_err(|e| TixError::Db(format!("read type count: {e}")))?;
        if let Some(ty) = tix_core::TicketType::from_code(code) {
            report.by_type.insert(ty.wire_tag().to_owned(), count);
        }
    }

    report.resolved_since = conn
        .query_row(
            "SELECT COUNT(*) FROM tickets WHERE resolved_at >= ?1 AND resolved_at > 0",
            [since],
            |row| row.get(0),
        )
        .map_err(|e| TixError::Db(format!("count resolved since {since}: {e}")))?;

    let mut stmt = conn
        .prepare("SELECT author, COUNT(*) FROM tickets WHERE author IS NOT NULL AND resolved_at > 0 GROUP BY author")
        .map_err(|e| TixError::Db(format!("prepare actor counts: {e}")))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(|e| TixError::Db(format!("run actor counts: {e}")))?;
    for row in rows {
        let (actor, count) = row.map_err(|e| TixError::Db(format!("read actor count: {e}")))?;
        report.by_actor.insert(actor, count);
    }

    let mut stmt = conn
        .prepare("SELECT model, COUNT(*) FROM tickets WHERE model IS NOT NULL AND resolved_at > 0 GROUP BY model")
        .map_err(|e| TixError::Db(format!("prepare model counts: {e}")))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(|e| TixError::Db(format!("run model counts: {e}")))?;
    for row in rows {
        let (model, count) = row.map_err(|e| TixError::Db(format!("read model count: {e}")))?;
        report.by_model.insert(model, count);
    }

    report.broken_refs = count_broken_refs(conn)?;

    Ok(report)
}

fn count_broken_refs(conn: &Connection) -> Result<BrokenRefCounts, TixError> {
    let mut counts = BrokenRefCounts::default();

    let mut stmt = conn
        .prepare("SELECT dep_id FROM ticket_deps")
        .map_err(|e| TixError::Db(format!("prepare dep scan: {e}")))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| TixError::Db(format!("run dep scan: {e}")))?;
    for dep in rows {
        let dep = dep.map_err(|e| TixError::Db(format!("read dep: {e}")))?;
        if resolve::resolve(conn, &dep)? == Resolution::Broken {
            counts.deps += 1;
        }
    }

    for (column, field) in [
        ("parent", &mut counts.parent),
        ("created_from", &mut counts.created_from),
        ("supersedes", &mut counts.supersedes),
    ] {
        let sql = format!("SELECT {column} FROM tickets WHERE {column} IS NOT NULL");
        let mut stmt = conn.prepare(&sql).map_err(|e| TixError::Db(format!("prepare {column} scan: {e}")))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| TixError::Db(format!("run {column} scan: {e}")))?;
        for target in rows {
            let target = target.map_err(|e| TixError::Db(format!("read {column}: {e}")))?;
            if resolve::resolve(conn, &target)? == Resolution::Broken {
                *field += 1;
            }
        }
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::upsert_ticket;
    use crate::Cache;
    use std::collections::BTreeMap as Map;
    use tix_core::{Priority, Status, Ticket, TicketId, TicketType};

    #[test]
    fn aggregates_status_and_type_counts() {
        let cache = Cache::open_in_memory().unwrap_or_else(|e| panic!("{e}"));
        let t = Ticket {
            id: TicketId::parse("t-00000001").unwrap_or_else(|e| panic!("{e}")),
            ticket_type: TicketType::Task,
            status: Status::Pending,
            priority: Priority::None,
            name: "demo".into(),
            spec: None,
            notes: String::new(),
            accept: String::new(),
            done_at: None,
            branch: None,
            parent: None,
            created_from: None,
            supersedes: None,
            deps: Vec::new(),
            created_from_name: String::new(),
            supersedes_name: String::new(),
            supersedes_reason: String::new(),
            kill_reason: String::new(),
            labels: Vec::new(),
            author: None,
            completed_at: None,
            cost: None,
            tokens_in: None,
            tokens_out: None,
            iterations: None,
            model: None,
            retries: None,
            kill_count: None,
            created_at: 1,
            updated_at: 1,
            resolved_at: 0,
            compacted_at: 0,
            meta: Map::new(),
        };
        upsert_ticket(cache.connection(), &t).unwrap_or_else(|e| panic!("{e}"));

        let report = generate(cache.connection(), 0).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(report.by_status.get("p"), Some(&1));
        assert_eq!(report.by_type.get("task"), Some(&1));
        assert_eq!(report.resolved_since, 0);
    }
}
