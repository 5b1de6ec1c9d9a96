//! Static integrity checks over the cache (spec §4.11).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rusqlite::Connection;
use tix_core::{ErrorKind, TicketType, TixError};

use crate::resolve::{self, Resolution};

/// Maximum total ticket visits across the whole dependency-cycle walk
/// (spec §4.11, §5).
const MAX_CYCLE_VISITS: usize = 128;

/// Severity of a [`ValidationIssue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// A structural violation of an invariant.
    Error,
    /// A soft recommendation, not an invariant violation.
    Warning,
}

/// One finding from [`run`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationIssue {
    /// Error or warning.
    pub severity: Severity,
    /// The error taxonomy class this finding belongs to.
    pub kind: ErrorKind,
    /// Human-readable description, naming every offending ticket id.
    pub message: String,
}

fn is_valid_id_format(id: &str) -> bool {
    let Some((prefix, hex)) = id.split_once('-') else {
        return false;
    };
    TicketType::from_prefix(prefix).is_some()
        && !hex.is_empty()
        && hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// Run every static check and return the findings, errors first.
///
/// # Errors
/// Returns [`TixError::Db`] on any underlying query failure.
pub fn run(conn: &Connection) -> Result<Vec<ValidationIssue>, TixError> {
    let mut issues = Vec::new();

    check_done_has_commit(conn, &mut issues)?;
    check_deps(conn, &mut issues)?;
    check_cross_refs(conn, &mut issues)?;
    check_id_formats(conn, &mut issues)?;
    check_cycles(conn, &mut issues)?;
    check_warnings(conn, &mut issues)?;

    issues.sort_by_key(|i| if i.severity == Severity::Error { 0 } else { 1 });
    Ok(issues)
}

fn check_done_has_commit(conn: &Connection, issues: &mut Vec<ValidationIssue>) -> Result<(), TixError> {
    let mut stmt = conn
        .prepare("SELECT id FROM tickets WHERE status = 1 AND (done_at IS NULL OR done_at = '')")
        .map_err(|e| TixError::Db(format!("prepare done-without-commit check: {e}")))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| TixError::Db(format!("run done-without-commit check: {e}")))?;
    for id in rows {
        let id = id.map_err(|e| TixError::Db(format!("read done-without-commit row: {e}")))?;
        issues.push(ValidationIssue {
            severity: Severity::Error,
            kind: ErrorKind::Validation,
            message: format!("ticket {id} is done but has no done_at commit hash"),
        });
    }
    Ok(())
}

fn check_deps(conn: &Connection, issues: &mut Vec<ValidationIssue>) -> Result<(), TixError> {
    let mut stmt = conn
        .prepare(
            "SELECT d.ticket_id, d.dep_id, t.type FROM ticket_deps d
             LEFT JOIN tickets t ON t.id = d.dep_id",
        )
        .map_err(|e| TixError::Db(format!("prepare dep check: {e}")))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, Option<i64>>(2)?))
        })
        .map_err(|e| TixError::Db(format!("run dep check: {e}")))?;
    for row in rows {
        let (ticket_id, dep_id, dep_type) = row.map_err(|e| TixError::Db(format!("read dep row: {e}")))?;
        match dep_type {
            None => issues.push(ValidationIssue {
                severity: Severity::Error,
                kind: ErrorKind::Dependency,
                message: format!("ticket {ticket_id} depends on {dep_id}, which does not exist"),
            }),
            Some(t) if t != TicketType::Task.code() => issues.push(ValidationIssue {
                severity: Severity::Error,
                kind: ErrorKind::Dependency,
                message: format!("ticket {ticket_id} depends on {dep_id}, which is not a task"),
            }),
            Some(_) => {}
        }
    }
    Ok(())
}

fn check_cross_refs(conn: &Connection, issues: &mut Vec<ValidationIssue>) -> Result<(), TixError> {
    for column in ["parent", "created_from", "supersedes"] {
        let sql = format!("SELECT id, {column} FROM tickets WHERE {column} IS NOT NULL");
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| TixError::Db(format!("prepare {column} check: {e}")))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| TixError::Db(format!("run {column} check: {e}")))?;
        for row in rows {
            let (id, target) = row.map_err(|e| TixError::Db(format!("read {column} row: {e}")))?;
            if resolve::resolve(conn, &target)? == Resolution::Broken {
                issues.push(ValidationIssue {
                    severity: Severity::Error,
                    kind: ErrorKind::Dependency,
                    message: format!("ticket {id}'s {column} reference {target} is broken"),
                });
            }
        }
    }
    Ok(())
}

fn check_id_formats(conn: &Connection, issues: &mut Vec<ValidationIssue>) -> Result<(), TixError> {
    let mut stmt = conn
        .prepare("SELECT id FROM tickets")
        .map_err(|e| TixError::Db(format!("prepare id-format check: {e}")))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| TixError::Db(format!("run id-format check: {e}")))?;
    for id in rows {
        let id = id.map_err(|e| TixError::Db(format!("read id-format row: {e}")))?;
        if !is_valid_id_format(&id) {
            issues.push(ValidationIssue {
                severity: Severity::Error,
                kind: ErrorKind::Validation,
                message: format!("ticket id '{id}' does not match ^[tin]-[0-9a-f]+$"),
            });
        }
    }
    Ok(())
}

/// Disjoint-set union over ticket ids, used to merge every id that
/// shares a cycle into one reportable group (spec §8 scenario 3: one
/// finding naming every id on the cycle, not one per root).
#[derive(Default)]
struct Dsu {
    parent: HashMap<String, String>,
}

impl Dsu {
    fn find(&mut self, id: &str) -> String {
        let parent = self.parent.get(id).cloned().unwrap_or_else(|| id.to_owned());
        if parent == id {
            return id.to_owned();
        }
        let root = self.find(&parent);
        self.parent.insert(id.to_owned(), root.clone());
        root
    }

    fn union(&mut self, a: &str, b: &str) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent.insert(ra, rb);
        }
    }
}

fn check_cycles(conn: &Connection, issues: &mut Vec<ValidationIssue>) -> Result<(), TixError> {
    let mut stmt = conn
        .prepare("SELECT id FROM tickets WHERE type = ?1")
        .map_err(|e| TixError::Db(format!("prepare cycle check: {e}")))?;
    let roots: Vec<String> = stmt
        .query_map([TicketType::Task.code()], |row| row.get(0))
        .map_err(|e| TixError::Db(format!("run cycle check: {e}")))?
        .collect::<Result<_, _>>()
        .map_err(|e| TixError::Db(format!("read cycle roots: {e}")))?;

    let mut state: HashMap<String, u8> = HashMap::new();
    let mut dsu = Dsu::default();
    let mut in_cycle: BTreeSet<String> = BTreeSet::new();
    let mut budget = MAX_CYCLE_VISITS;

    for root in &roots {
        if budget == 0 {
            break;
        }
        if state.get(root.as_str()).copied().unwrap_or(0) == 0 {
            let mut path = Vec::new();
            visit_for_cycle(conn, root, &mut state, &mut path, &mut dsu, &mut in_cycle, &mut budget)?;
        }
    }

    let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for id in &in_cycle {
        let root = dsu.find(id);
        groups.entry(root).or_default().insert(id.clone());
    }
    for members in groups.values() {
        let joined = members.iter().cloned().collect::<Vec<_>>().join(", ");
        issues.push(ValidationIssue {
            severity: Severity::Error,
            kind: ErrorKind::Dependency,
            message: format!("dependency cycle detected among {joined}"),
        });
    }
    Ok(())
}

/// DFS with an explicit recursion-stack path, three-colored
/// (unvisited/in-progress/done). When a dep points back at a node
/// still on `path`, every id from that node to the current one is
/// unioned into one cycle group via `dsu`.
#[allow(clippy::too_many_arguments)]
fn visit_for_cycle(
    conn: &Connection,
    node: &str,
    state: &mut HashMap<String, u8>,
    path: &mut Vec<String>,
    dsu: &mut Dsu,
    in_cycle: &mut BTreeSet<String>,
    budget: &mut usize,
) -> Result<(), TixError> {
    if *budget == 0 {
        return Ok(());
    }
    *budget -= 1;
    state.insert(node.to_owned(), 1);
    path.push(node.to_owned());

    for dep in deps_of(conn, node)? {
        match state.get(dep.as_str()).copied().unwrap_or(0) {
            1 => {
                if let Some(pos) = path.iter().position(|n| n == &dep) {
                    for window in path[pos..].windows(2) {
                        dsu.union(&window[0], &window[1]);
                    }
                    in_cycle.extend(path[pos..].iter().cloned());
                }
            }
            0 => {
                if *budget == 0 {
                    break;
                }
                visit_for_cycle(conn, &dep, state, path, dsu, in_cycle, budget)?;
            }
            _ => {}
        }
    }

    path.pop();
    state.insert(node.to_owned(), 2);
    Ok(())
}

fn deps_of(conn: &Connection, id: &str) -> Result<Vec<String>, TixError> {
    let mut stmt = conn
        .prepare("SELECT dep_id FROM ticket_deps WHERE ticket_id = ?1")
        .map_err(|e| TixError::Db(format!("prepare deps_of {id}: {e}")))?;
    let rows = stmt
        .query_map(rusqlite::params![id], |row| row.get(0))
        .map_err(|e| TixError::Db(format!("run deps_of {id}: {e}")))?;
    rows.collect::<Result<_, _>>()
        .map_err(|e| TixError::Db(format!("read deps_of {id}: {e}")))
}

fn check_warnings(conn: &Connection, issues: &mut Vec<ValidationIssue>) -> Result<(), TixError> {
    let mut stmt = conn
        .prepare("SELECT id FROM tickets WHERE name = ''")
        .map_err(|e| TixError::Db(format!("prepare name-warning check: {e}")))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| TixError::Db(format!("run name-warning check: {e}")))?;
    for id in rows {
        let id = id.map_err(|e| TixError::Db(format!("read name-warning row: {e}")))?;
        issues.push(ValidationIssue {
            severity: Severity::Warning,
            kind: ErrorKind::Validation,
            message: format!("ticket {id} has no name"),
        });
    }

    let mut stmt = conn
        .prepare("SELECT id FROM tickets WHERE type = ?1 AND accept = ''")
        .map_err(|e| TixError::Db(format!("prepare accept-warning check: {e}")))?;
    let rows = stmt
        .query_map([TicketType::Task.code()], |row| row.get::<_, String>(0))
        .map_err(|e| TixError::Db(format!("run accept-warning check: {e}")))?;
    for id in rows {
        let id = id.map_err(|e| TixError::Db(format!("read accept-warning row: {e}")))?;
        issues.push(ValidationIssue {
            severity: Severity::Warning,
            kind: ErrorKind::Validation,
            message: format!("task {id} has no acceptance criterion"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::upsert_ticket;
    use crate::Cache;
    use std::collections::BTreeMap;
    use tix_core::{Priority, Status, Ticket, TicketId};

    fn base(id: &str) -> Ticket {
        Ticket {
            id: TicketId::parse(id).unwrap_or_else(|e| panic!("{e}")),
            ticket_type: TicketType::Task,
            status: Status::Pending,
            priority: Priority::None,
            name: "demo".into(),
            spec: None,
            notes: String::new(),
            accept: "works".into(),
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
            meta: BTreeMap::new(),
        }
    }

    #[test]
    fn detects_dep_cycle() {
        let cache = Cache::open_in_memory().unwrap_or_else(|e| panic!("{e}"));
        let mut a = base("t-00000001");
        let mut b = base("t-00000002");
        a.deps = vec![TicketId::parse("t-00000002").unwrap_or_else(|e| panic!("{e}"))];
        b.deps = vec![TicketId::parse("t-00000001").unwrap_or_else(|e| panic!("{e}"))];
        upsert_ticket(cache.connection(), &a).unwrap_or_else(|e| panic!("{e}"));
        upsert_ticket(cache.connection(), &b).unwrap_or_else(|e| panic!("{e}"));

        let issues = run(cache.connection()).unwrap_or_else(|e| panic!("{e}"));
        let cycle_issues: Vec<&ValidationIssue> = issues.iter().filter(|i| i.message.contains("cycle")).collect();
        assert_eq!(cycle_issues.len(), 1, "a 2-ticket mutual cycle must surface as one finding: {cycle_issues:?}");
        assert_eq!(cycle_issues[0].kind, tix_core::ErrorKind::Dependency);
        assert!(cycle_issues[0].message.contains("t-00000001"));
        assert!(cycle_issues[0].message.contains("t-00000002"));
    }

    #[test]
    fn warns_on_task_without_accept() {
        let cache = Cache::open_in_memory().unwrap_or_else(|e| panic!("{e}"));
        let mut t = base("t-00000003");
        t.accept = String::new();
        upsert_ticket(cache.connection(), &t).unwrap_or_else(|e| panic!("{e}"));

        let issues = run(cache.connection()).unwrap_or_else(|e| panic!("{e}"));
        assert!(issues
            .iter()
            .any(|i| i.severity == Severity::Warning && i.message.contains("acceptance criterion")));
    }

    #[test]
    fn clean_cache_has_no_errors() {
        let cache = Cache::open_in_memory().unwrap_or_else(|e| panic!("{e}"));
        let t = base("t-00000004");
        upsert_ticket(cache.connection(), &t).unwrap_or_else(|e| panic!("{e}"));
        let issues = run(cache.connection()).unwrap_or_else(|e| panic!("{e}"));
        assert!(issues.iter().all(|i| i.severity != Severity::Error));
    }

    #[test]
    fn two_independent_cycles_stay_separate_findings() {
        let cache = Cache::open_in_memory().unwrap_or_else(|e| panic!("{e}"));
        let ids = ["t-00000010", "t-00000011", "t-00000012", "t-00000013"];
        let mut a = base(ids[0]);
        let mut b = base(ids[1]);
        let mut c = base(ids[2]);
        let mut d = base(ids[3]);
        a.deps = vec![TicketId::parse(ids[1]).unwrap_or_else(|e| panic!("{e}"))];
        b.deps = vec![TicketId::parse(ids[0]).unwrap_or_else(|e| panic!("{e}"))];
        c.deps = vec![TicketId::parse(ids[3]).unwrap_or_else(|e| panic!("{e}"))];
        d.deps = vec![TicketId::parse(ids[2]).unwrap_or_else(|e| panic!("{e}"))];
        for t in [&a, &b, &c, &d] {
            upsert_ticket(cache.connection(), t).unwrap_or_else(|e| panic!("{e}"));
        }

        let issues = run(cache.connection()).unwrap_or_else(|e| panic!("{e}"));
        let cycle_issues: Vec<&ValidationIssue> = issues.iter().filter(|i| i.message.contains("cycle")).collect();
        assert_eq!(cycle_issues.len(), 2, "two disjoint 2-cycles must stay separate findings: {cycle_issues:?}");
        for issue in &cycle_issues {
            let names_pair_ab = issue.message.contains(ids[0]) && issue.message.contains(ids[1]);
            let names_pair_cd = issue.message.contains(ids[2]) && issue.message.contains(ids[3]);
            assert!(names_pair_ab || names_pair_cd, "finding should name exactly one cycle's ids: {}", issue.message);
            assert!(!(names_pair_ab && names_pair_cd), "finding must not merge unrelated cycles: {}", issue.message);
        }
    }
}
