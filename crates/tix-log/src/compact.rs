//! Compaction (spec §4.7): sync, denormalize cross-refs, stamp
//! `compacted_at`, then rewrite the log in canonical form, preserving
//! any resolution that has not yet reached git HEAD.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::params;
use tix_core::{codec, DeleteEvent, EventLine, Status, TixError};

use crate::history::{self, BranchScope};
use crate::store::EventLog;
use crate::sync;

/// The six discriminators the codec/projector own. Any other `t`
/// value is preserved verbatim across a rewrite (spec §3.3, §4.2).
const OWNED_DISCRIMINATORS: &[&str] = &["task", "issue", "note", "accept", "reject", "delete"];

fn is_owned_line(line: &str) -> bool {
    codec::peek_discriminator(line).is_ok_and(|t| OWNED_DISCRIMINATORS.contains(&t.as_str()))
}

/// Ids referenced by an `accept`/`reject`/`delete` line, or by an
/// owned ticket line whose status is already terminal, within
/// `lines` — i.e. ids considered "resolved in this copy of the log".
fn resolved_ids(lines: &[String]) -> HashSet<String> {
    let mut ids = HashSet::new();
    for line in lines {
        let Ok(event) = codec::decode_line(line) else { continue };
        match event {
            EventLine::Accept(e) => {
                ids.insert(e.id);
            }
            EventLine::Reject(e) => {
                ids.insert(e.id);
            }
            EventLine::Delete(e) => {
                ids.insert(e.id);
            }
            EventLine::Task(t) | EventLine::Issue(t) | EventLine::Note(t) if t.status.is_terminal() => {
                ids.insert(t.id.as_str().to_owned());
            }
            _ => {}
        }
    }
    ids
}

/// The log's content at git HEAD, or an empty set of lines if the
/// path does not exist there (a brand new, never-committed log).
fn committed_lines(repo_root: &Path, log_path: &Path) -> Result<Vec<String>, TixError> {
    let repo = history::discover(repo_root)?;
    let head = repo
        .head()
        .map_err(|e| TixError::Git(format!("resolve HEAD: {e}")))?
        .peel_to_commit()
        .map_err(|e| TixError::Git(format!("peel HEAD to commit: {e}")))?;
    let rel_path = log_path.strip_prefix(repo_root).unwrap_or(log_path);
    match history::read_path_at_commit(&repo, &head, rel_path)? {
        Some(content) => Ok(content.lines().map(str::to_owned).collect()),
        None => Ok(Vec::new()),
    }
}

/// Run the full compaction pipeline against `log_path` (a `plan.jsonl`
/// under `repo_root`), using `cache` as scratch space for sync and
/// denormalization.
///
/// # Errors
/// Returns [`TixError::Git`], [`TixError::Db`], [`TixError::Parse`],
/// or [`TixError::Io`] depending on where the pipeline fails.
pub fn compact(
    cache: &mut tix_cache::Cache,
    repo_root: &Path,
    log_path: &Path,
    scope: &BranchScope,
    now: i64,
) -> Result<(), TixError> {
    sync::sync(cache, repo_root, log_path, scope, now)?;
    tix_cache::resolve::denormalize(cache.connection())?;

    let committed = committed_lines(repo_root, log_path)?;
    let already_resolved_at_head = resolved_ids(&committed);

    let terminal = tix_cache::query::list_by_status(
        cache.connection(),
        &[Status::Accepted.code(), Status::Rejected.code(), Status::Deleted.code()],
    )?;
    let protected_ids: HashSet<String> = terminal
        .iter()
        .filter(|t| !already_resolved_at_head.contains(t.id.as_str()))
        .map(|t| t.id.as_str().to_owned())
        .collect();

    for ticket in &terminal {
        if ticket.compacted_at == 0 && !protected_ids.contains(ticket.id.as_str()) {
            cache
                .connection()
                .execute(
                    "UPDATE tickets SET compacted_at = ?2 WHERE id = ?1",
                    params![ticket.id.as_str(), now],
                )
                .map_err(|e| TixError::Db(format!("stamp compacted_at for {}: {e}", ticket.id)))?;
        }
    }

    let log = EventLog::new(log_path);
    let current_lines = log.read_lines()?;
    let preserved: Vec<String> = current_lines.into_iter().filter(|l| !l.trim().is_empty() && !is_owned_line(l)).collect();

    let live = tix_cache::query::list_by_status(
        cache.connection(),
        &[Status::Pending.code(), Status::Done.code()],
    )?;
    let mut canonical: Vec<String> = live.iter().map(codec::encode_ticket).collect();

    for id in &protected_ids {
        let Some(ticket) = tix_cache::query::load_ticket(cache.connection(), id)? else { continue };
        canonical.push(codec::encode_ticket(&ticket));
        match tix_cache::query::load_tombstone(cache.connection(), id)? {
            Some(tombstone) => canonical.push(codec::encode_line(&tombstone_to_event(&tombstone))),
            None if ticket.status == Status::Deleted => {
                canonical.push(codec::encode_line(&EventLine::Delete(DeleteEvent {
                    id: ticket.id.as_str().to_owned(),
                    timestamp: ticket.resolved_at,
                })));
            }
            None => {}
        }
    }

    log.rewrite(&preserved, &canonical)?;
    Ok(())
}

fn tombstone_to_event(t: &tix_core::Tombstone) -> EventLine {
    if t.is_accept {
        EventLine::Accept(tix_core::AcceptEvent {
            id: t.id.as_str().to_owned(),
            done_at: t.done_at.clone(),
            timestamp: t.timestamp,
        })
    } else {
        EventLine::Reject(tix_core::RejectEvent {
            id: t.id.as_str().to_owned(),
            reason: t.reason.clone(),
            timestamp: t.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn init_repo_with_log(dir: &Path, content: &str) -> (git2::Repository, std::path::PathBuf) {
        let repo = git2::Repository::init(dir).expect("init repo");
        let plan_path = dir.join("plan.jsonl");
        fs::write(&plan_path, content).expect("write plan");
        let mut index = repo.index().expect("index");
        index.add_path(Path::new("plan.jsonl")).expect("add");
        index.write().expect("write index");
        let tree_oid = index.write_tree().expect("write tree");
        let tree = repo.find_tree(tree_oid).expect("find tree");
        let sig = git2::Signature::now("tester", "tester@example.invalid").expect("sig");
        repo.commit(Some("HEAD"), &sig, &sig, "commit plan", &tree, &[]).expect("commit");
        (repo, plan_path)
    }

    #[test]
    fn preserves_orchestrator_lines_and_sorts_live_tickets_by_id() {
        let dir = tempdir().expect("tempdir");
        let content = "{\"t\":\"spec\",\"path\":\"docs/a.md\"}\n\
             {\"t\":\"task\",\"id\":\"t-00000002\",\"name\":\"b\",\"created_at\":1,\"updated_at\":1}\n\
             {\"t\":\"task\",\"id\":\"t-00000001\",\"name\":\"a\",\"created_at\":1,\"updated_at\":1}\n";
        let (_repo, plan_path) = init_repo_with_log(dir.path(), content);

        let mut cache = tix_cache::Cache::open_in_memory().expect("open cache");
        compact(&mut cache, dir.path(), &plan_path, &BranchScope::Current, 100).expect("compact");

        let log = EventLog::new(&plan_path);
        let lines = log.read_lines().expect("read lines");
        assert!(lines[0].contains("\"spec\""), "preserved line should come first: {lines:?}");
        let a_pos = lines.iter().position(|l| l.contains("t-00000001")).expect("a present");
        let b_pos = lines.iter().position(|l| l.contains("t-00000002")).expect("b present");
        assert!(a_pos < b_pos, "live tickets must be sorted by id");
    }

    #[test]
    fn protects_uncommitted_resolution() {
        let dir = tempdir().expect("tempdir");
        let content = "{\"t\":\"task\",\"id\":\"t-00000001\",\"name\":\"a\",\"created_at\":1,\"updated_at\":1}\n";
        let (_repo, plan_path) = init_repo_with_log(dir.path(), content);

        // Working tree now has the task accepted, but HEAD does not.
        fs::write(
            &plan_path,
            format!(
                "{content}{{\"t\":\"accept\",\"id\":\"t-00000001\",\"done_at\":\"abc123\",\"timestamp\":50}}\n"
            ),
        )
        .expect("write accept");

        let mut cache = tix_cache::Cache::open_in_memory().expect("open cache");
        compact(&mut cache, dir.path(), &plan_path, &BranchScope::Current, 100).expect("compact");

        let log = EventLog::new(&plan_path);
        let lines = log.read_lines().expect("read lines");
        assert!(lines.iter().any(|l| l.contains("t-00000001") && l.contains("\"task\"")));
        assert!(lines.iter().any(|l| l.contains("\"accept\"")));
    }
}
