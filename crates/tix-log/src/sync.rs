//! Sync (spec §4.6 second half): replay every historical snapshot of
//! the log into the cache, stamping `compacted_at` on implicit
//! deletes, then replay the working-tree copy on top.

use std::path::Path;

use git2::Repository;
use rusqlite::{params, Connection};
use tix_core::{codec, TixError};

use crate::history::{self, BranchScope, LogSnapshot};
use crate::store::EventLog;

const META_LAST_COMMIT: &str = "last_commit";

fn replay_snapshot(conn: &Connection, snapshot: &LogSnapshot, now: i64) -> Result<(), TixError> {
    for line in &snapshot.lines {
        if line.trim().is_empty() {
            continue;
        }
        let event = codec::decode_line(line)?;
        tix_cache::project::apply(conn, &event, now)?;
    }
    Ok(())
}

fn stamp_compacted_at(conn: &Connection, id: &str, stamp: i64) -> Result<(), TixError> {
    conn.execute(
        "UPDATE tickets SET compacted_at = ?2 WHERE id = ?1 AND compacted_at = 0",
        params![id, stamp],
    )
    .map_err(|e| TixError::Db(format!("stamp compacted_at for {id}: {e}")))?;
    Ok(())
}

/// Rebuild the cache across the full commit history of `log_path`
/// (relative to the repository root), then replay the working-tree
/// copy of the file on top.
///
/// # Errors
/// Returns [`TixError::Git`] on repository access failure or
/// [`TixError::Db`]/[`TixError::Parse`] on projection failure.
pub fn sync(cache: &mut tix_cache::Cache, repo_root: &Path, log_path: &Path, scope: &BranchScope, now: i64) -> Result<(), TixError> {
    let repo = history::discover(repo_root)?;
    let rel_path = log_path.strip_prefix(repo_root).unwrap_or(log_path);

    let snapshots = history::walk(&repo, rel_path, scope)?;
    cache.clear_projection()?;
    {
        let tx = cache.transaction()?;
        for snapshot in &snapshots {
            replay_snapshot(&tx, snapshot, now)?;
        }
        for pair in snapshots.windows(2) {
            let [before, after] = pair else { continue };
            for id in history::implicit_deletes_between(before, after) {
                stamp_compacted_at(&tx, &id, after.time)?;
            }
        }
        tx.commit().map_err(|e| TixError::Db(format!("commit sync: {e}")))?;
    }

    let log = EventLog::new(log_path);
    let working_lines = log.read_lines()?;
    {
        let tx = cache.transaction()?;
        for line in &working_lines {
            if line.trim().is_empty() {
                continue;
            }
            let event = codec::decode_line(line)?;
            tix_cache::project::apply(&tx, &event, now)?;
        }
        tx.commit().map_err(|e| TixError::Db(format!("commit working-tree replay: {e}")))?;
    }

    if let Some(last) = snapshots.last() {
        cache.set_meta(META_LAST_COMMIT, &last.commit_id)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn sync_replays_history_then_working_tree() {
        let dir = tempdir().expect("tempdir");
        let repo = Repository::init(dir.path()).expect("init repo");
        let plan_path = dir.path().join("plan.jsonl");

        fs::write(&plan_path, "{\"t\":\"task\",\"id\":\"t-00000001\",\"created_at\":1,\"updated_at\":1}\n").expect("write");
        let mut index = repo.index().expect("index");
        index.add_path(Path::new("plan.jsonl")).expect("add");
        index.write().expect("write index");
        let tree_oid = index.write_tree().expect("write tree");
        let tree = repo.find_tree(tree_oid).expect("find tree");
        let sig = git2::Signature::now("tester", "tester@example.invalid").expect("sig");
        repo.commit(Some("HEAD"), &sig, &sig, "add ticket", &tree, &[]).expect("commit");

        fs::write(
            &plan_path,
            "{\"t\":\"task\",\"id\":\"t-00000001\",\"created_at\":1,\"updated_at\":2}\n{\"t\":\"task\",\"id\":\"t-00000002\",\"created_at\":2,\"updated_at\":2}\n",
        )
        .expect("write working copy");

        let mut cache = tix_cache::Cache::open_in_memory().expect("open cache");
        sync(&mut cache, dir.path(), &plan_path, &BranchScope::Current, 100).expect("sync");

        let count: i64 = cache
            .connection()
            .query_row("SELECT COUNT(*) FROM tickets", [], |r| r.get(0))
            .expect("count");
        assert_eq!(count, 2);
    }
}
