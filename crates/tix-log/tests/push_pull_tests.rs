#![allow(missing_docs)]

use std::fs;
use std::path::Path;

use tix_log::{compact, sync, BranchScope, EventLog};

fn commit_file(repo: &git2::Repository, rel_path: &Path, content: &str, msg: &str) {
    let workdir = repo.workdir().expect("non-bare repo");
    fs::write(workdir.join(rel_path), content).expect("write file");
    let mut index = repo.index().expect("index");
    index.add_path(rel_path).expect("add path");
    index.write().expect("write index");
    let tree_oid = index.write_tree().expect("write tree");
    let tree = repo.find_tree(tree_oid).expect("find tree");
    let sig = git2::Signature::now("tester", "tester@example.invalid").expect("signature");
    let parents: Vec<git2::Commit<'_>> =
        repo.head().ok().and_then(|h| h.peel_to_commit().ok()).into_iter().collect();
    let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &parent_refs).expect("commit");
}

#[test]
fn sync_detects_implicit_delete_across_two_commits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = git2::Repository::init(dir.path()).expect("init repo");
    let rel = Path::new("plan.jsonl");

    commit_file(
        &repo,
        rel,
        "{\"t\":\"task\",\"id\":\"t-aaaaaaaa\",\"name\":\"a\",\"created_at\":1,\"updated_at\":1}\n",
        "add ticket",
    );
    // commit N+1 drops the ticket without any accept/reject/delete line.
    commit_file(&repo, rel, "", "drop ticket silently");

    let mut cache = tix_cache::Cache::open_in_memory().expect("open cache");
    let plan_path = dir.path().join("plan.jsonl");
    sync::sync(&mut cache, dir.path(), &plan_path, &BranchScope::Current, 100).expect("sync");

    let compacted_at: i64 = cache
        .connection()
        .query_row(
            "SELECT compacted_at FROM tickets WHERE id = 't-aaaaaaaa'",
            [],
            |row| row.get(0),
        )
        .expect("ticket row");
    assert!(compacted_at > 0, "implicit delete across snapshots should stamp compacted_at");
}

#[test]
fn compact_followed_by_sync_is_a_no_op_on_live_set() {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = git2::Repository::init(dir.path()).expect("init repo");
    let rel = Path::new("plan.jsonl");
    commit_file(
        &repo,
        rel,
        "{\"t\":\"task\",\"id\":\"t-00000001\",\"name\":\"a\",\"created_at\":1,\"updated_at\":1}\n\
         {\"t\":\"task\",\"id\":\"t-00000002\",\"name\":\"b\",\"created_at\":1,\"updated_at\":1}\n",
        "add tickets",
    );

    let plan_path = dir.path().join("plan.jsonl");
    let mut cache = tix_cache::Cache::open_in_memory().expect("open cache");
    compact::compact(&mut cache, dir.path(), &plan_path, &BranchScope::Current, 50).expect("compact");

    let before: i64 = cache
        .connection()
        .query_row("SELECT COUNT(*) FROM tickets WHERE status IN (0, 1)", [], |row| row.get(0))
        .expect("count before");

    let log = EventLog::new(&plan_path);
    let lines = log.read_lines().expect("read lines");
    assert_eq!(lines.len(), 2, "compact of an all-live log should not drop lines: {lines:?}");

    sync::sync(&mut cache, dir.path(), &plan_path, &BranchScope::Current, 60).expect("second sync");
    let after: i64 = cache
        .connection()
        .query_row("SELECT COUNT(*) FROM tickets WHERE status IN (0, 1)", [], |row| row.get(0))
        .expect("count after");
    assert_eq!(before, after);
}
