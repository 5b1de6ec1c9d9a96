//! Git history walker (spec §4.6): replay the log's past revisions to
//! detect tickets that vanished from the file without a matching
//! `accept`/`reject`/`delete` line — an implicit delete, most often
//! caused by a manual edit or a rebase that dropped lines.

use std::collections::HashSet;
use std::path::Path;

use git2::{DiffFindOptions, Repository, Sort};
use tix_core::{codec, EventLine, TixError};

/// Upper bound on commits walked per history pass (spec §4.6).
const MAX_COMMITS: usize = 512;
/// Upper bound on live ids tracked per snapshot delta (spec §4.6).
const MAX_IDS_PER_DELTA: usize = 256;

/// Which commits to walk when looking for the log's past revisions.
#[derive(Debug, Clone, Default)]
pub enum BranchScope {
    /// Only the currently checked-out branch (`HEAD`).
    #[default]
    Current,
    /// A specific named branch.
    Named(String),
    /// Every local branch.
    All,
}

/// The log's content as of one commit that touched it.
#[derive(Debug, Clone)]
pub struct LogSnapshot {
    /// The commit's hex object id.
    pub commit_id: String,
    /// Commit time, unix seconds.
    pub time: i64,
    /// The log's full line list at this commit.
    pub lines: Vec<String>,
}

fn map_git(context: &str) -> impl Fn(git2::Error) -> TixError + '_ {
    move |e| TixError::Git(format!("{context}: {e}"))
}

/// Open the repository that contains `start_dir`.
///
/// # Errors
/// Returns [`TixError::Git`] if no repository can be discovered.
pub fn discover(start_dir: impl AsRef<Path>) -> Result<Repository, TixError> {
    Repository::discover(start_dir).map_err(map_git("discover repository"))
}

fn starting_oids(repo: &Repository, scope: &BranchScope) -> Result<Vec<git2::Oid>, TixError> {
    match scope {
        BranchScope::Current => {
            let head = repo.head().map_err(map_git("resolve HEAD"))?;
            let oid = head.target().ok_or_else(|| TixError::Git("HEAD has no target".into()))?;
            Ok(vec![oid])
        }
        BranchScope::Named(name) => {
            let branch = repo
                .find_branch(name, git2::BranchType::Local)
                .map_err(map_git(&format!("find branch {name}")))?;
            let oid = branch
                .get()
                .target()
                .ok_or_else(|| TixError::Git(format!("branch {name} has no target")))?;
            Ok(vec![oid])
        }
        BranchScope::All => {
            let mut oids = Vec::new();
            let branches = repo.branches(Some(git2::BranchType::Local)).map_err(map_git("list branches"))?;
            for branch in branches {
                let (branch, _) = branch.map_err(map_git("read branch"))?;
                if let Some(oid) = branch.get().target() {
                    oids.push(oid);
                }
            }
            Ok(oids)
        }
    }
}

/// Read a path's blob content at a given commit, if present.
///
/// # Errors
/// Returns [`TixError::Git`] on any tree/blob lookup failure other
/// than the path not existing.
pub fn read_path_at_commit(
    repo: &Repository,
    commit: &git2::Commit<'_>,
    rel_path: &Path,
) -> Result<Option<String>, TixError> {
    let tree = commit.tree().map_err(map_git("read commit tree"))?;
    let entry = match tree.get_path(rel_path) {
        Ok(entry) => entry,
        Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(TixError::Git(format!("look up {}: {e}", rel_path.display()))),
    };
    let object = entry.to_object(repo).map_err(map_git("resolve tree entry"))?;
    let blob = object.into_blob().map_err(|_| TixError::Git(format!("{} is not a blob", rel_path.display())))?;
    let content = std::str::from_utf8(blob.content())
        .map_err(|e| TixError::Git(format!("{} is not valid UTF-8: {e}", rel_path.display())))?;
    Ok(Some(content.to_owned()))
}

fn touches_path(
    repo: &Repository,
    commit: &git2::Commit<'_>,
    rel_path: &Path,
) -> Result<bool, TixError> {
    let tree = commit.tree().map_err(map_git("read commit tree"))?;
    let parent_tree = commit
        .parent(0)
        .ok()
        .map(|p| p.tree())
        .transpose()
        .map_err(map_git("read parent tree"))?;

    let mut opts = DiffFindOptions::new();
    opts.renames(true);

    let mut diff = repo
        .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)
        .map_err(map_git("diff trees"))?;
    diff.find_similar(Some(&mut opts)).map_err(map_git("find renames"))?;

    let mut touched = false;
    diff.foreach(
        &mut |delta, _| {
            let hits_old = delta.old_file().path().is_some_and(|p| p == rel_path);
            let hits_new = delta.new_file().path().is_some_and(|p| p == rel_path);
            touched = touched || hits_old || hits_new;
            true
        },
        None,
        None,
        None,
    )
    .map_err(map_git("walk diff deltas"))?;
    Ok(touched)
}

/// Walk up to [`MAX_COMMITS`] commits (oldest first) that touch
/// `rel_path`, returning one [`LogSnapshot`] per touching commit.
///
/// # Errors
/// Returns [`TixError::Git`] on any repository access failure.
pub fn walk(repo: &Repository, rel_path: &Path, scope: &BranchScope) -> Result<Vec<LogSnapshot>, TixError> {
    let mut revwalk = repo.revwalk().map_err(map_git("open revwalk"))?;
    revwalk.set_sorting(Sort::TIME | Sort::REVERSE).map_err(map_git("set revwalk sort"))?;
    for oid in starting_oids(repo, scope)? {
        revwalk.push(oid).map_err(map_git("push revwalk start"))?;
    }

    let mut snapshots = Vec::new();
    for oid in revwalk.take(MAX_COMMITS) {
        let oid = oid.map_err(map_git("walk revision"))?;
        let commit = repo.find_commit(oid).map_err(map_git("find commit"))?;
        if !touches_path(repo, &commit, rel_path)? {
            continue;
        }
        let Some(content) = read_path_at_commit(repo, &commit, rel_path)? else {
            continue;
        };
        snapshots.push(LogSnapshot {
            commit_id: oid.to_string(),
            time: commit.time().seconds(),
            lines: content.lines().map(str::to_owned).collect(),
        });
    }
    Ok(snapshots)
}

fn live_ticket_ids(lines: &[String]) -> HashSet<String> {
    let mut ids = HashSet::new();
    for line in lines {
        if ids.len() >= MAX_IDS_PER_DELTA {
            break;
        }
        if let Ok(event) = codec::decode_line(line) {
            match event {
                EventLine::Task(t) | EventLine::Issue(t) | EventLine::Note(t) => {
                    ids.insert(t.id.as_str().to_owned());
                }
                EventLine::Delete(d) => {
                    ids.remove(d.id.as_str());
                }
                EventLine::Accept(_) | EventLine::Reject(_) | EventLine::Other(_) => {}
            }
        }
    }
    ids
}

/// Ids that were live in `before` and are silently absent from
/// `after` without an intervening `accept`/`reject`/`delete` line for
/// them — tickets removed by something other than a tix command.
#[must_use]
pub fn implicit_deletes_between(before: &LogSnapshot, after: &LogSnapshot) -> Vec<String> {
    let before_ids = live_ticket_ids(&before.lines);
    let after_ids = live_ticket_ids(&after.lines);
    let resolved_in_after: HashSet<String> = after
        .lines
        .iter()
        .filter_map(|l| codec::decode_line(l).ok())
        .filter_map(|e| match e {
            EventLine::Accept(a) => Some(a.id),
            EventLine::Reject(r) => Some(r.id),
            EventLine::Delete(d) => Some(d.id),
            _ => None,
        })
        .collect();
    before_ids
        .difference(&after_ids)
        .filter(|id| !resolved_in_after.contains(id.as_str()))
        .cloned()
        .collect()
}

/// Given consecutive snapshots of the log (oldest first), return ids
/// that vanished between any two consecutive snapshots without a
/// matching resolution line, per [`implicit_deletes_between`].
#[must_use]
pub fn implicit_deletes(snapshots: &[LogSnapshot]) -> Vec<String> {
    let mut found = Vec::new();
    for pair in snapshots.windows(2) {
        let [before, after] = pair else { continue };
        found.extend(implicit_deletes_between(before, after));
    }
    found
}
