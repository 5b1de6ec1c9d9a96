//! Staleness detection and rebuild (spec §4.5).
//!
//! The cache records the log's last-seen `mtime`/`size` in the `meta`
//! table. Before any read, a caller compares those against the
//! current file and, on divergence, takes a transactional write that
//! clears every projected row and replays the log additively.

use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;

use tix_core::{codec, TixError};

use crate::project;
use crate::Cache;

const META_MTIME: &str = "plan_mtime";
const META_SIZE: &str = "plan_size";

/// The log's mtime (unix seconds) and byte size at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanStat {
    /// Modification time, unix seconds.
    pub mtime: i64,
    /// File size in bytes.
    pub size: u64,
}

/// Stat the log file. A missing file is treated as an empty,
/// zero-mtime log (a fresh repository with no events yet).
///
/// # Errors
/// Returns [`TixError::Io`] if the file exists but cannot be stat'd.
pub fn stat_log(path: &Path) -> Result<PlanStat, TixError> {
    match fs::metadata(path) {
        Ok(meta) => {
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
            Ok(PlanStat { mtime, size: meta.len() })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PlanStat { mtime: 0, size: 0 }),
        Err(e) => Err(TixError::Io(e)),
    }
}

/// Compare the log's current stat against what the cache last
/// recorded. Returns `Some(current_stat)` when the cache is stale
/// (including when it has never been populated), `None` when fresh.
///
/// # Errors
/// Returns [`TixError::Db`] or [`TixError::Io`] on underlying failure.
pub fn check(cache: &Cache, log_path: &Path) -> Result<Option<PlanStat>, TixError> {
    let current = stat_log(log_path)?;
    let Some(recorded_mtime) = cache.get_meta(META_MTIME)? else {
        return Ok(Some(current));
    };
    let Some(recorded_size) = cache.get_meta(META_SIZE)? else {
        return Ok(Some(current));
    };
    let recorded_mtime: i64 = recorded_mtime
        .parse()
        .map_err(|_| TixError::Db(format!("corrupt {META_MTIME} value")))?;
    let recorded_size: u64 = recorded_size
        .parse()
        .map_err(|_| TixError::Db(format!("corrupt {META_SIZE} value")))?;
    if recorded_mtime == current.mtime && recorded_size == current.size {
        Ok(None)
    } else {
        Ok(Some(current))
    }
}

/// Clear the cache's projected rows and replay `lines` additively,
/// then stamp the new stat. Malformed lines abort the whole rebuild
/// (a partially rebuilt cache is worse than a stale one).
///
/// # Errors
/// Returns [`TixError::Parse`] if any line fails to decode, or
/// [`TixError::Db`] on underlying query failure.
pub fn rebuild(cache: &mut Cache, lines: &[String], stat: PlanStat, now: i64) -> Result<(), TixError> {
    cache.clear_projection()?;
    let tx = cache.transaction()?;
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let event = codec::decode_line(line)?;
        project::apply(&tx, &event, now)?;
    }
    tx.commit().map_err(|e| TixError::Db(format!("commit rebuild: {e}")))?;
    cache.set_meta(META_MTIME, &stat.mtime.to_string())?;
    cache.set_meta(META_SIZE, &stat.size.to_string())?;
    Ok(())
}

/// Read the log at `log_path` and, if the cache is stale relative to
/// it, rebuild. Returns `true` if a rebuild happened.
///
/// # Errors
/// Returns [`TixError::Io`], [`TixError::Parse`], or [`TixError::Db`].
pub fn ensure_fresh(cache: &mut Cache, log_path: &Path, now: i64) -> Result<bool, TixError> {
    let Some(stat) = check(cache, log_path)? else {
        return Ok(false);
    };
    let lines = match fs::read_to_string(log_path) {
        Ok(content) => content.lines().map(str::to_owned).collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(TixError::Io(e)),
    };
    rebuild(cache, &lines, stat, now)?;
    Ok(true)
}
