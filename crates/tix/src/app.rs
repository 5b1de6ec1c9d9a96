//! Process-wide context: repository discovery, configuration, the
//! event log handle, and the cache connection, kept fresh on every
//! read (spec §4.5, §5 — one short-lived process per invocation).

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tix_cache::Cache;
use tix_log::store::EventLog;

use crate::config::Config;

/// Current wall clock, unix seconds. The only clock `tix` consults;
/// threaded through explicitly rather than read ad hoc so tests can
/// substitute a fixed value.
#[must_use]
pub fn now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

/// Everything a command needs: where the repository lives, its
/// configuration, the log file, and a freshly-rebuilt cache.
pub struct App {
    /// Working tree root of the discovered git repository.
    pub repo_root: PathBuf,
    /// Loaded (or defaulted) `.tix/config.toml`.
    pub config: Config,
    /// Handle on the event log file.
    pub log: EventLog,
    /// The materialized cache, guaranteed fresh as of construction.
    pub cache: Cache,
}

impl App {
    /// Discover the repository containing `start_dir`, load
    /// configuration, and open the cache, rebuilding it from the log
    /// if stale (spec §4.5).
    ///
    /// # Errors
    /// Returns an error if no repository can be discovered, the
    /// config file is malformed, or the cache cannot be opened or
    /// rebuilt.
    pub fn open(start_dir: &Path) -> Result<Self> {
        let repo = tix_log::history::discover(start_dir).context("discover git repository")?;
        let repo_root = repo.workdir().map(Path::to_path_buf).unwrap_or_else(|| start_dir.to_path_buf());
        let config = Config::load(&repo_root)?;
        let plan_path = config.plan_path(&repo_root);
        let cache_path = config.cache_path(&repo_root);
        if let Some(parent) = cache_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }

        let mut cache = Cache::open(&cache_path).context("open cache")?;
        if config.cache.auto_rebuild {
            tix_cache::refresh::ensure_fresh(&mut cache, &plan_path, now()).context("refresh cache")?;
        }

        Ok(Self { repo_root, config, log: EventLog::new(plan_path), cache })
    }

    /// Absolute path of the event log.
    #[must_use]
    pub fn plan_path(&self) -> PathBuf {
        self.config.plan_path(&self.repo_root)
    }
}
