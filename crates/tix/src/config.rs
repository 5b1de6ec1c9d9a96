//! Operator configuration loaded from `.tix/config.toml` (spec §6.1).
//!
//! Missing file, missing sections, and missing keys all fall back to
//! documented defaults; nothing about config presence is required for
//! `tix` to function in a fresh repository.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

const CONFIG_DIR: &str = ".tix";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_PLAN_FILE: &str = ".tix/plan.jsonl";
const DEFAULT_CACHE_FILE: &str = ".tix/cache.db";
/// Retired migration fallback (spec §9 Design Notes): older
/// repositories wrote the log under `ralph/plan.jsonl` before the
/// orchestrator adopted `.tix/`. Checked only when the configured
/// path is absent.
const LEGACY_PLAN_FILE: &str = "ralph/plan.jsonl";

/// Top-level configuration, deserialized from `.tix/config.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub repo: RepoConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// `[repo]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub main_branch: String,
    pub plan_file: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self { main_branch: "main".to_owned(), plan_file: DEFAULT_PLAN_FILE.to_owned() }
    }
}

/// `[display]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub color: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { color: true }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub auto_rebuild: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { auto_rebuild: true }
    }
}

impl Config {
    /// Load configuration from `<repo_root>/.tix/config.toml`, or
    /// defaults if that file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or
    /// parsed as TOML.
    pub fn load(repo_root: &Path) -> Result<Self> {
        let path = repo_root.join(CONFIG_DIR).join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the absolute path of the event log, honoring the
    /// legacy fallback when the configured path does not exist yet
    /// but the legacy one does (spec §9).
    #[must_use]
    pub fn plan_path(&self, repo_root: &Path) -> PathBuf {
        let configured = repo_root.join(&self.repo.plan_file);
        if configured.exists() {
            return configured;
        }
        let legacy = repo_root.join(LEGACY_PLAN_FILE);
        if self.repo.plan_file == DEFAULT_PLAN_FILE && legacy.exists() {
            return legacy;
        }
        configured
    }

    /// Resolve the absolute path of the cache database file.
    #[must_use]
    pub fn cache_path(&self, repo_root: &Path) -> PathBuf {
        repo_root.join(DEFAULT_CACHE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn missing_config_returns_defaults() {
        let dir = tempdir().unwrap_or_else(|e| panic!("{e}"));
        let config = Config::load(dir.path()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(config.repo.main_branch, "main");
        assert_eq!(config.repo.plan_file, DEFAULT_PLAN_FILE);
        assert!(config.display.color);
        assert!(config.cache.auto_rebuild);
    }

    #[test]
    fn loads_overrides_from_file() {
        let dir = tempdir().unwrap_or_else(|e| panic!("{e}"));
        fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap_or_else(|e| panic!("{e}"));
        fs::write(
            dir.path().join(CONFIG_DIR).join(CONFIG_FILE),
            "[repo]\nmain_branch = \"trunk\"\n[display]\ncolor = false\n[cache]\nauto_rebuild = false\n",
        )
        .unwrap_or_else(|e| panic!("{e}"));

        let config = Config::load(dir.path()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(config.repo.main_branch, "trunk");
        assert_eq!(config.repo.plan_file, DEFAULT_PLAN_FILE);
        assert!(!config.display.color);
        assert!(!config.cache.auto_rebuild);
    }

    #[test]
    fn plan_path_falls_back_to_legacy_location() {
        let dir = tempdir().unwrap_or_else(|e| panic!("{e}"));
        fs::create_dir_all(dir.path().join("ralph")).unwrap_or_else(|e| panic!("{e}"));
        fs::write(dir.path().join(LEGACY_PLAN_FILE), "").unwrap_or_else(|e| panic!("{e}"));

        let config = Config::default();
        assert_eq!(config.plan_path(dir.path()), dir.path().join(LEGACY_PLAN_FILE));
    }

    #[test]
    fn plan_path_prefers_configured_location_when_present() {
        let dir = tempdir().unwrap_or_else(|e| panic!("{e}"));
        fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap_or_else(|e| panic!("{e}"));
        fs::write(dir.path().join(DEFAULT_PLAN_FILE), "").unwrap_or_else(|e| panic!("{e}"));
        fs::create_dir_all(dir.path().join("ralph")).unwrap_or_else(|e| panic!("{e}"));
        fs::write(dir.path().join(LEGACY_PLAN_FILE), "").unwrap_or_else(|e| panic!("{e}"));

        let config = Config::default();
        assert_eq!(config.plan_path(dir.path()), dir.path().join(DEFAULT_PLAN_FILE));
    }
}
