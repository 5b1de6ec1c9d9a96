//! Event log I/O (spec §4.2): line-oriented append and the atomic
//! two-phase rewrite used by compaction.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tix_core::TixError;

/// A handle on `plan.jsonl` (or any JSONL event log file).
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Wrap the log at `path`. Does not touch the filesystem.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Borrow the log's filesystem path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line, creating the file (and no parent directories)
    /// if absent. A failed write leaves the file's prior contents
    /// intact: the line is built in memory before any I/O begins, and
    /// is written with a single `write_all` call.
    ///
    /// # Errors
    /// Returns [`TixError::Io`] on any filesystem failure.
    pub fn append(&self, line: &str) -> Result<(), TixError> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(TixError::Io)?;
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes()).map_err(TixError::Io)?;
        file.flush().map_err(TixError::Io)?;
        Ok(())
    }

    /// Read every line of the log. A missing file reads as empty.
    ///
    /// # Errors
    /// Returns [`TixError::Io`] on any filesystem failure other than
    /// the file not existing.
    pub fn read_lines(&self) -> Result<Vec<String>, TixError> {
        match File::open(&self.path) {
            Ok(file) => BufReader::new(file)
                .lines()
                .collect::<std::io::Result<Vec<_>>>()
                .map_err(TixError::Io),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(TixError::Io(e)),
        }
    }

    /// Overwrite the log atomically: write a temp file in the same
    /// directory, then rename it over the original. `preserved` lines
    /// come first (byte-identical, original order), followed by
    /// `canonical` lines.
    ///
    /// # Errors
    /// Returns [`TixError::Io`] on any filesystem failure.
    pub fn rewrite(&self, preserved: &[String], canonical: &[String]) -> Result<(), TixError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let tmp_path = dir.join(format!(
            ".{}.tmp",
            self.path.file_name().and_then(|n| n.to_str()).unwrap_or("plan.jsonl")
        ));
        {
            let mut tmp = File::create(&tmp_path).map_err(TixError::Io)?;
            for line in preserved.iter().chain(canonical) {
                tmp.write_all(line.as_bytes()).map_err(TixError::Io)?;
                tmp.write_all(b"\n").map_err(TixError::Io)?;
            }
            tmp.flush().map_err(TixError::Io)?;
        }
        fs::rename(&tmp_path, &self.path).map_err(TixError::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_read_round_trips() {
        let dir = tempdir().unwrap_or_else(|e| panic!("{e}"));
        let log = EventLog::new(dir.path().join("plan.jsonl"));
        log.append(r#"{"t":"task","id":"t-00000001"}"#).unwrap_or_else(|e| panic!("{e}"));
        log.append(r#"{"t":"task","id":"t-00000002"}"#).unwrap_or_else(|e| panic!("{e}"));
        let lines = log.read_lines().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn missing_log_reads_empty() {
        let dir = tempdir().unwrap_or_else(|e| panic!("{e}"));
        let log = EventLog::new(dir.path().join("plan.jsonl"));
        assert!(log.read_lines().unwrap_or_else(|e| panic!("{e}")).is_empty());
    }

    #[test]
    fn rewrite_replaces_contents_atomically() {
        let dir = tempdir().unwrap_or_else(|e| panic!("{e}"));
        let log = EventLog::new(dir.path().join("plan.jsonl"));
        log.append(r#"{"t":"stage","name":"old"}"#).unwrap_or_else(|e| panic!("{e}"));
        log.append(r#"{"t":"task","id":"t-00000001"}"#).unwrap_or_else(|e| panic!("{e}"));

        log.rewrite(
            &[r#"{"t":"stage","name":"old"}"#.to_owned()],
            &[r#"{"t":"task","id":"t-00000001","name":"renamed"}"#.to_owned()],
        )
        .unwrap_or_else(|e| panic!("{e}"));

        let lines = log.read_lines().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("stage"));
        assert!(lines[1].contains("renamed"));
    }
}
