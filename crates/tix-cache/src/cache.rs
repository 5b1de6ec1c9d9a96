//! The cache connection (spec §4.3, §5).

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use tix_core::TixError;

use crate::schema;

/// How long a writer waits on a contended `cache.db` before failing,
/// rather than relying on SQLite's zero-second default (spec §5).
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A handle on the materialized SQLite cache.
pub struct Cache {
    conn: Connection,
}

impl Cache {
    /// Open (creating if absent) the cache file at `path`, running
    /// schema init and setting the busy timeout.
    ///
    /// # Errors
    /// Returns [`TixError::Db`] if the file cannot be opened or the
    /// schema cannot be initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TixError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| TixError::Db(format!("failed to open {}: {e}", path.as_ref().display())))?;
        Self::from_connection(conn)
    }

    /// Open a transient in-memory cache, primarily for tests.
    ///
    /// # Errors
    /// Returns [`TixError::Db`] if the connection or schema init fails.
    pub fn open_in_memory() -> Result<Self, TixError> {
        let conn =
            Connection::open_in_memory().map_err(|e| TixError::Db(format!("failed to open in-memory db: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, TixError> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| TixError::Db(format!("failed to set busy_timeout: {e}")))?;
        conn.pragma_update(None, "foreign_keys", "off")
            .map_err(|e| TixError::Db(format!("failed to set pragma: {e}")))?;
        schema::init(&conn)?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection, e.g. for the `sql` escape hatch.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Start a transaction. Callers commit or roll back explicitly.
    ///
    /// # Errors
    /// Returns [`TixError::Db`] if the transaction cannot begin.
    pub fn transaction(&mut self) -> Result<rusqlite::Transaction<'_>, TixError> {
        self.conn
            .transaction()
            .map_err(|e| TixError::Db(format!("failed to begin transaction: {e}")))
    }

    /// Read a bookkeeping value from the `meta` table.
    ///
    /// # Errors
    /// Returns [`TixError::Db`] on query failure.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>, TixError> {
        self.conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| row.get(0))
            .map(Some)
            .or_else(|e| if matches!(e, rusqlite::Error::QueryReturnedNoRows) { Ok(None) } else { Err(e) })
            .map_err(|e| TixError::Db(format!("failed to read meta '{key}': {e}")))
    }

    /// Write a bookkeeping value into the `meta` table.
    ///
    /// # Errors
    /// Returns [`TixError::Db`] on query failure.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<(), TixError> {
        self.conn
            .execute(
                "INSERT INTO meta(key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![key, value],
            )
            .map_err(|e| TixError::Db(format!("failed to write meta '{key}': {e}")))?;
        Ok(())
    }

    /// Clear every ticket/dep/label/meta/tombstone/keyword row, keeping
    /// the `meta` bookkeeping table (callers stamp new values after).
    ///
    /// # Errors
    /// Returns [`TixError::Db`] on query failure.
    pub fn clear_projection(&self) -> Result<(), TixError> {
        self.conn
            .execute_batch(
                "DELETE FROM tickets;
                 DELETE FROM ticket_deps;
                 DELETE FROM ticket_labels;
                 DELETE FROM ticket_meta;
                 DELETE FROM tombstones;
                 DELETE FROM keywords;",
            )
            .map_err(|e| TixError::Db(format!("failed to clear projection: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_round_trips() {
        let cache = Cache::open_in_memory().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(cache.get_meta("plan_mtime").unwrap_or_else(|e| panic!("{e}")), None);
        cache.set_meta("plan_mtime", "123").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            cache.get_meta("plan_mtime").unwrap_or_else(|e| panic!("{e}")),
            Some("123".to_owned())
        );
        cache.set_meta("plan_mtime", "456").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            cache.get_meta("plan_mtime").unwrap_or_else(|e| panic!("{e}")),
            Some("456".to_owned())
        );
    }
}
