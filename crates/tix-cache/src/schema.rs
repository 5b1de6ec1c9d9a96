//! Cache schema (spec §4.3).
//!
//! One embedded SQLite file, created idempotently on every
//! [`crate::Cache::open`] via a single batch of `CREATE TABLE IF NOT
//! EXISTS` statements, the way [`rusqlite`] consumers in this
//! ecosystem bootstrap an embedded store.

use rusqlite::Connection;
use tix_core::TixError;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS tickets (
    id                  TEXT PRIMARY KEY,
    type                INTEGER NOT NULL,
    status              INTEGER NOT NULL,
    priority            INTEGER NOT NULL,
    name                TEXT NOT NULL,
    spec                TEXT,
    notes               TEXT NOT NULL DEFAULT '',
    accept              TEXT NOT NULL DEFAULT '',
    done_at             TEXT,
    branch              TEXT,
    parent              TEXT,
    created_from        TEXT,
    supersedes          TEXT,
    kill_reason         TEXT NOT NULL DEFAULT '',
    created_from_name   TEXT NOT NULL DEFAULT '',
    supersedes_name     TEXT NOT NULL DEFAULT '',
    supersedes_reason   TEXT NOT NULL DEFAULT '',
    author              TEXT,
    completed_at        TEXT,
    cost                REAL,
    tokens_in           INTEGER,
    tokens_out          INTEGER,
    iterations          INTEGER,
    model               TEXT,
    retries             INTEGER,
    kill_count          INTEGER,
    created_at          INTEGER NOT NULL,
    updated_at          INTEGER NOT NULL,
    resolved_at         INTEGER NOT NULL DEFAULT 0,
    compacted_at        INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS ticket_deps (
    ticket_id TEXT NOT NULL,
    dep_id    TEXT NOT NULL,
    UNIQUE(ticket_id, dep_id)
);

CREATE TABLE IF NOT EXISTS ticket_labels (
    ticket_id TEXT NOT NULL,
    label     TEXT NOT NULL,
    UNIQUE(ticket_id, label)
);

CREATE TABLE IF NOT EXISTS ticket_meta (
    ticket_id  TEXT NOT NULL,
    key        TEXT NOT NULL,
    value_text TEXT,
    value_num  REAL,
    UNIQUE(ticket_id, key)
);

CREATE TABLE IF NOT EXISTS tombstones (
    id        TEXT PRIMARY KEY,
    done_at   TEXT,
    reason    TEXT NOT NULL DEFAULT '',
    name      TEXT NOT NULL,
    is_accept INTEGER NOT NULL,
    timestamp INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS keywords (
    ticket_id TEXT NOT NULL,
    keyword   TEXT NOT NULL,
    weight    REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tickets_type_status ON tickets(type, status);
CREATE INDEX IF NOT EXISTS idx_ticket_labels_label ON ticket_labels(label);
CREATE INDEX IF NOT EXISTS idx_ticket_meta_key ON ticket_meta(key);
CREATE INDEX IF NOT EXISTS idx_deps_ticket ON ticket_deps(ticket_id);
CREATE INDEX IF NOT EXISTS idx_keywords_keyword ON keywords(keyword);
";

/// Create every table and index if absent. Safe to call on every open.
///
/// # Errors
/// Returns [`TixError::Db`] if the batch fails.
pub fn init(conn: &Connection) -> Result<(), TixError> {
    conn.execute_batch(SCHEMA_SQL)
        .map_err(|e| TixError::Db(format!("schema init failed: {e}")))
}
