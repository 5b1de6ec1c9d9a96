//! Error taxonomy shared by every `tix` crate.

use std::fmt;

/// The error classes a façade maps to process exit codes.
///
/// Mirrors the taxonomy in the system specification: each kind is a
/// distinct reason a command failed, independent of the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// NULL/empty where forbidden, unknown subcommand, bad enum.
    InvalidArg,
    /// Missing repo, missing ticket, missing commit.
    NotFound,
    /// File open/read/write failure.
    Io,
    /// Subprocess or libgit2 failure.
    Git,
    /// Cache engine prepare/step failure.
    Db,
    /// Bounded buffer/array exceeded.
    Overflow,
    /// JSONL or TQL syntax error.
    Parse,
    /// Repeated dep or other unique-violation.
    Duplicate,
    /// Operation rejected by current lifecycle.
    State,
    /// Unresolved/invalid reference.
    Dependency,
    /// Validator rule failed.
    Validation,
}

impl ErrorKind {
    /// Process exit code a façade should use for this error kind.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::InvalidArg => 1,
            Self::NotFound => 2,
            Self::Io => 3,
            Self::Git => 4,
            Self::Db => 5,
            Self::Overflow => 6,
            Self::Parse => 7,
            Self::Duplicate => 8,
            Self::State => 9,
            Self::Dependency => 10,
            Self::Validation => 11,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidArg => "invalid-arg",
            Self::NotFound => "not-found",
            Self::Io => "io",
            Self::Git => "git",
            Self::Db => "db",
            Self::Overflow => "overflow",
            Self::Parse => "parse",
            Self::Duplicate => "duplicate",
            Self::State => "state",
            Self::Dependency => "dependency",
            Self::Validation => "validation",
        };
        f.write_str(s)
    }
}

/// The single error type returned by every `tix` library crate.
#[derive(Debug, thiserror::Error)]
pub enum TixError {
    /// See [`ErrorKind::InvalidArg`].
    #[error("invalid argument: {0}")]
    InvalidArg(String),
    /// See [`ErrorKind::NotFound`].
    #[error("not found: {0}")]
    NotFound(String),
    /// See [`ErrorKind::Io`].
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// See [`ErrorKind::Git`].
    #[error("git error: {0}")]
    Git(String),
    /// See [`ErrorKind::Db`].
    #[error("cache error: {0}")]
    Db(String),
    /// See [`ErrorKind::Overflow`].
    #[error("bound exceeded: {0}")]
    Overflow(String),
    /// See [`ErrorKind::Parse`].
    #[error("parse error: {0}")]
    Parse(String),
    /// See [`ErrorKind::Duplicate`].
    #[error("duplicate: {0}")]
    Duplicate(String),
    /// See [`ErrorKind::State`].
    #[error("invalid state transition: {0}")]
    State(String),
    /// See [`ErrorKind::Dependency`].
    #[error("unresolved reference: {0}")]
    Dependency(String),
    /// See [`ErrorKind::Validation`].
    #[error("validation failed: {0}")]
    Validation(String),
}

impl TixError {
    /// Classify this error for exit-code mapping.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArg(_) => ErrorKind::InvalidArg,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Io(_) => ErrorKind::Io,
            Self::Git(_) => ErrorKind::Git,
            Self::Db(_) => ErrorKind::Db,
            Self::Overflow(_) => ErrorKind::Overflow,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Duplicate(_) => ErrorKind::Duplicate,
            Self::State(_) => ErrorKind::State,
            Self::Dependency(_) => ErrorKind::Dependency,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }
}

/// Convenience result alias used throughout the `tix` crates.
pub type Result<T> = std::result::Result<T, TixError>;
