//! The ticket and tombstone data model (spec §3.1–§3.2).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TixError;
use crate::id::TicketId;

/// Maximum byte length of `name`.
pub const MAX_NAME_LEN: usize = 256;
/// Maximum byte length of `notes` / `accept`.
pub const MAX_TEXT_LEN: usize = 4096;
/// Maximum byte length of `spec` (a path-like pointer).
pub const MAX_PATH_LEN: usize = 4096;
/// Maximum number of entries in `deps`.
pub const MAX_DEPS: usize = 32;
/// Maximum number of labels per ticket.
pub const MAX_LABELS: usize = 16;

/// The kind of work item a ticket represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TicketType {
    /// Actionable unit of work. May have `deps` on other tasks.
    Task,
    /// A problem report.
    Issue,
    /// A free-form note carrying no workflow semantics.
    Note,
}

impl TicketType {
    /// Single-character id prefix for this type.
    #[must_use]
    pub const fn prefix(self) -> char {
        match self {
            Self::Task => 't',
            Self::Issue => 'i',
            Self::Note => 'n',
        }
    }

    /// Resolve a type from its id prefix.
    #[must_use]
    pub const fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.as_bytes() {
            [b't'] => Some(Self::Task),
            [b'i'] => Some(Self::Issue),
            [b'n'] => Some(Self::Note),
            _ => None,
        }
    }

    /// Short wire tag used by the JSONL codec's `t` discriminator.
    #[must_use]
    pub const fn wire_tag(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Issue => "issue",
            Self::Note => "note",
        }
    }

    /// Integer code used by the cache schema's `type` column.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Task => 0,
            Self::Issue => 1,
            Self::Note => 2,
        }
    }

    /// Decode a cache `type` column value.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Task),
            1 => Some(Self::Issue),
            2 => Some(Self::Note),
            _ => None,
        }
    }

    /// Resolve the enum-sugar token used by TQL (`task`/`issue`/`note`).
    #[must_use]
    pub fn from_tql_token(token: &str) -> Option<Self> {
        match token {
            "task" => Some(Self::Task),
            "issue" => Some(Self::Issue),
            "note" => Some(Self::Note),
            _ => None,
        }
    }
}

/// Lifecycle status of a ticket. Ordered: `status >= Accepted` is
/// "terminal / resolved".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Status {
    /// Open / not yet worked.
    Pending,
    /// Marked complete by the author but not yet reviewed.
    Done,
    /// Reviewed and accepted. Terminal.
    Accepted,
    /// Reviewed and rejected; returns to `Pending` via a `reject` event.
    Rejected,
    /// Removed. Terminal.
    Deleted,
}

impl Status {
    /// True when this status is terminal/resolved (status >= Accepted).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Deleted)
    }

    /// Short wire tag used by the JSONL codec's `s` field.
    #[must_use]
    pub const fn wire_tag(self) -> &'static str {
        match self {
            Self::Pending => "p",
            Self::Done => "d",
            Self::Accepted => "a",
            Self::Rejected => "r",
            Self::Deleted => "x",
        }
    }

    /// Parse the JSONL codec's `s` field.
    #[must_use]
    pub const fn from_wire_tag(tag: &str) -> Option<Self> {
        match tag.as_bytes() {
            [b'p'] => Some(Self::Pending),
            [b'd'] => Some(Self::Done),
            [b'a'] => Some(Self::Accepted),
            [b'r'] => Some(Self::Rejected),
            [b'x'] => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Integer code used by the cache schema's `status` column.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Done => 1,
            Self::Accepted => 2,
            Self::Rejected => 3,
            Self::Deleted => 4,
        }
    }

    /// Decode a cache `status` column value.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Pending),
            1 => Some(Self::Done),
            2 => Some(Self::Accepted),
            3 => Some(Self::Rejected),
            4 => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Resolve the enum-sugar token used by TQL.
    #[must_use]
    pub fn from_tql_token(token: &str) -> Option<Self> {
        match token {
            "pending" => Some(Self::Pending),
            "done" => Some(Self::Done),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

/// Ticket priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Priority {
    /// No priority assigned.
    #[default]
    None,
    /// Low priority.
    Low,
    /// Medium priority.
    Medium,
    /// High priority.
    High,
}

impl Priority {
    /// Short wire tag used by the JSONL codec's `pr` field.
    #[must_use]
    pub const fn wire_tag(self) -> &'static str {
        match self {
            Self::None => "n",
            Self::Low => "l",
            Self::Medium => "m",
            Self::High => "h",
        }
    }

    /// Parse the JSONL codec's `pr` field.
    #[must_use]
    pub const fn from_wire_tag(tag: &str) -> Option<Self> {
        match tag.as_bytes() {
            [b'n'] => Some(Self::None),
            [b'l'] => Some(Self::Low),
            [b'm'] => Some(Self::Medium),
            [b'h'] => Some(Self::High),
            _ => None,
        }
    }

    /// Integer code used by the cache schema's `priority` column.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    /// Decode a cache `priority` column value.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 => Some(Self::High),
            _ => None,
        }
    }

    /// Resolve the enum-sugar token used by TQL.
    #[must_use]
    pub fn from_tql_token(token: &str) -> Option<Self> {
        match token {
            "none" => Some(Self::None),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// A single extensible `meta` value: text xor numeric, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// Arbitrary short text value.
    Text(String),
    /// Numeric value (stored as `REAL` in the cache).
    Num(f64),
}

/// A unit of work or information (spec §3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Primary key.
    pub id: TicketId,
    /// Work-item kind.
    #[serde(rename = "type")]
    pub ticket_type: TicketType,
    /// Lifecycle status.
    pub status: Status,
    /// Priority.
    #[serde(default)]
    pub priority: Priority,
    /// Human-readable short name.
    pub name: String,
    /// Optional pointer to a spec document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
    /// Testable acceptance criterion (tasks).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub accept: String,
    /// Short commit hash at which the task was marked done.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_at: Option<String>,
    /// Branch name at the time `done_at` was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Parent ticket id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<TicketId>,
    /// Ticket id this one was created from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_from: Option<TicketId>,
    /// Ticket id this one supersedes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<TicketId>,
    /// Task dependencies (must point to other tasks).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<TicketId>,
    /// Denormalized `created_from` target name, written at compact time.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_from_name: String,
    /// Denormalized `supersedes` target name, written at compact time.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub supersedes_name: String,
    /// Denormalized `supersedes` target kill reason, written at compact time.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub supersedes_reason: String,
    /// Short keyword explaining why a previous attempt was killed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kill_reason: String,
    /// Unordered label set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Actor attribution (opaque to tix).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// ISO-8601 completion timestamp (opaque to tix).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    /// Telemetry: cost in USD (opaque to tix).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Telemetry: input tokens (opaque to tix).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_in: Option<i64>,
    /// Telemetry: output tokens (opaque to tix).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_out: Option<i64>,
    /// Telemetry: iteration count (opaque to tix).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<i64>,
    /// Telemetry: model identifier (opaque to tix).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Telemetry: retry count (opaque to tix).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<i64>,
    /// Telemetry: number of times a prior attempt was killed (opaque to tix).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kill_count: Option<i64>,
    /// Creation time, unix seconds.
    pub created_at: i64,
    /// Last update time, unix seconds.
    pub updated_at: i64,
    /// Terminal-status time, unix seconds (0 if not yet resolved).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub resolved_at: i64,
    /// Compaction stamp, unix seconds (0 if never compacted).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub compacted_at: i64,
    /// Extensible key/value metadata, emitted only at compaction.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, MetaValue>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

impl Ticket {
    /// Validate resource bounds and cross-field invariants that don't
    /// require the cache (id format, lengths, dep count, label count,
    /// dep uniqueness). Cache-dependent invariants (acyclic deps,
    /// referential existence) are checked by `tix-cache::validate`.
    ///
    /// # Errors
    /// Returns [`TixError::Overflow`] or [`TixError::Validation`] on
    /// the first violated bound.
    pub fn validate_bounds(&self) -> Result<(), TixError> {
        if self.name.len() > MAX_NAME_LEN {
            return Err(TixError::Overflow(format!(
                "ticket {} name exceeds {MAX_NAME_LEN} bytes",
                self.id
            )));
        }
        if self.notes.len() > MAX_TEXT_LEN || self.accept.len() > MAX_TEXT_LEN {
            return Err(TixError::Overflow(format!(
                "ticket {} notes/accept exceed {MAX_TEXT_LEN} bytes",
                self.id
            )));
        }
        if self.spec.as_ref().is_some_and(|s| s.len() > MAX_PATH_LEN) {
            return Err(TixError::Overflow(format!(
                "ticket {} spec path exceeds {MAX_PATH_LEN} bytes",
                self.id
            )));
        }
        if self.deps.len() > MAX_DEPS {
            return Err(TixError::Overflow(format!(
                "ticket {} has more than {MAX_DEPS} deps",
                self.id
            )));
        }
        if self.labels.len() > MAX_LABELS {
            return Err(TixError::Overflow(format!(
                "ticket {} has more than {MAX_LABELS} labels",
                self.id
            )));
        }
        let mut seen_deps = std::collections::HashSet::with_capacity(self.deps.len());
        for dep in &self.deps {
            if !seen_deps.insert(dep) {
                return Err(TixError::Duplicate(format!(
                    "ticket {} lists dep {dep} more than once",
                    self.id
                )));
            }
        }
        let mut seen_labels = std::collections::HashSet::with_capacity(self.labels.len());
        for label in &self.labels {
            if !seen_labels.insert(label) {
                return Err(TixError::Duplicate(format!(
                    "ticket {} lists label '{label}' more than once",
                    self.id
                )));
            }
        }
        if self.ticket_type != TicketType::Task && !self.deps.is_empty() {
            return Err(TixError::Validation(format!(
                "ticket {} is not a task but declares deps",
                self.id
            )));
        }
        if self.status == Status::Done && self.done_at.as_deref().unwrap_or_default().is_empty() {
            return Err(TixError::State(format!(
                "ticket {} is done but has no done_at commit hash",
                self.id
            )));
        }
        Ok(())
    }
}

/// An accept/reject record for a task (spec §3.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tombstone {
    /// The resolved ticket's id.
    pub id: TicketId,
    /// Short commit hash the task was marked done at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_at: Option<String>,
    /// Rejection reason (reject only).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// Ticket name, copied at resolution time.
    pub name: String,
    /// `true` for accept, `false` for reject.
    pub is_accept: bool,
    /// Resolution time, unix seconds.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_ticket() -> Ticket {
        Ticket {
            id: TicketId::parse("t-00000001").unwrap_or_else(|e| panic!("{e}")),
            ticket_type: TicketType::Task,
            status: Status::Pending,
            priority: Priority::None,
            name: "demo".into(),
            spec: None,
            notes: String::new(),
            accept: String::new(),
            done_at: None,
            branch: None,
            parent: None,
            created_from: None,
            supersedes: None,
            deps: Vec::new(),
            created_from_name: String::new(),
            supersedes_name: String::new(),
            supersedes_reason: String::new(),
            kill_reason: String::new(),
            labels: Vec::new(),
            author: None,
            completed_at: None,
            cost: None,
            tokens_in: None,
            tokens_out: None,
            iterations: None,
            model: None,
            retries: None,
            kill_count: None,
            created_at: 1,
            updated_at: 1,
            resolved_at: 0,
            compacted_at: 0,
            meta: BTreeMap::new(),
        }
    }

    #[test]
    fn done_without_commit_is_rejected() {
        let mut t = base_ticket();
        t.status = Status::Done;
        assert!(t.validate_bounds().is_err());
        t.done_at = Some("abc123".into());
        assert!(t.validate_bounds().is_ok());
    }

    #[test]
    fn duplicate_deps_rejected() {
        let mut t = base_ticket();
        let dep = TicketId::parse("t-00000002").unwrap_or_else(|e| panic!("{e}"));
        t.deps = vec![dep.clone(), dep];
        assert!(t.validate_bounds().is_err());
    }

    #[test]
    fn non_task_with_deps_rejected() {
        let mut t = base_ticket();
        t.ticket_type = TicketType::Note;
        t.deps = vec![TicketId::parse("t-00000002").unwrap_or_else(|e| panic!("{e}"))];
        assert!(t.validate_bounds().is_err());
    }

    #[test]
    fn status_is_terminal() {
        assert!(!Status::Pending.is_terminal());
        assert!(!Status::Done.is_terminal());
        assert!(Status::Accepted.is_terminal());
        assert!(Status::Rejected.is_terminal());
        assert!(Status::Deleted.is_terminal());
    }

    #[test]
    fn enum_codes_round_trip() {
        for s in [
            Status::Pending,
            Status::Done,
            Status::Accepted,
            Status::Rejected,
            Status::Deleted,
        ] {
            assert_eq!(Status::from_code(s.code()), Some(s));
            assert_eq!(Status::from_wire_tag(s.wire_tag()), Some(s));
        }
        for t in [TicketType::Task, TicketType::Issue, TicketType::Note] {
            assert_eq!(TicketType::from_code(t.code()), Some(t));
            assert_eq!(TicketType::from_prefix(&t.prefix().to_string()), Some(t));
        }
        for p in [Priority::None, Priority::Low, Priority::Medium, Priority::High] {
            assert_eq!(Priority::from_code(p.code()), Some(p));
            assert_eq!(Priority::from_wire_tag(p.wire_tag()), Some(p));
        }
    }
}
