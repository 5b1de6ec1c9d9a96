//! Event log record kinds (spec §3.3).
//!
//! Every line in `plan.jsonl` is a flat JSON object carrying a `t`
//! discriminator. Six discriminators are owned by tix; everything
//! else is passed through the log untouched by [`crate::codec`] and
//! never reaches the cache projector.

use serde::{Deserialize, Serialize};

use crate::ticket::Ticket;

/// An accept event: resolves a done task. See [`crate::ticket::Tombstone`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptEvent {
    /// The ticket id being accepted.
    pub id: String,
    /// Short commit hash the task was marked done at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_at: Option<String>,
    /// Resolution time, unix seconds.
    pub timestamp: i64,
}

/// A reject event: returns a task to pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectEvent {
    /// The ticket id being rejected.
    pub id: String,
    /// Rejection reason.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    /// Resolution time, unix seconds.
    pub timestamp: i64,
}

/// A delete marker: removes/resolves a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteEvent {
    /// The ticket id being deleted.
    pub id: String,
    /// Resolution time, unix seconds.
    pub timestamp: i64,
}

/// One decoded line of the event log.
///
/// The tix-owned variants carry typed payloads; `Other` preserves any
/// line whose `t` discriminator is not one of the six owned kinds,
/// verbatim, so compaction can round-trip it without understanding it.
#[derive(Debug, Clone, PartialEq)]
pub enum EventLine {
    /// `t: "task"` — upsert a ticket of type task.
    Task(Ticket),
    /// `t: "issue"` — upsert a ticket of type issue.
    Issue(Ticket),
    /// `t: "note"` — upsert a ticket of type note.
    Note(Ticket),
    /// `t: "accept"`.
    Accept(AcceptEvent),
    /// `t: "reject"`.
    Reject(RejectEvent),
    /// `t: "delete"`.
    Delete(DeleteEvent),
    /// Any other discriminator, preserved byte-for-byte.
    Other(String),
}

impl EventLine {
    /// The `t` discriminator this line would be written with, if owned.
    #[must_use]
    pub const fn discriminator(&self) -> Option<&'static str> {
        match self {
            Self::Task(_) => Some("task"),
            Self::Issue(_) => Some("issue"),
            Self::Note(_) => Some("note"),
            Self::Accept(_) => Some("accept"),
            Self::Reject(_) => Some("reject"),
            Self::Delete(_) => Some("delete"),
            Self::Other(_) => None,
        }
    }

    /// `true` for the six tix-owned discriminators.
    #[must_use]
    pub const fn is_owned(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    /// The ticket id this line refers to, if any.
    #[must_use]
    pub fn ticket_id(&self) -> Option<&str> {
        match self {
            Self::Task(t) | Self::Issue(t) | Self::Note(t) => Some(t.id.as_str()),
            Self::Accept(e) => Some(e.id.as_str()),
            Self::Reject(e) => Some(e.id.as_str()),
            Self::Delete(e) => Some(e.id.as_str()),
            Self::Other(_) => None,
        }
    }
}
