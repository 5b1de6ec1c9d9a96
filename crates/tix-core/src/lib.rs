//! Shared data model, identifiers, error taxonomy, and JSONL codec for
//! `tix`, a git-native ticketing engine.
//!
//! This crate has no knowledge of git, SQLite, or the TQL query
//! language — it is the vocabulary every other `tix` crate builds on.

pub mod codec;
pub mod error;
pub mod event;
pub mod id;
pub mod ticket;

#[cfg(all(test, feature = "property-tests"))]
mod properties;

pub use error::{ErrorKind, Result, TixError};
pub use event::{AcceptEvent, DeleteEvent, EventLine, RejectEvent};
pub use id::TicketId;
pub use ticket::{MetaValue, Priority, Status, Ticket, TicketType, Tombstone};
