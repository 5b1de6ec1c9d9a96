//! Event log I/O, git history walking, sync, and compaction for the
//! `tix` event log (spec §4.2, §4.6, §4.7).
//!
//! This crate has no knowledge of the TQL query language and depends
//! on `tix-cache` only to drive projection during sync/compact; it
//! never queries the cache for reads.

pub mod compact;
pub mod history;
pub mod store;
pub mod sync;

pub use compact::compact;
pub use history::BranchScope;
pub use store::EventLog;
pub use sync::sync;
