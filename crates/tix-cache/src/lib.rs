//! The materialized SQLite cache derived from the `tix` event log:
//! schema, projector, staleness/rebuild, reference resolver, search
//! index, validator, and report generator (spec §4.3–§4.11, §4.14).

pub mod cache;
pub mod project;
pub mod query;
pub mod refresh;
pub mod report;
pub mod resolve;
pub mod schema;
pub mod search;
pub mod validate;

#[cfg(all(test, feature = "property-tests"))]
mod properties;

pub use cache::Cache;
pub use report::Report;
pub use resolve::Resolution;
pub use validate::{Severity, ValidationIssue};
