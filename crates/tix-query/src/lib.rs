//! TQL: the pipe-separated ticket query language, compiled to
//! parameterized SQL against the cache schema (spec §4.10).
//!
//! `parse` turns a query string into a bound-checked [`Pipeline`];
//! `compile` turns that into SQL plus a bind list; `run` executes it.
//! A `sql` escape hatch ([`run_raw_sql`]) bypasses the pipeline
//! entirely for operator-provided SQL.

pub mod compiler;
pub mod executor;
pub mod parser;
pub mod types;

pub use compiler::{compile, Compiled};
pub use executor::{run, run_raw_sql};
pub use parser::parse;
pub use types::{AggregateKind, CompareOp, Filter, FilterValue, Pipeline, Source, SortKey, SqlValue};

/// Parse and compile a TQL query string in one step.
///
/// # Errors
/// Returns [`tix_core::TixError::Parse`] on a malformed query, or
/// [`tix_core::TixError::Overflow`] if a bounded array is exceeded.
pub fn compile_query(query: &str) -> Result<Compiled, tix_core::TixError> {
    compile(&parse(query)?)
}
