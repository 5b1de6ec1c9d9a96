//! Façade operations (spec §6.3): each function here is a thin
//! wrapper that shapes CLI input into a call against `tix-core`,
//! `tix-cache`, `tix-log`, or `tix-query`, then formats the result.
//! No business logic lives here beyond request shaping.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tix_core::{codec, AcceptEvent, DeleteEvent, EventLine, Priority, RejectEvent, Status, Ticket, TicketId, TicketType, TixError};
use tix_log::BranchScope;
use tracing::info;

use crate::app::{now, App};

/// Input fields for `task|issue|note add`.
#[derive(Debug, Default)]
pub struct NewTicketInput {
    pub name: String,
    pub spec: Option<String>,
    pub notes: String,
    pub accept: String,
    pub priority: Priority,
    pub parent: Option<String>,
    pub created_from: Option<String>,
    pub supersedes: Option<String>,
    pub deps: Vec<String>,
    pub labels: Vec<String>,
}

fn parse_ref(raw: &Option<String>) -> Result<Option<TicketId>, TixError> {
    raw.as_deref().map(TicketId::parse).transpose()
}

fn ticket_id_taken(app: &App) -> impl Fn(&str) -> bool + '_ {
    move |id| !matches!(tix_cache::resolve::resolve(app.cache.connection(), id), Ok(tix_cache::Resolution::Broken))
}

/// Create a new ticket of `ticket_type`, append its event line, and
/// project it into the cache directly (spec §4.5: writers avoid a
/// guaranteed-dirty round-trip).
///
/// # Errors
/// Returns an error if a bound is exceeded, a reference is malformed,
/// the event cannot be appended, or the projection fails.
pub fn add_ticket(app: &mut App, ticket_type: TicketType, input: NewTicketInput) -> Result<Value> {
    if input.name.is_empty() {
        bail!(TixError::InvalidArg("name is required".into()));
    }
    let deps = input
        .deps
        .iter()
        .map(|raw| TicketId::parse(raw))
        .collect::<Result<Vec<_>, _>>()
        .context("parse dep id")?;
    if ticket_type != TicketType::Task {
        for dep in &deps {
            if dep.ticket_type().context("dep type")? != TicketType::Task {
                bail!(TixError::Dependency(format!("dep {dep} does not point to a task")));
            }
        }
    }

    let id = TicketId::generate(ticket_type, ticket_id_taken(app));
    let timestamp = now();
    let ticket = Ticket {
        id: id.clone(),
        ticket_type,
        status: Status::Pending,
        priority: input.priority,
        name: input.name,
        spec: input.spec,
        notes: input.notes,
        accept: input.accept,
        done_at: None,
        branch: None,
        parent: parse_ref(&input.parent)?,
        created_from: parse_ref(&input.created_from)?,
        supersedes: parse_ref(&input.supersedes)?,
        deps,
        created_from_name: String::new(),
        supersedes_name: String::new(),
        supersedes_reason: String::new(),
        kill_reason: String::new(),
        labels: input.labels,
        author: None,
        completed_at: None,
        cost: None,
        tokens_in: None,
        tokens_out: None,
        iterations: None,
        model: None,
        retries: None,
        kill_count: None,
        created_at: timestamp,
        updated_at: timestamp,
        resolved_at: 0,
        compacted_at: 0,
        meta: BTreeMap::new(),
    };
    ticket.validate_bounds()?;

    app.log.append(&codec::encode_ticket(&ticket))?;
    tix_cache::project::upsert_ticket(app.cache.connection(), &ticket)?;
    info!(id = %id, "created ticket");
    Ok(json!({"id": id.as_str(), "status": ticket.status.wire_tag()}))
}

fn load_live(app: &App, id: &str) -> Result<Ticket> {
    tix_cache::query::load_ticket(app.cache.connection(), id)?.ok_or_else(|| TixError::NotFound(format!("ticket {id}")).into())
}

/// `tix done <id> --done-at <hash> [--branch <name>]` (spec §3.5).
///
/// # Errors
/// Returns an error if the ticket does not exist, is not a task, or
/// `done_at` is empty (invariant 5: done requires a commit).
pub fn mark_done(app: &mut App, id: &str, done_at: &str, branch: Option<String>) -> Result<Value> {
    if done_at.is_empty() {
        bail!(TixError::State("done_at must be non-empty".into()));
    }
    let mut ticket = load_live(app, id)?;
    if ticket.status.is_terminal() {
        bail!(TixError::State(format!("ticket {id} is already resolved")));
    }
    ticket.status = Status::Done;
    ticket.done_at = Some(done_at.to_owned());
    ticket.branch = branch;
    ticket.updated_at = now();

    app.log.append(&codec::encode_ticket(&ticket))?;
    tix_cache::project::upsert_ticket(app.cache.connection(), &ticket)?;
    Ok(json!({"id": ticket.id.as_str(), "status": ticket.status.wire_tag()}))
}

/// `tix accept <id>` (spec §4.4).
///
/// # Errors
/// Returns an error if the ticket does not exist or is already
/// resolved.
pub fn accept(app: &mut App, id: &str) -> Result<Value> {
    let ticket = load_live(app, id)?;
    if ticket.status.is_terminal() {
        bail!(TixError::State(format!("ticket {id} is already resolved")));
    }
    let timestamp = now();
    let event = AcceptEvent { id: id.to_owned(), done_at: ticket.done_at.clone(), timestamp };
    app.log.append(&codec::encode_accept(&event))?;
    tix_cache::project::apply(app.cache.connection(), &EventLine::Accept(event), timestamp)?;
    Ok(json!({"id": id, "status": Status::Accepted.wire_tag()}))
}

/// `tix reject <id> --reason <text>` (spec §4.4).
///
/// # Errors
/// Returns an error if the ticket does not exist or is already
/// resolved.
pub fn reject(app: &mut App, id: &str, reason: &str) -> Result<Value> {
    let ticket = load_live(app, id)?;
    if ticket.status.is_terminal() {
        bail!(TixError::State(format!("ticket {id} is already resolved")));
    }
    let timestamp = now();
    let event = RejectEvent { id: id.to_owned(), reason: reason.to_owned(), timestamp };
    app.log.append(&codec::encode_reject(&event))?;
    tix_cache::project::apply(app.cache.connection(), &EventLine::Reject(event), timestamp)?;
    Ok(json!({"id": id, "status": Status::Pending.wire_tag()}))
}

/// `tix delete <id>` (spec §4.4).
///
/// # Errors
/// Returns an error if the ticket does not exist.
pub fn delete(app: &mut App, id: &str) -> Result<Value> {
    load_live(app, id)?;
    let timestamp = now();
    let event = DeleteEvent { id: id.to_owned(), timestamp };
    app.log.append(&codec::encode_delete(&event))?;
    tix_cache::project::apply(app.cache.connection(), &EventLine::Delete(event), timestamp)?;
    Ok(json!({"id": id, "status": Status::Deleted.wire_tag()}))
}

/// `tix prioritize <id> --priority <p>`.
///
/// # Errors
/// Returns an error if the ticket does not exist or is already
/// resolved.
pub fn prioritize(app: &mut App, id: &str, priority: Priority) -> Result<Value> {
    let mut ticket = load_live(app, id)?;
    if ticket.status.is_terminal() {
        bail!(TixError::State(format!("ticket {id} is already resolved")));
    }
    ticket.priority = priority;
    ticket.updated_at = now();
    app.log.append(&codec::encode_ticket(&ticket))?;
    tix_cache::project::upsert_ticket(app.cache.connection(), &ticket)?;
    Ok(json!({"id": ticket.id.as_str(), "status": ticket.status.wire_tag()}))
}

/// One entry of a batch ingest file: either an `add` (shaped like
/// [`NewTicketInput`] plus a `type`) or a `delete` by id (spec §6.3,
/// §9 Design Notes: batch input is a proper JSON array, not the
/// source's `},{`-splitting heuristic).
#[derive(Debug, serde::Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BatchOp {
    /// Create a new ticket.
    Add {
        #[serde(rename = "type")]
        ticket_type: String,
        name: String,
        #[serde(default)]
        spec: Option<String>,
        #[serde(default)]
        notes: String,
        #[serde(default)]
        accept: String,
        #[serde(default)]
        priority: Option<String>,
        #[serde(default)]
        parent: Option<String>,
        #[serde(default)]
        created_from: Option<String>,
        #[serde(default)]
        supersedes: Option<String>,
        #[serde(default)]
        deps: Vec<String>,
        #[serde(default)]
        labels: Vec<String>,
    },
    /// Delete an existing ticket by id.
    Delete {
        /// The ticket id to delete.
        id: String,
    },
}

/// Maximum number of operations accepted in one `ingest` call (spec §5 batch bound).
pub const MAX_BATCH: usize = 128;

/// `tix ingest --file <path> | --batch <json>`: apply a JSON array of
/// `{op:"add"|"delete", ...}` entries as a proper, fully-parsed JSON
/// array (spec §9 resolves the source's line-splitting heuristic in
/// favor of a real parser).
///
/// # Errors
/// Returns [`TixError::Parse`] on malformed JSON, [`TixError::Overflow`]
/// if the array exceeds [`MAX_BATCH`] entries, or any error any single
/// operation would raise.
pub fn ingest(app: &mut App, json_array: &str) -> Result<Value> {
    let ops: Vec<BatchOp> = serde_json::from_str(json_array).map_err(|e| TixError::Parse(format!("batch: {e}")))?;
    if ops.len() > MAX_BATCH {
        bail!(TixError::Overflow(format!("batch of {} exceeds {MAX_BATCH} entries", ops.len())));
    }
    let mut results = Vec::with_capacity(ops.len());
    for op in ops {
        let result = match op {
            BatchOp::Add { ticket_type, name, spec, notes, accept, priority, parent, created_from, supersedes, deps, labels } => {
                let ty = TicketType::from_tql_token(&ticket_type)
                    .ok_or_else(|| TixError::InvalidArg(format!("unknown ticket type '{ticket_type}'")))?;
                let priority = priority
                    .map(|p| Priority::from_tql_token(&p).ok_or_else(|| TixError::InvalidArg(format!("unknown priority '{p}'"))))
                    .transpose()?
                    .unwrap_or_default();
                add_ticket(app, ty, NewTicketInput { name, spec, notes, accept, priority, parent, created_from, supersedes, deps, labels })?
            }
            BatchOp::Delete { id } => delete(app, &id)?,
        };
        results.push(result);
    }
    Ok(Value::Array(results))
}

/// `tix query <tql>`: compile and run a TQL pipeline.
///
/// # Errors
/// Returns [`TixError::Parse`]/[`TixError::Overflow`] from the
/// compiler, or [`TixError::Db`] from execution.
pub fn run_query(app: &App, query: &str) -> Result<Value> {
    let compiled = tix_query::compile_query(query)?;
    let rows = tix_query::run(app.cache.connection(), &compiled)?;
    Ok(Value::Array(rows))
}

/// `tix sql <raw-sql>`: the operator-only escape hatch (spec §4.10).
///
/// # Errors
/// Returns [`TixError::Db`] if SQLite rejects the statement.
pub fn run_sql(app: &App, sql: &str) -> Result<Value> {
    let rows = tix_query::run_raw_sql(app.cache.connection(), sql)?;
    Ok(Value::Array(rows))
}

/// `tix sync [--branch <name> | --current | --all]` (spec §4.6).
///
/// # Errors
/// Returns [`TixError::Git`], [`TixError::Db`], or [`TixError::Parse`].
pub fn sync(app: &mut App, scope: BranchScope) -> Result<Value> {
    let plan_path = app.plan_path();
    let repo_root = app.repo_root.clone();
    tix_log::sync(&mut app.cache, &repo_root, &plan_path, &scope, now())?;
    Ok(json!({"status": "synced"}))
}

/// `tix compact` (spec §4.7).
///
/// # Errors
/// Returns [`TixError::Git`], [`TixError::Db`], [`TixError::Parse`],
/// or [`TixError::Io`].
pub fn compact(app: &mut App) -> Result<Value> {
    let plan_path = app.plan_path();
    let repo_root = app.repo_root.clone();
    tix_log::compact(&mut app.cache, &repo_root, &plan_path, &BranchScope::Current, now())?;
    Ok(json!({"status": "compacted"}))
}

/// `tix validate` (spec §4.11).
///
/// # Errors
/// Returns [`TixError::Db`] on query failure.
pub fn validate(app: &App) -> Result<Value> {
    let issues = tix_cache::validate::run(app.cache.connection())?;
    let rendered: Vec<Value> = issues
        .iter()
        .map(|issue| {
            let severity = match issue.severity {
                tix_cache::Severity::Error => "error",
                tix_cache::Severity::Warning => "warning",
            };
            json!({"severity": severity, "kind": issue.kind.to_string(), "message": issue.message})
        })
        .collect();
    Ok(Value::Array(rendered))
}

/// `tix status`: counts, velocity, actor/model breakdown, and broken
/// reference totals (spec §4.8, §4.14).
///
/// # Errors
/// Returns [`TixError::Db`] on query failure.
pub fn status(app: &App, since: i64) -> Result<Value> {
    let report = tix_cache::report::generate(app.cache.connection(), since)?;
    Ok(json!({
        "by_status": report.by_status,
        "by_type": report.by_type,
        "resolved_since": report.resolved_since,
        "by_actor": report.by_actor,
        "by_model": report.by_model,
        "broken_refs": {
            "deps": report.broken_refs.deps,
            "parent": report.broken_refs.parent,
            "created_from": report.broken_refs.created_from,
            "supersedes": report.broken_refs.supersedes,
        },
    }))
}

/// `tix report [--since <unix-seconds>]`: alias of [`status`] kept
/// distinct at the façade layer per the command surface (spec §6.3).
///
/// # Errors
/// See [`status`].
pub fn report(app: &App, since: i64) -> Result<Value> {
    status(app, since)
}

/// `tix log [--limit N]`: the tail of the raw event log, decoded
/// where possible, for operator inspection (not part of the query
/// language).
///
/// # Errors
/// Returns [`TixError::Io`] if the log cannot be read.
pub fn log_excerpt(app: &App, limit: usize) -> Result<Value> {
    let lines = app.log.read_lines()?;
    let tail: Vec<Value> = lines
        .iter()
        .rev()
        .take(limit)
        .rev()
        .map(|line| match codec::decode_line(line) {
            Ok(EventLine::Other(raw)) => json!({"raw": raw}),
            Ok(decoded) => json!({"t": decoded.discriminator(), "id": decoded.ticket_id()}),
            Err(_) => json!({"raw": line, "malformed": true}),
        })
        .collect();
    Ok(Value::Array(tail))
}

/// `tix tree <id>`: a ticket plus its resolved dependency chain,
/// recursively, bounded the same way the validator's cycle check is
/// (spec §4.11's 128-node bound reused for traversal safety).
///
/// # Errors
/// Returns [`TixError::NotFound`] if the root id does not exist.
pub fn tree(app: &App, id: &str) -> Result<Value> {
    const MAX_NODES: usize = 128;
    let mut seen = std::collections::HashSet::new();
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(id.to_owned());
    let mut nodes = Vec::new();
    while let Some(current) = queue.pop_front() {
        if !seen.insert(current.clone()) || nodes.len() >= MAX_NODES {
            continue;
        }
        match tix_cache::query::load_ticket(app.cache.connection(), &current)? {
            Some(ticket) => {
                for dep in &ticket.deps {
                    queue.push_back(dep.as_str().to_owned());
                }
                nodes.push(json!({
                    "id": ticket.id.as_str(),
                    "name": ticket.name,
                    "status": ticket.status.wire_tag(),
                    "deps": ticket.deps.iter().map(TicketId::as_str).collect::<Vec<_>>(),
                }));
            }
            None => {
                if current == id {
                    bail!(TixError::NotFound(format!("ticket {id}")));
                }
                nodes.push(json!({"id": current, "broken": true}));
            }
        }
    }
    Ok(Value::Array(nodes))
}

/// `tix search <text>` (spec §4.9).
///
/// # Errors
/// Returns [`TixError::InvalidArg`] if the query has no searchable
/// tokens, or [`TixError::Db`] on query failure.
pub fn search(app: &App, query: &str) -> Result<Value> {
    let hits = tix_cache::search::search(app.cache.connection(), query)?;
    let rendered: Vec<Value> = hits
        .into_iter()
        .map(|hit| json!({"id": hit.ticket_id, "score": hit.score}))
        .collect();
    Ok(Value::Array(rendered))
}
