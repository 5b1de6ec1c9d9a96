#![allow(missing_docs)]
//! End-to-end TQL coverage against a real populated cache.

use std::collections::BTreeMap;

use tix_cache::{project::upsert_ticket, Cache};
use tix_core::{Priority, Status, Ticket, TicketId, TicketType};

fn task(id: &str, priority: Priority, status: Status, labels: &[&str]) -> Ticket {
    Ticket {
        id: TicketId::parse(id).unwrap_or_else(|e| panic!("{e}")),
        ticket_type: TicketType::Task,
        status,
        priority,
        name: format!("task {id}"),
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
        labels: labels.iter().map(|s| (*s).to_owned()).collect(),
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
fn scenario_four_tasks_pending_high_priority_blocked_limited_to_five() {
    let cache = Cache::open_in_memory().unwrap_or_else(|e| panic!("{e}"));
    for i in 0..7 {
        let id = format!("t-{i:08x}");
        upsert_ticket(cache.connection(), &task(&id, Priority::High, Status::Pending, &["blocked"]))
            .unwrap_or_else(|e| panic!("{e}"));
    }
    // A distractor that should not match: wrong priority.
    upsert_ticket(cache.connection(), &task("t-ffffffff", Priority::Low, Status::Pending, &["blocked"]))
        .unwrap_or_else(|e| panic!("{e}"));

    let compiled =
        tix_query::compile_query("tasks | status=pending priority=high | label=blocked | limit 5").unwrap_or_else(|e| panic!("{e}"));
    assert!(compiled.sql.contains("INNER JOIN ticket_labels tl"));
    assert!(compiled.binds.contains(&tix_query::SqlValue::Int(Priority::High.code())));

    let rows = tix_query::run(cache.connection(), &compiled).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(rows.len(), 5);
}

#[test]
fn default_scope_excludes_resolved_tickets() {
    let cache = Cache::open_in_memory().unwrap_or_else(|e| panic!("{e}"));
    upsert_ticket(cache.connection(), &task("t-00000001", Priority::None, Status::Pending, &[])).unwrap_or_else(|e| panic!("{e}"));
    upsert_ticket(cache.connection(), &task("t-00000002", Priority::None, Status::Accepted, &[])).unwrap_or_else(|e| panic!("{e}"));

    let compiled = tix_query::compile_query("tickets").unwrap_or_else(|e| panic!("{e}"));
    let rows = tix_query::run(cache.connection(), &compiled).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(rows.len(), 1);

    let compiled_all = tix_query::compile_query("tickets | all").unwrap_or_else(|e| panic!("{e}"));
    let rows_all = tix_query::run(cache.connection(), &compiled_all).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(rows_all.len(), 2);
}

#[test]
fn group_by_status_counts_each_bucket() {
    let cache = Cache::open_in_memory().unwrap_or_else(|e| panic!("{e}"));
    upsert_ticket(cache.connection(), &task("t-00000001", Priority::None, Status::Pending, &[])).unwrap_or_else(|e| panic!("{e}"));
    upsert_ticket(cache.connection(), &task("t-00000002", Priority::None, Status::Pending, &[])).unwrap_or_else(|e| panic!("{e}"));
    upsert_ticket(cache.connection(), &task("t-00000003", Priority::None, Status::Done, &[])).unwrap_or_else(|e| panic!("{e}"));

    let compiled = tix_query::compile_query("tickets | all | group status | count").unwrap_or_else(|e| panic!("{e}"));
    let rows = tix_query::run(cache.connection(), &compiled).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(rows.len(), 2);
    let pending_count = rows
        .iter()
        .find(|r| r["status"] == serde_json::json!(Status::Pending.code()))
        .and_then(|r| r["count"].as_i64())
        .unwrap_or_else(|| panic!("pending bucket missing"));
    assert_eq!(pending_count, 2);
}

#[test]
fn escape_hatch_runs_raw_sql() {
    let cache = Cache::open_in_memory().unwrap_or_else(|e| panic!("{e}"));
    let rows = tix_query::run_raw_sql(cache.connection(), "SELECT COUNT(*) AS n FROM tickets").unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(rows, vec![serde_json::json!({"n": 0})]);
}
