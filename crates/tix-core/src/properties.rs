//! Property-based tests for the invariants in spec §3 and §9. Gated
//! behind the `property-tests` feature, mirroring `tix-cache`'s own
//! feature of that name.

use proptest::prelude::*;

use crate::id::{TicketId, MAX_ID_LEN};
use crate::ticket::{Ticket, TicketType};

proptest! {
    /// Any string [`TicketId::parse`] accepts round-trips through
    /// `Display`/`parse` unchanged, and never exceeds the length bound.
    #[test]
    fn parse_accepts_imply_display_round_trip(tail in "[0-9a-f]{1,14}") {
        for (prefix, kind) in [("t", TicketType::Task), ("i", TicketType::Issue), ("n", TicketType::Note)] {
            let raw = format!("{prefix}-{tail}");
            if raw.len() > MAX_ID_LEN {
                continue;
            }
            let id = TicketId::parse(&raw).unwrap_or_else(|e| panic!("{e}"));
            prop_assert_eq!(id.to_string(), raw.clone());
            prop_assert_eq!(id.ticket_type().unwrap_or_else(|e| panic!("{e}")), kind);
        }
    }

    /// [`TicketId::generate`] never returns an id `is_taken` rejected,
    /// regardless of how many candidates collide first.
    #[test]
    fn generate_never_returns_a_taken_id(rejections in 0u32..20) {
        let mut seen = std::collections::HashSet::new();
        let mut remaining = rejections;
        let id = TicketId::generate(TicketType::Task, |candidate| {
            if remaining > 0 {
                remaining -= 1;
                seen.insert(candidate.to_owned());
                true
            } else {
                false
            }
        });
        prop_assert!(!seen.contains(id.as_str()));
    }

    /// A name longer than [`crate::ticket::MAX_NAME_LEN`] is always
    /// rejected by bounds validation, regardless of its content.
    #[test]
    fn oversized_name_always_fails_bounds(extra in 1usize..100, filler in "[a-zA-Z ]{1,20}") {
        let mut ticket = sample_task();
        ticket.name = filler.repeat((crate::ticket::MAX_NAME_LEN / filler.len().max(1)) + extra);
        prop_assert!(ticket.validate_bounds().is_err());
    }
}

fn sample_task() -> Ticket {
    Ticket {
        id: TicketId::parse("t-00000001").unwrap_or_else(|e| panic!("{e}")),
        ticket_type: TicketType::Task,
        status: crate::ticket::Status::Pending,
        priority: crate::ticket::Priority::None,
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
        meta: std::collections::BTreeMap::new(),
    }
}
