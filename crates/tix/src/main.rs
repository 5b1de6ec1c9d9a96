//! CLI entry point for `tix`.
//!
//! Owns argument parsing and process exit codes only; every
//! subcommand below shapes its arguments into a call against
//! [`commands`] and prints whatever JSON value comes back. No
//! business logic lives here (spec §1, out of scope list; §6.3).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tix_core::{Priority, TicketType, TixError};
use tix_log::BranchScope;
use tracing_subscriber::EnvFilter;

mod app;
mod commands;
mod config;

use app::App;
use commands::NewTicketInput;

/// `tix`: a git-native ticketing engine.
#[derive(Parser, Debug)]
#[command(name = "tix", version, about = "Git-native ticketing engine: JSONL event log, SQLite cache, TQL query compiler")]
struct Cli {
    /// Path to the repository or any subdirectory of it (defaults to the current directory).
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

/// Shared fields for `task add` / `issue add` / `note add`.
#[derive(clap::Args, Debug)]
struct AddArgs {
    /// Short human-readable name. Required.
    #[arg(long)]
    name: String,
    /// Optional pointer to a spec document.
    #[arg(long)]
    spec: Option<String>,
    /// Free-form notes.
    #[arg(long, default_value = "")]
    notes: String,
    /// Testable acceptance criterion.
    #[arg(long, default_value = "")]
    accept: String,
    /// Priority: none, low, medium, high.
    #[arg(long, default_value = "none")]
    priority: String,
    /// Parent ticket id.
    #[arg(long)]
    parent: Option<String>,
    /// Ticket id this one was created from.
    #[arg(long = "created-from")]
    created_from: Option<String>,
    /// Ticket id this one supersedes.
    #[arg(long)]
    supersedes: Option<String>,
    /// Dependency ticket ids (tasks only may declare these).
    #[arg(long = "dep")]
    deps: Vec<String>,
    /// Labels.
    #[arg(long = "label")]
    labels: Vec<String>,
}

impl AddArgs {
    fn into_input(self) -> anyhow::Result<NewTicketInput> {
        let priority = Priority::from_tql_token(&self.priority)
            .ok_or_else(|| TixError::InvalidArg(format!("unknown priority '{}'", self.priority)))?;
        Ok(NewTicketInput {
            name: self.name,
            spec: self.spec,
            notes: self.notes,
            accept: self.accept,
            priority,
            parent: self.parent,
            created_from: self.created_from,
            supersedes: self.supersedes,
            deps: self.deps,
            labels: self.labels,
        })
    }
}

#[derive(Subcommand, Debug)]
enum TicketCommand {
    /// Create a new ticket of this type.
    Add(AddArgs),
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create/mutate tasks.
    #[command(subcommand)]
    Task(TicketCommand),
    /// Create/mutate issues.
    #[command(subcommand)]
    Issue(TicketCommand),
    /// Create/mutate notes.
    #[command(subcommand)]
    Note(TicketCommand),

    /// Mark a task done, pending review.
    Done {
        /// Ticket id.
        id: String,
        /// Short commit hash the task was completed at.
        #[arg(long = "done-at")]
        done_at: String,
        /// Branch name at completion time.
        #[arg(long)]
        branch: Option<String>,
    },
    /// Accept a done task.
    Accept {
        /// Ticket id.
        id: String,
    },
    /// Reject a done task, returning it to pending.
    Reject {
        /// Ticket id.
        id: String,
        /// Rejection reason.
        #[arg(long)]
        reason: String,
    },
    /// Delete a ticket.
    Delete {
        /// Ticket id.
        id: String,
    },
    /// Change a ticket's priority.
    Prioritize {
        /// Ticket id.
        id: String,
        /// New priority: none, low, medium, high.
        #[arg(long)]
        priority: String,
    },

    /// Apply a batch of add/delete operations from a JSON array.
    Ingest {
        /// Read the JSON array from this file instead of `--batch`.
        #[arg(long)]
        file: Option<PathBuf>,
        /// The JSON array literal.
        #[arg(long)]
        batch: Option<String>,
    },

    /// Run a TQL pipeline against the cache.
    Query {
        /// The pipe-separated query string.
        tql: String,
    },
    /// Run operator-provided raw SQL against the cache (no untrusted input).
    Sql {
        /// The raw SQL statement.
        sql: String,
    },

    /// Rebuild the cache by walking git history.
    Sync {
        /// Walk a specific named branch.
        #[arg(long, conflicts_with_all = ["current", "all"])]
        branch: Option<String>,
        /// Walk only the currently checked out branch (default).
        #[arg(long)]
        current: bool,
        /// Walk every local branch.
        #[arg(long)]
        all: bool,
    },
    /// Sync, denormalize cross-refs, stamp `compacted_at`, and rewrite the log.
    Compact,
    /// Run read-only integrity checks over the cache.
    Validate,
    /// Print a summary report (alias of `report`).
    Status,
    /// Print a summary report: counts, velocity, actors, models.
    Report {
        /// Only count resolutions at or after this unix timestamp.
        #[arg(long, default_value_t = 0)]
        since: i64,
    },
    /// Print the tail of the raw event log.
    Log {
        /// Maximum number of lines to print.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print a ticket and its resolved dependency tree.
    Tree {
        /// Root ticket id.
        id: String,
    },
    /// Rank tickets by keyword match against name/accept/notes.
    Search {
        /// Free-text query.
        text: String,
    },
}

fn ticket_type_of(cmd: &Command) -> Option<TicketType> {
    match cmd {
        Command::Task(_) => Some(TicketType::Task),
        Command::Issue(_) => Some(TicketType::Issue),
        Command::Note(_) => Some(TicketType::Note),
        _ => None,
    }
}

fn run(cli: Cli) -> anyhow::Result<serde_json::Value> {
    let repo_start = cli.repo.unwrap_or_else(|| PathBuf::from("."));
    let mut app = App::open(&repo_start)?;

    if let Some(ticket_type) = ticket_type_of(&cli.cmd) {
        let TicketCommand::Add(args) = match cli.cmd {
            Command::Task(sub) | Command::Issue(sub) | Command::Note(sub) => sub,
            _ => unreachable!("ticket_type_of only returns Some for Task/Issue/Note"),
        };
        return commands::add_ticket(&mut app, ticket_type, args.into_input()?);
    }

    match cli.cmd {
        Command::Task(_) | Command::Issue(_) | Command::Note(_) => unreachable!("handled above"),
        Command::Done { id, done_at, branch } => commands::mark_done(&mut app, &id, &done_at, branch),
        Command::Accept { id } => commands::accept(&mut app, &id),
        Command::Reject { id, reason } => commands::reject(&mut app, &id, &reason),
        Command::Delete { id } => commands::delete(&mut app, &id),
        Command::Prioritize { id, priority } => {
            let priority = Priority::from_tql_token(&priority)
                .ok_or_else(|| TixError::InvalidArg(format!("unknown priority '{priority}'")))?;
            commands::prioritize(&mut app, &id, priority)
        }
        Command::Ingest { file, batch } => {
            let json_array = match (file, batch) {
                (Some(path), None) => std::fs::read_to_string(&path)
                    .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?,
                (None, Some(batch)) => batch,
                _ => anyhow::bail!(TixError::InvalidArg("ingest requires exactly one of --file or --batch".into())),
            };
            commands::ingest(&mut app, &json_array)
        }
        Command::Query { tql } => commands::run_query(&app, &tql),
        Command::Sql { sql } => commands::run_sql(&app, &sql),
        Command::Sync { branch, current: _, all } => {
            let scope = match (branch, all) {
                (Some(name), false) => BranchScope::Named(name),
                (None, true) => BranchScope::All,
                (None, false) => BranchScope::Current,
                (Some(_), true) => anyhow::bail!(TixError::InvalidArg("sync: --branch and --all are mutually exclusive".into())),
            };
            commands::sync(&mut app, scope)
        }
        Command::Compact => commands::compact(&mut app),
        Command::Validate => commands::validate(&app),
        Command::Status => commands::status(&app, 0),
        Command::Report { since } => commands::report(&app, since),
        Command::Log { limit } => commands::log_excerpt(&app, limit),
        Command::Tree { id } => commands::tree(&app, &id),
        Command::Search { text } => commands::search(&app, &text),
    }
}

fn install_tracing() {
    let filter = EnvFilter::try_from_env("TIX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).compact().try_init();
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<TixError>().map_or(1, |e| e.kind().exit_code())
}

fn main() -> ExitCode {
    install_tracing();
    let cli = Cli::parse();
    match run(cli) {
        Ok(value) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            ExitCode::from(exit_code_for(&err) as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_task_add() {
        let cli = Cli::parse_from(["tix", "task", "add", "--name", "fix bug", "--priority", "high"]);
        match cli.cmd {
            Command::Task(TicketCommand::Add(args)) => {
                assert_eq!(args.name, "fix bug");
                assert_eq!(args.priority, "high");
            }
            other => panic!("expected task add, got {other:?}"),
        }
    }

    #[test]
    fn parses_done_with_branch() {
        let cli = Cli::parse_from(["tix", "done", "t-00000001", "--done-at", "abc123", "--branch", "main"]);
        match cli.cmd {
            Command::Done { id, done_at, branch } => {
                assert_eq!(id, "t-00000001");
                assert_eq!(done_at, "abc123");
                assert_eq!(branch.as_deref(), Some("main"));
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[test]
    fn parses_query() {
        let cli = Cli::parse_from(["tix", "query", "tasks | status=pending | limit 5"]);
        match cli.cmd {
            Command::Query { tql } => assert_eq!(tql, "tasks | status=pending | limit 5"),
            other => panic!("expected query, got {other:?}"),
        }
    }

    #[test]
    fn parses_sync_scopes() {
        let cli = Cli::parse_from(["tix", "sync", "--all"]);
        match cli.cmd {
            Command::Sync { branch, current, all } => {
                assert!(branch.is_none());
                assert!(!current);
                assert!(all);
            }
            other => panic!("expected sync, got {other:?}"),
        }
    }

    #[test]
    fn exit_code_maps_taxonomy() {
        let err = anyhow::Error::new(TixError::NotFound("t-00000001".into()));
        assert_eq!(exit_code_for(&err), 2);
    }
}
