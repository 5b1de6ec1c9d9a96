//! Search index (spec §4.9): tokenize `name`/`accept`/`notes` into
//! weighted keywords on upsert, rank with `SUM(weight)` on query.

use std::collections::HashMap;

use rusqlite::{Connection, params};
use tix_core::{Ticket, TixError};

/// Maximum results returned by [`search`].
pub const MAX_RESULTS: usize = 20;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it", "its", "of", "on",
    "that", "the", "to", "was", "were", "will", "with",
];

const NAME_WEIGHT: f64 = 3.0;
const ACCEPT_WEIGHT: f64 = 2.0;
const NOTES_WEIGHT: f64 = 1.0;

/// Split `text` on whitespace and punctuation, lowercase, drop
/// stop-words and tokens shorter than 2 bytes.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|t| t.len() >= 2 && !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

fn accumulate(weights: &mut HashMap<String, f64>, text: &str, weight: f64) {
    for token in tokenize(text) {
        *weights.entry(token).or_insert(0.0) += weight;
    }
}

/// Re-derive and write `keywords` rows for one ticket. Callers are
/// expected to have already deleted this ticket's prior rows as part
/// of the same upsert (see [`crate::project::upsert_ticket`]).
///
/// # Errors
/// Returns [`TixError::Db`] on any underlying query failure.
pub fn index_ticket(conn: &Connection, ticket: &Ticket) -> Result<(), TixError> {
    conn.execute("DELETE FROM keywords WHERE ticket_id = ?1", params![ticket.id.as_str()])
        .map_err(|e| TixError::Db(format!("clear keywords for {}: {e}", ticket.id)))?;

    let mut weights = HashMap::new();
    accumulate(&mut weights, &ticket.name, NAME_WEIGHT);
    accumulate(&mut weights, &ticket.accept, ACCEPT_WEIGHT);
    accumulate(&mut weights, &ticket.notes, NOTES_WEIGHT);

    for (keyword, weight) in weights {
        conn.execute(
            "INSERT INTO keywords (ticket_id, keyword, weight) VALUES (?1, ?2, ?3)",
            params![ticket.id.as_str(), keyword, weight],
        )
        .map_err(|e| TixError::Db(format!("index keyword for {}: {e}", ticket.id)))?;
    }
    Ok(())
}

/// A ranked search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// The matching ticket's id.
    pub ticket_id: String,
    /// Summed weight across matched query tokens.
    pub score: f64,
}

/// Rank tickets by summed keyword weight against the tokenized query,
/// returning at most [`MAX_RESULTS`] hits.
///
/// # Errors
/// Returns [`TixError::Db`] on any underlying query failure, or
/// [`TixError::InvalidArg`] if the query tokenizes to nothing.
pub fn search(conn: &Connection, query: &str) -> Result<Vec<SearchHit>, TixError> {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return Err(TixError::InvalidArg("search query has no searchable tokens".into()));
    }
    let placeholders = tokens.iter().map(|_| "?").collect::<Vec<_>>().join(",");
    let sql = format!(
        "SELECT ticket_id, SUM(weight) as score FROM keywords
         WHERE keyword IN ({placeholders})
         GROUP BY ticket_id
         ORDER BY score DESC
         LIMIT {MAX_RESULTS}"
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| TixError::Db(format!("prepare search query: {e}")))?;
    let params = rusqlite::params_from_iter(tokens.iter());
    let rows = stmt
        .query_map(params, |row| {
            Ok(SearchHit {
                ticket_id: row.get(0)?,
                score: row.get(1)?,
            })
        })
        .map_err(|e| TixError::Db(format!("run search query: {e}")))?;
    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| TixError::Db(format!("read search results: {e}")))
}
