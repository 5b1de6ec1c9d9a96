//! Ticket identifiers.
//!
//! A ticket id is `<prefix>-<hex>`: `prefix` names the ticket type
//! (`t`/`i`/`n`) and `hex` is an 8-digit lowercase hex encoding of a
//! random 32-bit tail, regenerated on collision against the caller's
//! known-live id set. Global uniqueness is not attempted; the only
//! contract is uniqueness within a repository's live set (see the
//! design notes on the source's global counter).

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::TixError;
use crate::ticket::TicketType;

/// Maximum length in bytes of a ticket identifier (resource bound).
pub const MAX_ID_LEN: usize = 16;

/// A validated `<prefix>-<hex>` ticket identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketId(String);

impl TicketId {
    /// Generate a fresh id for the given ticket type, retrying against
    /// `is_taken` until a free one is found.
    #[must_use]
    pub fn generate(kind: TicketType, mut is_taken: impl FnMut(&str) -> bool) -> Self {
        loop {
            let candidate = Self::random(kind);
            if !is_taken(candidate.as_str()) {
                return candidate;
            }
        }
    }

    fn random(kind: TicketType) -> Self {
        let tail: u32 = rand::thread_rng().next_u32();
        Self(format!("{}-{:08x}", kind.prefix(), tail))
    }

    /// Borrow the identifier as a plain string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The ticket type implied by this id's prefix.
    ///
    /// # Errors
    /// Returns [`TixError::Validation`] if the prefix is unrecognized
    /// (should not happen for ids that passed [`TicketId::parse`]).
    pub fn ticket_type(&self) -> Result<TicketType, TixError> {
        let prefix = self.0.split('-').next().unwrap_or_default();
        TicketType::from_prefix(prefix)
            .ok_or_else(|| TixError::Validation(format!("unknown id prefix in '{}'", self.0)))
    }

    /// Parse and validate a raw id string against `^[tin]-[0-9a-f]+$`.
    ///
    /// # Errors
    /// Returns [`TixError::Validation`] if the id does not match the
    /// expected shape, or [`TixError::Overflow`] if it exceeds
    /// [`MAX_ID_LEN`].
    pub fn parse(raw: &str) -> Result<Self, TixError> {
        if raw.len() > MAX_ID_LEN {
            return Err(TixError::Overflow(format!(
                "ticket id '{raw}' exceeds {MAX_ID_LEN} bytes"
            )));
        }
        let Some((prefix, hex)) = raw.split_once('-') else {
            return Err(TixError::Validation(format!("ticket id '{raw}' missing '-'")));
        };
        if TicketType::from_prefix(prefix).is_none() {
            return Err(TixError::Validation(format!(
                "ticket id '{raw}' has unknown prefix '{prefix}'"
            )));
        }
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(TixError::Validation(format!(
                "ticket id '{raw}' has a non-hex or empty tail"
            )));
        }
        Ok(Self(raw.to_owned()))
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TicketId {
    type Err = TixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TicketId {
    type Error = TixError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TicketId> for String {
    fn from(id: TicketId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_ids() {
        assert!(TicketId::parse("t-00000001").is_ok());
        assert!(TicketId::parse("i-deadbeef").is_ok());
        assert!(TicketId::parse("n-0").is_ok());
    }

    #[test]
    fn rejects_bad_prefix() {
        assert!(TicketId::parse("x-00000001").is_err());
    }

    #[test]
    fn rejects_uppercase_hex() {
        assert!(TicketId::parse("t-DEADBEEF").is_err());
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(TicketId::parse("t00000001").is_err());
    }

    #[test]
    fn rejects_oversized_id() {
        let long = format!("t-{}", "a".repeat(32));
        assert!(TicketId::parse(&long).is_err());
    }

    #[test]
    fn generate_retries_on_collision() {
        let mut calls = 0;
        let id = TicketId::generate(TicketType::Task, |_candidate| {
            calls += 1;
            calls < 3
        });
        assert_eq!(calls, 3);
        assert!(id.as_str().starts_with("t-"));
    }

    #[test]
    fn ticket_type_round_trips_from_prefix() {
        let id = TicketId::parse("i-00000001").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(id.ticket_type().unwrap_or_else(|e| panic!("{e}")), TicketType::Issue);
    }
}
