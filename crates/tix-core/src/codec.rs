//! Flat JSONL codec for event log lines (spec §4.1).
//!
//! Hand-rolled rather than a thin wrapper over `serde_json::Value`:
//! the wire format is not a naive serialization of [`Ticket`] — the
//! writer elides zero/empty fields and abbreviates enums to single
//! characters, and the reader must reject malformed input with a
//! `parse`-kind error rather than a generic one. `serde_json` is still
//! used, but only for the nested `meta` object (plain scalars, well
//! inside its comfort zone) and by callers that need the `sql`
//! escape-hatch output.

use std::collections::BTreeMap;

use crate::error::TixError;
use crate::event::{AcceptEvent, DeleteEvent, EventLine, RejectEvent};
use crate::ticket::{MetaValue, Priority, Status, Ticket, TicketType};

/// A parsed JSON scalar or compound value, restricted to the subset
/// the event log format uses: strings, numbers, bools, null, arrays
/// of strings, and (only under the `meta` key) an object of scalars.
#[derive(Debug, Clone, PartialEq)]
enum JsonValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    StrArray(Vec<String>),
    Meta(BTreeMap<String, MetaValue>),
}

/// A flat object: an ordered list of key/value pairs. Lookups are
/// linear, which is fine — objects are bounded to the ticket field
/// count (well under a hundred entries).
type Fields = Vec<(String, JsonValue)>;

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(s: &'a str) -> Self {
        Self { bytes: s.as_bytes(), pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, want: u8) -> Result<(), TixError> {
        match self.bump() {
            Some(b) if b == want => Ok(()),
            other => Err(TixError::Parse(format!(
                "expected '{}' at byte {}, found {:?}",
                want as char,
                self.pos.saturating_sub(1),
                other.map(|b| b as char)
            ))),
        }
    }

    fn parse_object(&mut self) -> Result<Fields, TixError> {
        self.skip_ws();
        self.expect(b'{')?;
        let mut fields = Fields::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(fields);
        }
        loop {
            self.skip_ws();
            let key = self.parse_json_string()?;
            self.skip_ws();
            self.expect(b':')?;
            self.skip_ws();
            let value = if key == "meta" {
                JsonValue::Meta(self.parse_meta_object()?)
            } else {
                self.parse_value()?
            };
            fields.push((key, value));
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(b'}') => break,
                other => {
                    return Err(TixError::Parse(format!(
                        "expected ',' or '}}' in object, found {other:?}"
                    )));
                }
            }
        }
        Ok(fields)
    }

    fn parse_meta_object(&mut self) -> Result<BTreeMap<String, MetaValue>, TixError> {
        self.skip_ws();
        self.expect(b'{')?;
        let mut map = BTreeMap::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(map);
        }
        loop {
            self.skip_ws();
            let key = self.parse_json_string()?;
            self.skip_ws();
            self.expect(b':')?;
            self.skip_ws();
            let value = match self.peek() {
                Some(b'"') => MetaValue::Text(self.parse_json_string()?),
                Some(_) => MetaValue::Num(self.parse_number_f64()?),
                None => return Err(TixError::Parse("unterminated meta object".into())),
            };
            map.insert(key, value);
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(b'}') => break,
                other => {
                    return Err(TixError::Parse(format!(
                        "expected ',' or '}}' in meta object, found {other:?}"
                    )));
                }
            }
        }
        Ok(map)
    }

    fn parse_value(&mut self) -> Result<JsonValue, TixError> {
        self.skip_ws();
        match self.peek() {
            Some(b'"') => Ok(JsonValue::Str(self.parse_json_string()?)),
            Some(b'[') => self.parse_str_array(),
            Some(b't') => self.parse_literal("true", JsonValue::Bool(true)),
            Some(b'f') => self.parse_literal("false", JsonValue::Bool(false)),
            Some(b'n') => self.parse_literal("null", JsonValue::Null),
            Some(b'-' | b'0'..=b'9') => self.parse_number(),
            other => Err(TixError::Parse(format!("unexpected value start {other:?}"))),
        }
    }

    fn parse_literal(&mut self, lit: &str, value: JsonValue) -> Result<JsonValue, TixError> {
        let end = self.pos + lit.len();
        let slice = self.bytes.get(self.pos..end);
        if slice == Some(lit.as_bytes()) {
            self.pos = end;
            Ok(value)
        } else {
            Err(TixError::Parse(format!("expected literal '{lit}'")))
        }
    }

    fn parse_str_array(&mut self) -> Result<JsonValue, TixError> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(JsonValue::StrArray(items));
        }
        loop {
            self.skip_ws();
            items.push(self.parse_json_string()?);
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(b']') => break,
                other => {
                    return Err(TixError::Parse(format!(
                        "expected ',' or ']' in array, found {other:?}"
                    )));
                }
            }
        }
        Ok(JsonValue::StrArray(items))
    }

    fn parse_number(&mut self) -> Result<JsonValue, TixError> {
        let start = self.pos;
        let mut is_float = false;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') {
            is_float = true;
            self.pos += 1;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        let slice = std::str::from_utf8(&self.bytes[start..self.pos])
            .map_err(|e| TixError::Parse(format!("non-utf8 number: {e}")))?;
        if is_float {
            slice
                .parse::<f64>()
                .map(JsonValue::Float)
                .map_err(|e| TixError::Parse(format!("bad number '{slice}': {e}")))
        } else {
            slice
                .parse::<i64>()
                .map(JsonValue::Int)
                .map_err(|e| TixError::Parse(format!("bad integer '{slice}': {e}")))
        }
    }

    fn parse_number_f64(&mut self) -> Result<f64, TixError> {
        match self.parse_number()? {
            JsonValue::Int(i) => Ok(i as f64),
            JsonValue::Float(f) => Ok(f),
            _ => unreachable!("parse_number only returns Int/Float"),
        }
    }

    fn parse_json_string(&mut self) -> Result<String, TixError> {
        self.expect(b'"')?;
        let mut out = String::new();
        loop {
            let b = self
                .bump()
                .ok_or_else(|| TixError::Parse("unterminated string".into()))?;
            match b {
                b'"' => break,
                b'\\' => {
                    let esc = self
                        .bump()
                        .ok_or_else(|| TixError::Parse("unterminated escape".into()))?;
                    match esc {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'n' => out.push('\n'),
                        b't' => out.push('\t'),
                        b'r' => out.push('\r'),
                        b'b' => out.push('\u{8}'),
                        b'f' => out.push('\u{c}'),
                        b'u' => {
                            let hex = self
                                .bytes
                                .get(self.pos..self.pos + 4)
                                .ok_or_else(|| TixError::Parse("truncated \\u escape".into()))?;
                            let hex = std::str::from_utf8(hex)
                                .map_err(|e| TixError::Parse(format!("bad \\u escape: {e}")))?;
                            let code = u32::from_str_radix(hex, 16)
                                .map_err(|e| TixError::Parse(format!("bad \\u escape: {e}")))?;
                            let ch = char::from_u32(code)
                                .ok_or_else(|| TixError::Parse("invalid unicode escape".into()))?;
                            out.push(ch);
                            self.pos += 4;
                        }
                        other => {
                            return Err(TixError::Parse(format!(
                                "unknown escape '\\{}'",
                                other as char
                            )));
                        }
                    }
                }
                _ => {
                    // Re-decode this byte and any continuation bytes as utf-8.
                    let start = self.pos - 1;
                    let ch_len = utf8_len(b);
                    let end = start + ch_len;
                    let slice = self
                        .bytes
                        .get(start..end)
                        .ok_or_else(|| TixError::Parse("truncated utf-8 sequence".into()))?;
                    let s = std::str::from_utf8(slice)
                        .map_err(|e| TixError::Parse(format!("invalid utf-8: {e}")))?;
                    out.push_str(s);
                    self.pos = end;
                }
            }
        }
        Ok(out)
    }
}

const fn utf8_len(lead: u8) -> usize {
    if lead & 0x80 == 0 {
        1
    } else if lead & 0xE0 == 0xC0 {
        2
    } else if lead & 0xF0 == 0xE0 {
        3
    } else {
        4
    }
}

fn find<'a>(fields: &'a Fields, key: &str) -> Option<&'a JsonValue> {
    fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
}

fn req_str(fields: &Fields, key: &str) -> Result<String, TixError> {
    match find(fields, key) {
        Some(JsonValue::Str(s)) => Ok(s.clone()),
        Some(_) => Err(TixError::Parse(format!("field '{key}' is not a string"))),
        None => Err(TixError::Parse(format!("missing required field '{key}'"))),
    }
}

fn opt_str(fields: &Fields, key: &str) -> Result<Option<String>, TixError> {
    match find(fields, key) {
        Some(JsonValue::Str(s)) => Ok(Some(s.clone())),
        Some(JsonValue::Null) | None => Ok(None),
        Some(_) => Err(TixError::Parse(format!("field '{key}' is not a string"))),
    }
}

fn str_or_empty(fields: &Fields, key: &str) -> Result<String, TixError> {
    Ok(opt_str(fields, key)?.unwrap_or_default())
}

fn req_i64(fields: &Fields, key: &str) -> Result<i64, TixError> {
    match find(fields, key) {
        Some(JsonValue::Int(i)) => Ok(*i),
        Some(_) => Err(TixError::Parse(format!("field '{key}' is not an integer"))),
        None => Err(TixError::Parse(format!("missing required field '{key}'"))),
    }
}

fn opt_i64(fields: &Fields, key: &str) -> Result<Option<i64>, TixError> {
    match find(fields, key) {
        Some(JsonValue::Int(i)) => Ok(Some(*i)),
        Some(JsonValue::Null) | None => Ok(None),
        Some(_) => Err(TixError::Parse(format!("field '{key}' is not an integer"))),
    }
}

fn i64_or_zero(fields: &Fields, key: &str) -> Result<i64, TixError> {
    Ok(opt_i64(fields, key)?.unwrap_or(0))
}

fn opt_f64(fields: &Fields, key: &str) -> Result<Option<f64>, TixError> {
    match find(fields, key) {
        Some(JsonValue::Float(f)) => Ok(Some(*f)),
        Some(JsonValue::Int(i)) => Ok(Some(*i as f64)),
        Some(JsonValue::Null) | None => Ok(None),
        Some(_) => Err(TixError::Parse(format!("field '{key}' is not a number"))),
    }
}

fn str_array(fields: &Fields, key: &str) -> Result<Vec<String>, TixError> {
    match find(fields, key) {
        Some(JsonValue::StrArray(v)) => Ok(v.clone()),
        Some(JsonValue::Null) | None => Ok(Vec::new()),
        Some(_) => Err(TixError::Parse(format!("field '{key}' is not a string array"))),
    }
}

fn meta_object(fields: &Fields) -> BTreeMap<String, MetaValue> {
    match find(fields, "meta") {
        Some(JsonValue::Meta(m)) => m.clone(),
        _ => BTreeMap::new(),
    }
}

/// Cheaply extract just the `t` discriminator of a line without
/// decoding the rest of the object. Used by compaction's preserved-
/// block scan so non-owned lines never parse as a [`Ticket`].
///
/// # Errors
/// Returns [`TixError::Parse`] if the line is not a well-formed
/// object or has no string-valued `t` field.
pub fn peek_discriminator(line: &str) -> Result<String, TixError> {
    let mut reader = Reader::new(line);
    reader.skip_ws();
    reader.expect(b'{')?;
    loop {
        reader.skip_ws();
        if reader.peek() == Some(b'}') {
            break;
        }
        let key = reader.parse_json_string()?;
        reader.skip_ws();
        reader.expect(b':')?;
        reader.skip_ws();
        if key == "t" {
            return reader.parse_json_string();
        }
        let _ = if key == "meta" {
            JsonValue::Meta(reader.parse_meta_object()?)
        } else {
            reader.parse_value()?
        };
        reader.skip_ws();
        match reader.bump() {
            Some(b',') => continue,
            Some(b'}') => break,
            other => {
                return Err(TixError::Parse(format!(
                    "expected ',' or '}}' in object, found {other:?}"
                )));
            }
        }
    }
    Err(TixError::Parse("line has no 't' discriminator".into()))
}

fn ticket_type_from_fields(ty: &str) -> Result<TicketType, TixError> {
    TicketType::from_tql_token(ty)
        .ok_or_else(|| TixError::Parse(format!("unknown ticket type '{ty}'")))
}

fn status_from_fields(fields: &Fields) -> Result<Status, TixError> {
    let tag = str_or_empty(fields, "s")?;
    if tag.is_empty() {
        return Ok(Status::Pending);
    }
    Status::from_wire_tag(&tag).ok_or_else(|| TixError::Parse(format!("unknown status tag '{tag}'")))
}

fn priority_from_fields(fields: &Fields) -> Result<Priority, TixError> {
    let tag = str_or_empty(fields, "pr")?;
    if tag.is_empty() {
        return Ok(Priority::None);
    }
    Priority::from_wire_tag(&tag)
        .ok_or_else(|| TixError::Parse(format!("unknown priority tag '{tag}'")))
}

fn ticket_from_fields(fields: &Fields, ticket_type: TicketType) -> Result<Ticket, TixError> {
    use crate::id::TicketId;

    let id = TicketId::parse(&req_str(fields, "id")?)?;
    let created_at = req_i64(fields, "created_at")?;
    let updated_at = i64_or_zero(fields, "updated_at").map(|v| if v == 0 { created_at } else { v })?;
    Ok(Ticket {
        id,
        ticket_type,
        status: status_from_fields(fields)?,
        priority: priority_from_fields(fields)?,
        name: req_str(fields, "name")?,
        spec: opt_str(fields, "spec")?,
        notes: str_or_empty(fields, "notes")?,
        accept: str_or_empty(fields, "accept")?,
        done_at: opt_str(fields, "done_at")?,
        branch: opt_str(fields, "branch")?,
        parent: opt_str(fields, "parent")?.map(|s| TicketId::parse(&s)).transpose()?,
        created_from: opt_str(fields, "created_from")?
            .map(|s| TicketId::parse(&s))
            .transpose()?,
        supersedes: opt_str(fields, "supersedes")?
            .map(|s| TicketId::parse(&s))
            .transpose()?,
        deps: str_array(fields, "deps")?
            .into_iter()
            .map(|s| TicketId::parse(&s))
            .collect::<Result<Vec<_>, _>>()?,
        created_from_name: str_or_empty(fields, "created_from_name")?,
        supersedes_name: str_or_empty(fields, "supersedes_name")?,
        supersedes_reason: str_or_empty(fields, "supersedes_reason")?,
        kill_reason: str_or_empty(fields, "kill_reason")?,
        labels: str_array(fields, "labels")?,
        author: opt_str(fields, "author")?,
        completed_at: opt_str(fields, "completed_at")?,
        cost: opt_f64(fields, "cost")?,
        tokens_in: opt_i64(fields, "tokens_in")?,
        tokens_out: opt_i64(fields, "tokens_out")?,
        iterations: opt_i64(fields, "iterations")?,
        model: opt_str(fields, "model")?,
        retries: opt_i64(fields, "retries")?,
        kill_count: opt_i64(fields, "kill_count")?,
        created_at,
        updated_at,
        resolved_at: i64_or_zero(fields, "resolved_at")?,
        compacted_at: i64_or_zero(fields, "compacted_at")?,
        meta: meta_object(fields),
    })
}

/// Decode one event log line.
///
/// # Errors
/// Returns [`TixError::Parse`] on malformed JSON or a tix-owned
/// discriminator whose payload fails to decode. Lines with any other
/// discriminator are returned as [`EventLine::Other`] without being
/// fully parsed.
pub fn decode_line(line: &str) -> Result<EventLine, TixError> {
    let discriminator = peek_discriminator(line)?;
    match discriminator.as_str() {
        "task" | "issue" | "note" => {
            let fields = Reader::new(line).parse_object()?;
            let ty = ticket_type_from_fields(&discriminator)?;
            let ticket = ticket_from_fields(&fields, ty)?;
            Ok(match ty {
                TicketType::Task => EventLine::Task(ticket),
                TicketType::Issue => EventLine::Issue(ticket),
                TicketType::Note => EventLine::Note(ticket),
            })
        }
        "accept" => {
            let fields = Reader::new(line).parse_object()?;
            Ok(EventLine::Accept(AcceptEvent {
                id: req_str(&fields, "id")?,
                done_at: opt_str(&fields, "done_at")?,
                timestamp: req_i64(&fields, "timestamp")?,
            }))
        }
        "reject" => {
            let fields = Reader::new(line).parse_object()?;
            Ok(EventLine::Reject(RejectEvent {
                id: req_str(&fields, "id")?,
                reason: str_or_empty(&fields, "reason")?,
                timestamp: req_i64(&fields, "timestamp")?,
            }))
        }
        "delete" => {
            let fields = Reader::new(line).parse_object()?;
            Ok(EventLine::Delete(DeleteEvent {
                id: req_str(&fields, "id")?,
                timestamp: req_i64(&fields, "timestamp")?,
            }))
        }
        _ => Ok(EventLine::Other(line.to_owned())),
    }
}

/// Escape a string for embedding in a JSON line per spec §4.1.
fn escape_json(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn push_str_field(out: &mut String, key: &str, value: &str) {
    out.push_str(",\"");
    out.push_str(key);
    out.push_str("\":");
    escape_json(value, out);
}

fn push_opt_str_field(out: &mut String, key: &str, value: Option<&str>) {
    if let Some(v) = value {
        if !v.is_empty() {
            push_str_field(out, key, v);
        }
    }
}

fn push_int_field(out: &mut String, key: &str, value: i64) {
    out.push_str(",\"");
    out.push_str(key);
    out.push_str("\":");
    out.push_str(&value.to_string());
}

fn push_opt_int_field(out: &mut String, key: &str, value: Option<i64>) {
    if let Some(v) = value {
        push_int_field(out, key, v);
    }
}

fn push_opt_f64_field(out: &mut String, key: &str, value: Option<f64>) {
    if let Some(v) = value {
        out.push_str(",\"");
        out.push_str(key);
        out.push_str("\":");
        out.push_str(&format!("{v}"));
    }
}

fn push_str_array_field(out: &mut String, key: &str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    out.push_str(",\"");
    out.push_str(key);
    out.push_str("\":[");
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        escape_json(v, out);
    }
    out.push(']');
}

fn push_meta_field(out: &mut String, meta: &BTreeMap<String, MetaValue>) {
    if meta.is_empty() {
        return;
    }
    out.push_str(",\"meta\":{");
    for (i, (k, v)) in meta.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        escape_json(k, out);
        out.push(':');
        match v {
            MetaValue::Text(t) => escape_json(t, out),
            MetaValue::Num(n) => out.push_str(&n.to_string()),
        }
    }
    out.push('}');
}

/// Encode a ticket as a single canonical event log line.
///
/// Zero/empty optional fields are elided to keep lines short; the
/// discriminator is the ticket's [`TicketType`] wire tag.
#[must_use]
pub fn encode_ticket(ticket: &Ticket) -> String {
    let mut out = String::with_capacity(256);
    out.push_str("{\"t\":\"");
    out.push_str(ticket.ticket_type.wire_tag());
    out.push('"');
    push_str_field(&mut out, "id", ticket.id.as_str());
    if ticket.status != Status::Pending {
        push_str_field(&mut out, "s", ticket.status.wire_tag());
    }
    if ticket.priority != Priority::None {
        push_str_field(&mut out, "pr", ticket.priority.wire_tag());
    }
    push_str_field(&mut out, "name", &ticket.name);
    push_opt_str_field(&mut out, "spec", ticket.spec.as_deref());
    push_opt_str_field(&mut out, "notes", Some(ticket.notes.as_str()));
    push_opt_str_field(&mut out, "accept", Some(ticket.accept.as_str()));
    push_opt_str_field(&mut out, "done_at", ticket.done_at.as_deref());
    push_opt_str_field(&mut out, "branch", ticket.branch.as_deref());
    push_opt_str_field(&mut out, "parent", ticket.parent.as_ref().map(|p| p.as_str()));
    push_opt_str_field(
        &mut out,
        "created_from",
        ticket.created_from.as_ref().map(|p| p.as_str()),
    );
    push_opt_str_field(
        &mut out,
        "supersedes",
        ticket.supersedes.as_ref().map(|p| p.as_str()),
    );
    let dep_strs: Vec<String> = ticket.deps.iter().map(ToString::to_string).collect();
    push_str_array_field(&mut out, "deps", &dep_strs);
    push_opt_str_field(&mut out, "created_from_name", Some(ticket.created_from_name.as_str()));
    push_opt_str_field(&mut out, "supersedes_name", Some(ticket.supersedes_name.as_str()));
    push_opt_str_field(&mut out, "supersedes_reason", Some(ticket.supersedes_reason.as_str()));
    push_opt_str_field(&mut out, "kill_reason", Some(ticket.kill_reason.as_str()));
    push_str_array_field(&mut out, "labels", &ticket.labels);
    push_opt_str_field(&mut out, "author", ticket.author.as_deref());
    push_opt_str_field(&mut out, "completed_at", ticket.completed_at.as_deref());
    push_opt_f64_field(&mut out, "cost", ticket.cost);
    push_opt_int_field(&mut out, "tokens_in", ticket.tokens_in);
    push_opt_int_field(&mut out, "tokens_out", ticket.tokens_out);
    push_opt_int_field(&mut out, "iterations", ticket.iterations);
    push_opt_str_field(&mut out, "model", ticket.model.as_deref());
    push_opt_int_field(&mut out, "retries", ticket.retries);
    push_opt_int_field(&mut out, "kill_count", ticket.kill_count);
    push_int_field(&mut out, "created_at", ticket.created_at);
    push_int_field(&mut out, "updated_at", ticket.updated_at);
    if ticket.resolved_at != 0 {
        push_int_field(&mut out, "resolved_at", ticket.resolved_at);
    }
    if ticket.compacted_at != 0 {
        push_int_field(&mut out, "compacted_at", ticket.compacted_at);
    }
    push_meta_field(&mut out, &ticket.meta);
    out.push('}');
    out
}

/// Encode an accept event.
#[must_use]
pub fn encode_accept(event: &AcceptEvent) -> String {
    let mut out = String::from("{\"t\":\"accept\"");
    push_str_field(&mut out, "id", &event.id);
    push_opt_str_field(&mut out, "done_at", event.done_at.as_deref());
    push_int_field(&mut out, "timestamp", event.timestamp);
    out.push('}');
    out
}

/// Encode a reject event.
#[must_use]
pub fn encode_reject(event: &RejectEvent) -> String {
    let mut out = String::from("{\"t\":\"reject\"");
    push_str_field(&mut out, "id", &event.id);
    push_opt_str_field(&mut out, "reason", Some(event.reason.as_str()));
    push_int_field(&mut out, "timestamp", event.timestamp);
    out.push('}');
    out
}

/// Encode a delete marker.
#[must_use]
pub fn encode_delete(event: &DeleteEvent) -> String {
    let mut out = String::from("{\"t\":\"delete\"");
    push_str_field(&mut out, "id", &event.id);
    push_int_field(&mut out, "timestamp", event.timestamp);
    out.push('}');
    out
}

/// Encode any event line, dispatching on its variant. `Other` lines
/// are returned verbatim.
#[must_use]
pub fn encode_line(event: &EventLine) -> String {
    match event {
        EventLine::Task(t) | EventLine::Issue(t) | EventLine::Note(t) => encode_ticket(t),
        EventLine::Accept(e) => encode_accept(e),
        EventLine::Reject(e) => encode_reject(e),
        EventLine::Delete(e) => encode_delete(e),
        EventLine::Other(raw) => raw.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::TicketId;

    fn sample_ticket() -> Ticket {
        Ticket {
            id: TicketId::parse("t-0000abcd").unwrap_or_else(|e| panic!("{e}")),
            ticket_type: TicketType::Task,
            status: Status::Pending,
            priority: Priority::High,
            name: "fix the thing".into(),
            spec: Some("docs/spec.md".into()),
            notes: "some notes\nwith a newline".into(),
            accept: "it builds".into(),
            done_at: None,
            branch: None,
            parent: None,
            created_from: None,
            supersedes: None,
            deps: vec![TicketId::parse("t-00000001").unwrap_or_else(|e| panic!("{e}"))],
            created_from_name: String::new(),
            supersedes_name: String::new(),
            supersedes_reason: String::new(),
            kill_reason: String::new(),
            labels: vec!["backend".into(), "urgent".into()],
            author: Some("agent-7".into()),
            completed_at: None,
            cost: Some(0.42),
            tokens_in: Some(100),
            tokens_out: Some(200),
            iterations: None,
            model: None,
            retries: None,
            kill_count: None,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_100,
            resolved_at: 0,
            compacted_at: 0,
            meta: BTreeMap::new(),
        }
    }

    #[test]
    fn ticket_round_trips() {
        let ticket = sample_ticket();
        let line = encode_ticket(&ticket);
        let decoded = decode_line(&line).unwrap_or_else(|e| panic!("{e}"));
        match decoded {
            EventLine::Task(t) => assert_eq!(t, ticket),
            other => panic!("expected Task, got {other:?}"),
        }
    }

    #[test]
    fn ticket_with_meta_round_trips() {
        let mut ticket = sample_ticket();
        ticket.compacted_at = 1_700_000_200;
        ticket
            .meta
            .insert("retry_strategy".into(), MetaValue::Text("exponential".into()));
        ticket.meta.insert("budget_usd".into(), MetaValue::Num(12.5));
        let line = encode_ticket(&ticket);
        let decoded = decode_line(&line).unwrap_or_else(|e| panic!("{e}"));
        match decoded {
            EventLine::Task(t) => assert_eq!(t, ticket),
            other => panic!("expected Task, got {other:?}"),
        }
    }

    #[test]
    fn peek_discriminator_does_not_require_full_parse() {
        let line = r#"{"t":"stage","name":"plan","bogus":[}"#;
        assert_eq!(peek_discriminator(line).unwrap_or_else(|e| panic!("{e}")), "stage");
    }

    #[test]
    fn other_lines_pass_through_untouched() {
        let line = r#"{"t":"stage","name":"plan"}"#;
        let decoded = decode_line(line).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(decoded, EventLine::Other(line.to_owned()));
    }

    #[test]
    fn unclosed_string_is_a_parse_error() {
        let line = r#"{"t":"task","id":"t-00000001","name":"oops"#;
        assert!(decode_line(line).is_err());
    }

    #[test]
    fn accept_event_round_trips() {
        let event = AcceptEvent {
            id: "t-00000001".into(),
            done_at: Some("deadbee".into()),
            timestamp: 1_700_000_300,
        };
        let line = encode_accept(&event);
        match decode_line(&line).unwrap_or_else(|e| panic!("{e}")) {
            EventLine::Accept(decoded) => assert_eq!(decoded, event),
            other => panic!("expected Accept, got {other:?}"),
        }
    }

    #[test]
    fn escapes_control_characters() {
        let mut ticket = sample_ticket();
        ticket.name = "tab\there".into();
        let line = encode_ticket(&ticket);
        assert!(line.contains("\\t"));
        let decoded = decode_line(&line).unwrap_or_else(|e| panic!("{e}"));
        match decoded {
            EventLine::Task(t) => assert_eq!(t.name, "tab\there"),
            other => panic!("expected Task, got {other:?}"),
        }
    }
}
