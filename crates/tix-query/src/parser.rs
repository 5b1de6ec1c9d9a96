//! Hand-rolled TQL tokenizer and stage parser (spec §4.10).
//!
//! No parser-combinator crate: a query is short, line-oriented, and
//! the grammar is a flat sequence of `|`-separated stages, so a single
//! pass over the characters is simpler than a combinator graph.

use tix_core::TixError;

use crate::types::{AggregateKind, CompareOp, Filter, FilterValue, Pipeline, Source, SortKey};

/// Split `s` on every unquoted occurrence where `is_sep` holds,
/// dropping empty tokens (so runs of whitespace collapse). A `"..."`
/// span is opaque to the separator test; `\` escapes the next
/// character while inside quotes.
fn split_unquoted(s: &str, is_sep: impl Fn(char) -> bool) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '"' {
            in_quotes = !in_quotes;
            current.push(c);
        } else if in_quotes && c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if !in_quotes && is_sep(c) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn unquote(raw: &str) -> String {
    let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) else {
        return raw.to_owned();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn parse_value(raw: &str) -> FilterValue {
    if raw.is_empty() {
        return FilterValue::Null;
    }
    if raw.starts_with('"') {
        return FilterValue::Single(unquote(raw));
    }
    if raw.contains(',') {
        return FilterValue::List(raw.split(',').map(str::to_owned).filter(|v| !v.is_empty()).collect());
    }
    FilterValue::Single(raw.to_owned())
}

/// Parse one whitespace-delimited token of a filter-list stage into a
/// [`Filter`]: `['!'] field op value`.
fn parse_filter_token(token: &str) -> Result<Filter, TixError> {
    let (negate, rest) = match token.strip_prefix('!') {
        Some(r) if !r.is_empty() => (true, r),
        _ => (false, token),
    };

    let field_end = rest.find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.')).unwrap_or(rest.len());
    if field_end == 0 {
        return Err(TixError::Parse(format!("missing field name in filter `{token}`")));
    }
    let field = rest[..field_end].to_owned();
    let after_field = &rest[field_end..];

    let (op, op_len) = CompareOp::from_prefix(after_field)
        .ok_or_else(|| TixError::Parse(format!("unrecognized operator in filter `{token}`")))?;
    let value = parse_value(&after_field[op_len..]);

    Ok(Filter { field, negate, op, value })
}

fn parse_sort_field(part: &str) -> Result<SortKey, TixError> {
    let mut words = part.split_whitespace();
    let field = words.next().ok_or_else(|| TixError::Parse("empty sort field".into()))?.to_owned();
    let desc = match words.next() {
        None | Some("asc") => false,
        Some("desc") => true,
        Some(other) => return Err(TixError::Parse(format!("unknown sort direction `{other}`"))),
    };
    Ok(SortKey { field, desc })
}

fn parse_int_arg(words: &[String], stage: &str) -> Result<i64, TixError> {
    words
        .get(1)
        .ok_or_else(|| TixError::Parse(format!("`{stage}` requires a numeric argument")))?
        .parse()
        .map_err(|_| TixError::Parse(format!("`{stage}` argument is not an integer")))
}

fn parse_stage(stage: &str, pipeline: &mut Pipeline) -> Result<(), TixError> {
    let trimmed = stage.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    let words = split_unquoted(trimmed, char::is_whitespace);
    let Some(keyword) = words.first().map(String::as_str) else { return Ok(()) };

    match keyword {
        "select" => {
            let rest = trimmed[keyword.len()..].trim();
            for field in rest.split(',').map(str::trim).filter(|f| !f.is_empty()) {
                pipeline.push_select(field.to_owned())?;
            }
        }
        "group" => {
            let field = words.get(1).ok_or_else(|| TixError::Parse("`group` requires a field".into()))?;
            pipeline.group = Some(field.clone());
        }
        "distinct" => pipeline.distinct = true,
        "all" if words.len() == 1 => pipeline.all_scope = true,
        "having" => {
            for token in &words[1..] {
                pipeline.push_having(parse_filter_token(token)?)?;
            }
        }
        "count" => pipeline.push_aggregate(AggregateKind::Count)?,
        "count_distinct" => {
            let field = words.get(1).ok_or_else(|| TixError::Parse("`count_distinct` requires a field".into()))?;
            pipeline.push_aggregate(AggregateKind::CountDistinct(field.clone()))?;
        }
        "sum" | "avg" | "min" | "max" => {
            let field = words
                .get(1)
                .ok_or_else(|| TixError::Parse(format!("`{keyword}` requires a field")))?
                .clone();
            let kind = match keyword {
                "sum" => AggregateKind::Sum(field),
                "avg" => AggregateKind::Avg(field),
                "min" => AggregateKind::Min(field),
                _ => AggregateKind::Max(field),
            };
            pipeline.push_aggregate(kind)?;
        }
        "sort" => {
            let rest = trimmed[keyword.len()..].trim();
            for part in rest.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                pipeline.push_sort(parse_sort_field(part)?)?;
            }
        }
        "limit" => pipeline.limit = Some(parse_int_arg(&words, "limit")?),
        "offset" => pipeline.offset = Some(parse_int_arg(&words, "offset")?),
        _ => {
            for token in &words {
                pipeline.push_filter(parse_filter_token(token)?)?;
            }
        }
    }
    Ok(())
}

/// Parse a full TQL query string into a [`Pipeline`].
///
/// # Errors
/// Returns [`TixError::Parse`] on a malformed source/stage, or
/// [`TixError::Overflow`] when a stage exceeds its bound.
pub fn parse(query: &str) -> Result<Pipeline, TixError> {
    let segments = split_unquoted(query, |c| c == '|');
    let mut iter = segments.into_iter();
    let source_token = iter.next().ok_or_else(|| TixError::Parse("empty query".into()))?;
    let source_token = source_token.trim();
    let source = Source::from_token(source_token)
        .ok_or_else(|| TixError::Parse(format!("unknown source `{source_token}`")))?;

    let mut pipeline = Pipeline::new(source);
    for segment in iter {
        parse_stage(&segment, &mut pipeline)?;
    }
    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_and_filter_stages() {
        let pipeline = parse("tasks | status=pending priority=high | label=blocked | limit 5")
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(pipeline.source, Source::Tasks);
        assert_eq!(pipeline.filters.len(), 3);
        assert_eq!(pipeline.limit, Some(5));
        assert!(pipeline.explicit_status);
    }

    #[test]
    fn negation_prefix_and_not_equal_both_parse() {
        let pipeline = parse("tickets | !label=blocked name!=foo").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(pipeline.filters[0].field, "label");
        assert!(pipeline.filters[0].negate);
        assert_eq!(pipeline.filters[1].op, CompareOp::NotEq);
        assert!(!pipeline.filters[1].negate);
    }

    #[test]
    fn quoted_value_preserves_whitespace_and_pipes() {
        let pipeline = parse(r#"tickets | name="release | notes""#).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(pipeline.filters[0].value, FilterValue::Single("release | notes".to_owned()));
    }

    #[test]
    fn comma_separated_value_becomes_a_list() {
        let pipeline = parse("tickets | status=pending,done").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            pipeline.filters[0].value,
            FilterValue::List(vec!["pending".to_owned(), "done".to_owned()])
        );
    }

    #[test]
    fn empty_value_is_null() {
        let pipeline = parse("tickets | spec=").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(pipeline.filters[0].value, FilterValue::Null);
    }

    #[test]
    fn sort_stage_parses_direction() {
        let pipeline = parse("tickets | sort priority desc, name").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(pipeline.sort[0], SortKey { field: "priority".into(), desc: true });
        assert_eq!(pipeline.sort[1], SortKey { field: "name".into(), desc: false });
    }

    #[test]
    fn unknown_source_is_a_parse_error() {
        assert!(parse("bogus | status=pending").is_err());
    }

    #[test]
    fn overflowing_filter_bound_errors() {
        let stage = (0..20).map(|i| format!("meta.k{i}=v")).collect::<Vec<_>>().join(" ");
        let query = format!("tickets | {stage}");
        let err = parse(&query).expect_err("should overflow");
        assert_eq!(err.kind(), tix_core::ErrorKind::Overflow);
    }
}
