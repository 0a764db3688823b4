//! `$in:` / `$nin:` set membership payloads.

use super::{FilterResult, FilterTarget};
use crate::config::FilterOperator;
use crate::error::RequestErrorKind;
use crate::query::clause::{ClauseKind, CompiledWhereClause, Operand};
use serde_json::Value;

pub(super) const IN_PREFIX: &str = "$in:";
pub(super) const NOT_IN_PREFIX: &str = "$nin:";

pub(super) fn is_in(v: &str) -> bool {
    v.starts_with(IN_PREFIX)
}

pub(super) fn is_not_in(v: &str) -> bool {
    v.starts_with(NOT_IN_PREFIX)
}

/// Parse a quoted-CSV payload (`"a","b"`, optionally already bracketed) into its elements.
/// Numbers are accepted and kept in their textual form.
pub(super) fn parse_payload(payload: &str) -> Result<Vec<String>, RequestErrorKind> {
    let trimmed = payload.trim();
    let json = if trimmed.starts_with('[') {
        trimmed.to_string()
    } else {
        format!("[{}]", trimmed)
    };
    let items: Vec<Value> =
        serde_json::from_str(&json).map_err(|_| RequestErrorKind::UnparsableList(payload.to_string()))?;
    if items.is_empty() {
        return Err(RequestErrorKind::InvalidListValues);
    }
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err(RequestErrorKind::InvalidListValues),
        })
        .collect()
}

/// Compile a `$in:` / `$nin:` value, validating every element with `element`.
pub(super) fn compile_set(
    value: &str,
    target: &FilterTarget<'_>,
    element: fn(&str) -> Option<Operand>,
) -> FilterResult {
    let (op, kind, payload) = match value.strip_prefix(IN_PREFIX) {
        Some(payload) => (FilterOperator::In, ClauseKind::InSet, payload),
        None => match value.strip_prefix(NOT_IN_PREFIX) {
            Some(payload) => (FilterOperator::NotIn, ClauseKind::NotInSet, payload),
            None => return Err(RequestErrorKind::InvalidFilterValue(value.to_string())),
        },
    };
    target.require(op)?;
    let operands = parse_payload(payload)?
        .iter()
        .map(|item| element(item))
        .collect::<Option<Vec<_>>>()
        .ok_or(RequestErrorKind::InvalidListValues)?;
    Ok(vec![CompiledWhereClause::compare(kind, &target.field, operands)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_csv_payload() {
        assert_eq!(parse_payload(r#""a","b""#).unwrap(), vec!["a", "b"]);
        assert_eq!(parse_payload(r#"["a"]"#).unwrap(), vec!["a"]);
        assert_eq!(parse_payload("1,2").unwrap(), vec!["1", "2"]);
    }

    #[test]
    fn malformed_and_invalid_payloads_differ() {
        assert_eq!(
            parse_payload(r#""a",b"#).unwrap_err(),
            RequestErrorKind::UnparsableList(r#""a",b"#.into())
        );
        assert_eq!(parse_payload(r#""a","""#).unwrap_err(), RequestErrorKind::InvalidListValues);
        assert_eq!(parse_payload("").unwrap_err(), RequestErrorKind::InvalidListValues);
        assert_eq!(parse_payload("true").unwrap_err(), RequestErrorKind::InvalidListValues);
    }
}
