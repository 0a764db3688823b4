//! Datetime grammar: `$before:d`, `$after:d`, `$between:d1|d2` with ISO-8601 dates.

use super::{FilterResult, FilterTarget, Rule, ABSENT, PRESENT};
use crate::config::FilterOperator;
use crate::error::RequestErrorKind;
use crate::query::clause::{ClauseKind, CompiledWhereClause, Operand};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

const BEFORE: &str = "$before:";
const AFTER: &str = "$after:";
const BETWEEN: &str = "$between:";

pub(super) const RULES: &[Rule] = &[
    PRESENT,
    ABSENT,
    Rule { matches: |v| v.starts_with(BEFORE), parse: before },
    Rule { matches: |v| v.starts_with(AFTER), parse: after },
    Rule { matches: |v| v.starts_with(BETWEEN), parse: between },
];

/// RFC 3339 first, then a zone-less date-time or a bare date (both read as UTC).
pub fn parse_date(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc().fixed_offset());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().fixed_offset())
}

fn dates(v: &str, prefix: &str, expected: usize) -> Result<Vec<Operand>, RequestErrorKind> {
    let parts: Vec<&str> = v[prefix.len()..].split('|').collect();
    if parts.len() != expected {
        return Err(RequestErrorKind::InvalidDateArity {
            prefix: prefix.trim_end_matches(':').to_string(),
            expected,
        });
    }
    parts
        .into_iter()
        .map(|p| parse_date(p).map(Operand::DateTime).ok_or_else(|| RequestErrorKind::InvalidDate(p.to_string())))
        .collect()
}

fn ranged(v: &str, prefix: &str, expected: usize, op: FilterOperator, kind: ClauseKind, target: &FilterTarget<'_>) -> FilterResult {
    target.require(op)?;
    let operands = dates(v, prefix, expected)?;
    Ok(vec![CompiledWhereClause::compare(kind, &target.field, operands)])
}

fn before(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    ranged(v, BEFORE, 1, FilterOperator::Before, ClauseKind::LessThan, target)
}

fn after(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    ranged(v, AFTER, 1, FilterOperator::After, ClauseKind::GreaterThan, target)
}

fn between(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    ranged(v, BETWEEN, 2, FilterOperator::Between, ClauseKind::Between, target)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::compile_str;
    use super::*;
    use crate::config::{FieldType, FilterRule};

    #[test]
    fn parses_iso_dates() {
        assert!(parse_date("2024-06-01").is_some());
        assert!(parse_date("2024-06-01T12:30:00").is_some());
        assert!(parse_date("2024-06-01T12:30:00+02:00").is_some());
        assert!(parse_date("01.06.2024").is_none());
    }

    #[test]
    fn prefixes() {
        let all = FilterRule::default();
        let c = compile_str(FieldType::Datetime, "$before:2024-01-01", &target(&all)).unwrap().remove(0);
        assert_eq!(c.kind, ClauseKind::LessThan);
        let c = compile_str(FieldType::Datetime, "$after:2024-01-01", &target(&all)).unwrap().remove(0);
        assert_eq!(c.kind, ClauseKind::GreaterThan);
        let c = compile_str(FieldType::Datetime, "$between:2024-01-01|2024-02-01", &target(&all)).unwrap().remove(0);
        assert_eq!(c.kind, ClauseKind::Between);
        assert_eq!(c.operands.len(), 2);
    }

    #[test]
    fn wrong_arity_and_bad_dates() {
        let all = FilterRule::default();
        let err = compile_str(FieldType::Datetime, "$between:2024-01-01", &target(&all)).unwrap_err();
        assert_eq!(err, RequestErrorKind::InvalidDateArity { prefix: "$between".into(), expected: 2 });
        let err = compile_str(FieldType::Datetime, "$before:2024-01-01|2024-02-01", &target(&all)).unwrap_err();
        assert_eq!(err, RequestErrorKind::InvalidDateArity { prefix: "$before".into(), expected: 1 });
        let err = compile_str(FieldType::Datetime, "$after:soon", &target(&all)).unwrap_err();
        assert_eq!(err, RequestErrorKind::InvalidDate("soon".into()));
        assert!(compile_str(FieldType::Datetime, "2024-01-01", &target(&all)).is_err());
    }
}
