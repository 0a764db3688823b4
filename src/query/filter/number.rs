//! Integer grammar: `>=`, `<=`, `>`, `<` (longest prefix first), exact match.

use super::list::{compile_set, is_in, is_not_in};
use super::{FilterResult, FilterTarget, Rule, ABSENT, PRESENT};
use crate::config::FilterOperator;
use crate::error::RequestErrorKind;
use crate::query::clause::{ClauseKind, CompiledWhereClause, Operand};
use regex::Regex;
use std::sync::OnceLock;

pub(super) const RULES: &[Rule] = &[
    PRESENT,
    ABSENT,
    Rule { matches: is_in, parse: set },
    Rule { matches: is_not_in, parse: set },
    Rule { matches: |v| v.starts_with(">="), parse: gte },
    Rule { matches: |v| v.starts_with("<="), parse: lte },
    Rule { matches: |v| v.starts_with('>'), parse: gt },
    Rule { matches: |v| v.starts_with('<'), parse: lt },
    Rule { matches: |_| true, parse: equals },
];

fn integer_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\d+$").expect("valid integer pattern"))
}

pub(super) fn integer(v: &str) -> Option<Operand> {
    if !integer_pattern().is_match(v) {
        return None;
    }
    v.parse::<i64>().ok().map(Operand::Integer)
}

fn set(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    compile_set(v, target, integer)
}

fn compare(v: &str, prefix_len: usize, op: FilterOperator, kind: ClauseKind, target: &FilterTarget<'_>) -> FilterResult {
    target.require(op)?;
    let operand = integer(v[prefix_len..].trim()).ok_or_else(|| RequestErrorKind::InvalidFilterValue(v.to_string()))?;
    Ok(vec![CompiledWhereClause::compare(kind, &target.field, vec![operand])])
}

fn gte(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    compare(v, 2, FilterOperator::GreaterThanOrEqual, ClauseKind::GreaterThanOrEqual, target)
}

fn lte(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    compare(v, 2, FilterOperator::LessThanOrEqual, ClauseKind::LessThanOrEqual, target)
}

fn gt(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    compare(v, 1, FilterOperator::GreaterThan, ClauseKind::GreaterThan, target)
}

fn lt(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    compare(v, 1, FilterOperator::LessThan, ClauseKind::LessThan, target)
}

fn equals(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    compare(v, 0, FilterOperator::Equals, ClauseKind::Equals, target)
}
