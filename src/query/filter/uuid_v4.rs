//! UUID grammar: exact match or `!value`. Every value must be a version-4 UUID.

use super::list::{compile_set, is_in, is_not_in};
use super::{FilterResult, FilterTarget, Rule, ABSENT, PRESENT};
use crate::config::FilterOperator;
use crate::error::RequestErrorKind;
use crate::query::clause::{ClauseKind, CompiledWhereClause, Operand};
use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

pub(super) const RULES: &[Rule] = &[
    PRESENT,
    ABSENT,
    Rule { matches: is_in, parse: set },
    Rule { matches: is_not_in, parse: set },
    Rule { matches: |v| v.starts_with('!'), parse: not_equals },
    Rule { matches: |_| true, parse: equals },
];

fn v4_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$")
            .expect("valid uuid pattern")
    })
}

pub(super) fn parse_v4(v: &str) -> Option<Operand> {
    if !v4_pattern().is_match(v) {
        return None;
    }
    Uuid::parse_str(v).ok().map(Operand::Uuid)
}

fn set(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    compile_set(v, target, parse_v4)
}

fn single(v: &str, raw: &str, op: FilterOperator, kind: ClauseKind, target: &FilterTarget<'_>) -> FilterResult {
    let operand = parse_v4(v).ok_or_else(|| RequestErrorKind::InvalidFilterValue(raw.to_string()))?;
    target.require(op)?;
    Ok(vec![CompiledWhereClause::compare(kind, &target.field, vec![operand])])
}

fn not_equals(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    single(&v[1..], v, FilterOperator::NotEquals, ClauseKind::NotEquals, target)
}

fn equals(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    single(v, v, FilterOperator::Equals, ClauseKind::Equals, target)
}
