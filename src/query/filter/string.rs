//! String grammar: `~contains`, `^prefix`, `$suffix`, `!not-equal`, exact match.

use super::list::{compile_set, is_in, is_not_in};
use super::{FilterResult, FilterTarget, Rule, ABSENT, PRESENT};
use crate::config::FilterOperator;
use crate::error::RequestErrorKind;
use crate::query::clause::{ClauseKind, CompiledWhereClause, Operand};

pub(super) const RULES: &[Rule] = &[
    PRESENT,
    ABSENT,
    Rule { matches: is_in, parse: set },
    Rule { matches: is_not_in, parse: set },
    Rule { matches: |v| v.starts_with('~'), parse: contains },
    Rule { matches: |v| v.starts_with('^'), parse: starts_with },
    Rule { matches: |v| v.starts_with('$'), parse: ends_with },
    Rule { matches: |v| v.starts_with('!'), parse: not_equals },
    Rule { matches: |_| true, parse: equals },
];

fn text(v: &str) -> Option<Operand> {
    Some(Operand::Text(v.to_string()))
}

fn set(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    compile_set(v, target, text)
}

fn prefixed(v: &str, op: FilterOperator, kind: ClauseKind, target: &FilterTarget<'_>) -> FilterResult {
    target.require(op)?;
    let rest = &v[1..];
    if rest.is_empty() {
        return Err(RequestErrorKind::InvalidFilterValue(v.to_string()));
    }
    Ok(vec![CompiledWhereClause::compare(kind, &target.field, vec![rest.into()])])
}

fn contains(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    prefixed(v, FilterOperator::Contains, ClauseKind::LikeContains, target)
}

fn starts_with(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    prefixed(v, FilterOperator::StartsWith, ClauseKind::LikePrefix, target)
}

fn ends_with(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    prefixed(v, FilterOperator::EndsWith, ClauseKind::LikeSuffix, target)
}

fn not_equals(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    prefixed(v, FilterOperator::NotEquals, ClauseKind::NotLike, target)
}

fn equals(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    target.require(FilterOperator::Equals)?;
    Ok(vec![CompiledWhereClause::compare(ClauseKind::Equals, &target.field, vec![v.into()])])
}
