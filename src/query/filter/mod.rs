//! Filter grammars. Each attribute kind declares an ordered list of rules; the first rule
//! whose predicate matches the raw value parses it.

mod boolean;
mod datetime;
mod list;
mod number;
pub mod relation;
mod string;
pub mod text;
mod uuid_v4;

use crate::config::{FieldType, FilterOperator, FilterRule};
use crate::error::RequestErrorKind;
use crate::query::clause::{CompiledWhereClause, FieldRef, RawPredicate};
use crate::query::params::RawValue;

pub type FilterResult = Result<Vec<CompiledWhereClause>, RequestErrorKind>;

/// The field a filter applies to and the operators declared for it.
pub struct FilterTarget<'a> {
    pub field: FieldRef,
    pub rule: &'a FilterRule,
}

impl FilterTarget<'_> {
    pub fn require(&self, op: FilterOperator) -> Result<(), RequestErrorKind> {
        if self.rule.allows(op) {
            Ok(())
        } else {
            Err(RequestErrorKind::UnsupportedOperator(op.to_string()))
        }
    }
}

pub(crate) struct Rule {
    pub matches: fn(&str) -> bool,
    pub parse: fn(&str, &FilterTarget<'_>) -> FilterResult,
}

/// Blank means "present": not null and non-empty.
pub(crate) const PRESENT: Rule = Rule {
    matches: str::is_empty,
    parse: present,
};

/// `!` means "absent": null or empty.
pub(crate) const ABSENT: Rule = Rule {
    matches: is_bang,
    parse: absent,
};

fn is_bang(v: &str) -> bool {
    v == "!"
}

fn present(_: &str, target: &FilterTarget<'_>) -> FilterResult {
    target.require(FilterOperator::IsNotNull)?;
    Ok(vec![
        CompiledWhereClause::is_not_null(&target.field),
        CompiledWhereClause::raw(RawPredicate::NonEmpty, &target.field, Vec::new()),
    ])
}

fn absent(_: &str, target: &FilterTarget<'_>) -> FilterResult {
    target.require(FilterOperator::IsNull)?;
    Ok(vec![CompiledWhereClause::or(vec![
        CompiledWhereClause::is_null(&target.field),
        CompiledWhereClause::raw(RawPredicate::Empty, &target.field, Vec::new()),
    ])])
}

fn rules_for(ty: FieldType) -> &'static [Rule] {
    match ty {
        FieldType::String => string::RULES,
        FieldType::Uuid => uuid_v4::RULES,
        FieldType::Number => number::RULES,
        FieldType::Boolean => boolean::RULES,
        FieldType::Datetime => datetime::RULES,
        FieldType::Object | FieldType::Geometry => &[],
    }
}

/// Compile one textual value with the grammar of `ty`.
pub fn compile_str(ty: FieldType, value: &str, target: &FilterTarget<'_>) -> FilterResult {
    rules_for(ty)
        .iter()
        .find(|rule| (rule.matches)(value))
        .map(|rule| (rule.parse)(value, target))
        .unwrap_or_else(|| Err(RequestErrorKind::InvalidFilterValue(value.to_string())))
}

/// Compile a request value. Every element of an array compiles on its own and the clauses
/// are ANDed; any failing element discards all clauses for the key.
pub fn compile(ty: FieldType, value: &RawValue, target: &FilterTarget<'_>) -> Result<Vec<CompiledWhereClause>, Vec<RequestErrorKind>> {
    match value {
        RawValue::Str(s) => compile_str(ty, s, target).map_err(|e| vec![e]),
        RawValue::Bool(b) => boolean::compile_native(ty, *b, target).map_err(|e| vec![e]),
        RawValue::List(items) if items.is_empty() => Err(vec![RequestErrorKind::InvalidValueType]),
        RawValue::List(items) => {
            let mut clauses = Vec::new();
            let mut errors = Vec::new();
            for item in items {
                match compile_str(ty, item, target) {
                    Ok(c) => clauses.extend(c),
                    Err(e) => errors.push(e),
                }
            }
            if errors.is_empty() {
                Ok(clauses)
            } else {
                Err(errors)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::BTreeSet;

    pub fn rule(ops: &[FilterOperator]) -> FilterRule {
        FilterRule {
            operators: Some(ops.iter().copied().collect::<BTreeSet<_>>()),
        }
    }

    pub fn target(rule: &FilterRule) -> FilterTarget<'_> {
        FilterTarget {
            field: FieldRef::resource("f"),
            rule,
        }
    }
}
