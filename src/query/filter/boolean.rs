//! Boolean grammar: case-insensitive `true` / `false`, or a native boolean.

use super::{FilterResult, FilterTarget, Rule, ABSENT, PRESENT};
use crate::config::{FieldType, FilterOperator};
use crate::error::RequestErrorKind;
use crate::query::clause::{ClauseKind, CompiledWhereClause, Operand};

pub(super) const RULES: &[Rule] = &[
    PRESENT,
    ABSENT,
    Rule { matches: |v| v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false"), parse: literal },
];

fn literal(v: &str, target: &FilterTarget<'_>) -> FilterResult {
    equals(v.eq_ignore_ascii_case("true"), target)
}

fn equals(b: bool, target: &FilterTarget<'_>) -> FilterResult {
    target.require(FilterOperator::Equals)?;
    Ok(vec![CompiledWhereClause::compare(ClauseKind::Equals, &target.field, vec![Operand::Bool(b)])])
}

/// Native booleans are only meaningful for boolean fields.
pub(super) fn compile_native(ty: FieldType, b: bool, target: &FilterTarget<'_>) -> FilterResult {
    match ty {
        FieldType::Boolean => equals(b, target),
        _ => Err(RequestErrorKind::InvalidValueType),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{compile, compile_str};
    use super::*;
    use crate::config::FilterRule;
    use crate::query::params::RawValue;

    #[test]
    fn accepts_textual_and_native_booleans() {
        let all = FilterRule::default();
        let c = compile_str(FieldType::Boolean, "TRUE", &target(&all)).unwrap().remove(0);
        assert_eq!(c.operands, vec![Operand::Bool(true)]);
        let c = compile(FieldType::Boolean, &RawValue::Bool(false), &target(&all)).unwrap().remove(0);
        assert_eq!(c.operands, vec![Operand::Bool(false)]);
    }

    #[test]
    fn rejects_anything_else() {
        let all = FilterRule::default();
        assert!(compile_str(FieldType::Boolean, "yes", &target(&all)).is_err());
        assert!(compile_str(FieldType::Boolean, "1", &target(&all)).is_err());
        let err = compile(FieldType::String, &RawValue::Bool(true), &target(&all)).unwrap_err();
        assert_eq!(err, vec![RequestErrorKind::InvalidValueType]);
    }
}
