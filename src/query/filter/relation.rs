//! Relation existence: blank requires the relation, `!` requires its absence.

use crate::config::{FilterOperator, FilterRule, Relation};
use crate::error::RequestErrorKind;
use crate::query::clause::{CompiledWhereClause, FieldRef};
use crate::query::filter::FilterTarget;
use crate::query::plan::JoinKind;

pub fn compile(value: &str, relation: &Relation, rule: &FilterRule) -> Result<(JoinKind, Vec<CompiledWhereClause>), RequestErrorKind> {
    let target = FilterTarget {
        field: FieldRef::relation(relation.name.clone(), relation.target_key.clone()),
        rule,
    };
    match value {
        "" => {
            target.require(FilterOperator::IsNotNull)?;
            Ok((JoinKind::Inner, Vec::new()))
        }
        "!" => {
            target.require(FilterOperator::IsNull)?;
            Ok((JoinKind::LeftExclusive, vec![CompiledWhereClause::is_null(&target.field)]))
        }
        other => Err(RequestErrorKind::InvalidFilterValue(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelationKind;
    use crate::query::clause::ClauseKind;

    fn area() -> Relation {
        Relation {
            name: "area".into(),
            target: "area".into(),
            kind: RelationKind::ToOne,
            source_key: "area_id".into(),
            target_key: "id".into(),
            through: None,
        }
    }

    #[test]
    fn blank_forces_inner_join() {
        let (join, clauses) = compile("", &area(), &FilterRule::default()).unwrap();
        assert_eq!(join, JoinKind::Inner);
        assert!(clauses.is_empty());
    }

    #[test]
    fn bang_forces_left_join_with_null_key() {
        let (join, clauses) = compile("!", &area(), &FilterRule::default()).unwrap();
        assert_eq!(join, JoinKind::LeftExclusive);
        assert_eq!(clauses[0].kind, ClauseKind::IsNull);
        assert_eq!(clauses[0].field, Some(FieldRef::relation("area", "id")));
    }

    #[test]
    fn undeclared_operator_is_rejected() {
        let rule = crate::query::filter::test_support::rule(&[FilterOperator::IsNotNull]);
        assert!(compile("", &area(), &rule).is_ok());
        let err = compile("!", &area(), &rule).unwrap_err();
        assert_eq!(err, RequestErrorKind::UnsupportedOperator("is_null".into()));
    }

    #[test]
    fn anything_else_is_invalid() {
        let err = compile("yes", &area(), &FilterRule::default()).unwrap_err();
        assert_eq!(err, RequestErrorKind::InvalidFilterValue("yes".into()));
    }
}
