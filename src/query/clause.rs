//! Dialect-neutral where-clause instructions produced by the filter grammars.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Which table a field reference resolves against.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldScope {
    /// The resource being compiled.
    Resource,
    /// The link table of the relation this compiler is scoped under.
    Through,
    /// A relation of the resource being compiled, joined for filtering.
    Relation(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct FieldRef {
    pub scope: FieldScope,
    pub name: String,
}

impl FieldRef {
    pub fn resource(name: impl Into<String>) -> Self {
        FieldRef {
            scope: FieldScope::Resource,
            name: name.into(),
        }
    }

    pub fn through(name: impl Into<String>) -> Self {
        FieldRef {
            scope: FieldScope::Through,
            name: name.into(),
        }
    }

    pub fn relation(relation: impl Into<String>, name: impl Into<String>) -> Self {
        FieldRef {
            scope: FieldScope::Relation(relation.into()),
            name: name.into(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            FieldScope::Resource => write!(f, "{}", self.name),
            FieldScope::Through => write!(f, "through.{}", self.name),
            FieldScope::Relation(rel) => write!(f, "{}.{}", rel, self.name),
        }
    }
}

/// A literal compared against a field. Values never become part of query text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Operand {
    Text(String),
    Integer(i64),
    Bool(bool),
    Uuid(Uuid),
    DateTime(DateTime<FixedOffset>),
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self {
        Operand::Text(s.to_string())
    }
}

/// Named predicates that have no direct comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RawPredicate {
    /// Text length of the field is greater than zero.
    NonEmpty,
    /// Text length of the field is zero.
    Empty,
    /// The field (a precomputed search vector) matches the operand as a full-text query.
    FullTextMatch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClauseKind {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Between,
    IsNull,
    IsNotNull,
    InSet,
    NotInSet,
    /// Case-insensitive substring match.
    LikeContains,
    LikePrefix,
    LikeSuffix,
    /// Case-insensitive inequality.
    NotLike,
    Raw(RawPredicate),
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompiledWhereClause {
    pub kind: ClauseKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub operands: Vec<Operand>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<CompiledWhereClause>,
}

impl CompiledWhereClause {
    pub fn compare(kind: ClauseKind, field: &FieldRef, operands: Vec<Operand>) -> Self {
        CompiledWhereClause {
            kind,
            field: Some(field.clone()),
            operands,
            children: Vec::new(),
        }
    }

    pub fn is_null(field: &FieldRef) -> Self {
        Self::compare(ClauseKind::IsNull, field, Vec::new())
    }

    pub fn is_not_null(field: &FieldRef) -> Self {
        Self::compare(ClauseKind::IsNotNull, field, Vec::new())
    }

    pub fn raw(predicate: RawPredicate, field: &FieldRef, operands: Vec<Operand>) -> Self {
        Self::compare(ClauseKind::Raw(predicate), field, operands)
    }

    pub fn and(children: Vec<CompiledWhereClause>) -> Self {
        Self::combine(ClauseKind::And, children)
    }

    pub fn or(children: Vec<CompiledWhereClause>) -> Self {
        Self::combine(ClauseKind::Or, children)
    }

    fn combine(kind: ClauseKind, children: Vec<CompiledWhereClause>) -> Self {
        CompiledWhereClause {
            kind,
            field: None,
            operands: Vec::new(),
            children,
        }
    }
}
