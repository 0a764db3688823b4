//! The compiled query plan handed to a query executor.

use crate::config::Direction;
use crate::error::{AppError, RequestError};
use crate::query::clause::{CompiledWhereClause, FieldRef};
use serde::Serialize;
use std::collections::BTreeMap;

/// How a relation must be joined for filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    /// The related row must exist.
    Inner,
    /// The related row must not exist (left join plus a null check on its key).
    LeftExclusive,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderEntry {
    pub field: FieldRef,
    pub direction: Direction,
}

impl OrderEntry {
    pub fn new(field: FieldRef, direction: Direction) -> Self {
        OrderEntry { field, direction }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryPlan {
    pub resource: String,
    /// Capability entry the plan was compiled against.
    pub referrer: String,
    pub filters: Vec<CompiledWhereClause>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub joins: BTreeMap<String, JoinKind>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub order: Vec<OrderEntry>,
    pub fields: Vec<String>,
    pub relation_plans: BTreeMap<String, QueryPlan>,
    /// Every problem found in this plan and its relation plans. Child errors are moved
    /// up into their parent, so only the root carries the complete list.
    pub errors: Vec<RequestError>,
}

impl QueryPlan {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Nesting depth of relation plans; 0 for a plan without relations.
    pub fn depth(&self) -> usize {
        self.relation_plans
            .values()
            .map(|p| p.depth() + 1)
            .max()
            .unwrap_or(0)
    }

    /// Reject the request with the full error list when anything went wrong.
    pub fn into_result(self) -> Result<QueryPlan, AppError> {
        if self.errors.is_empty() {
            Ok(self)
        } else {
            Err(AppError::InvalidRequest(self.errors))
        }
    }
}
