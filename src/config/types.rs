//! Raw catalog types matching the JSON capability document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Semantic type of a resource attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Uuid,
    Number,
    Boolean,
    Datetime,
    Object,
    Geometry,
}

/// Filter operators a capability entry may allow for one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    IsNull,
    IsNotNull,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Before,
    After,
    Between,
}

impl FilterOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "not_equals",
            FilterOperator::IsNull => "is_null",
            FilterOperator::IsNotNull => "is_not_null",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not_in",
            FilterOperator::Contains => "contains",
            FilterOperator::StartsWith => "starts_with",
            FilterOperator::EndsWith => "ends_with",
            FilterOperator::GreaterThan => "greater_than",
            FilterOperator::GreaterThanOrEqual => "greater_than_or_equal",
            FilterOperator::LessThan => "less_than",
            FilterOperator::LessThanOrEqual => "less_than_or_equal",
            FilterOperator::Before => "before",
            FilterOperator::After => "after",
            FilterOperator::Between => "between",
        }
    }
}

impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    ToOne,
    ToMany,
}

/// Many-to-many link table, optionally carrying its own projectable attributes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThroughConfig {
    pub table: String,
    /// Column in the link table pointing at the owning resource.
    pub source_key: String,
    /// Column in the link table pointing at the related resource.
    pub target_key: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldType>,
    #[serde(default)]
    pub order_fields: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationConfig {
    pub target: String,
    pub kind: RelationKind,
    /// Our column used in the join (our FK for to_one; our PK for to_many).
    pub source_key: String,
    /// Their column used in the join (their PK for to_one; their FK for to_many).
    /// With `through`, both keys name columns on the owning and related tables
    /// that the link table points at.
    pub target_key: String,
    #[serde(default)]
    pub through: Option<ThroughConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub fields: Vec<String>,
    /// Tokens in request syntax, e.g. `"name asc"`.
    #[serde(default)]
    pub default: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// `None` allows every operator the attribute kind supports.
    #[serde(default)]
    pub operators: Option<Vec<FilterOperator>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CapabilityConfigRaw {
    #[serde(default)]
    pub pagination: Option<PaginationConfig>,
    #[serde(default)]
    pub ordering: Option<OrderingConfig>,
    #[serde(default)]
    pub full_text_search: bool,
    #[serde(default)]
    pub filters: BTreeMap<String, FilterConfig>,
    #[serde(default)]
    pub full_fields: Vec<String>,
    /// May contain the `*full` sentinel and `-field` removals.
    #[serde(default)]
    pub default_fields: Vec<String>,
    #[serde(default)]
    pub default_relations: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    pub table: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_id")]
    pub id: String,
    #[serde(default = "default_search_column")]
    pub search_column: String,
    pub fields: BTreeMap<String, FieldType>,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationConfig>,
    /// Keyed by referrer (`*list`, `*single`, `cabin.facilities`, `default`, ...).
    #[serde(default)]
    pub capabilities: BTreeMap<String, CapabilityConfigRaw>,
}

/// The whole catalog document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

fn default_true() -> bool {
    true
}

fn default_limit() -> u32 {
    10
}

fn default_max_limit() -> u32 {
    50
}

fn default_schema() -> String {
    "public".into()
}

fn default_id() -> String {
    "id".into()
}

fn default_search_column() -> String {
    "search_document".into()
}
