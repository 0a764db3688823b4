//! Resolved catalog: config validated and flattened into closed records for compile time.

use crate::config::{FieldType, FilterOperator, RelationKind};
use crate::error::ConfigError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Fallback capability entry every resource must declare.
pub const DEFAULT_REFERRER: &str = "default";
/// Referrer of a resource fetched as a root collection.
pub const LIST_REFERRER: &str = "*list";
/// Referrer of a resource fetched as a single identified root item.
pub const SINGLE_REFERRER: &str = "*single";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    /// Case-insensitive `asc` / `desc`.
    pub fn parse(s: &str) -> Option<Direction> {
        if s.eq_ignore_ascii_case("asc") {
            Some(Direction::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Some(Direction::Desc)
        } else {
            None
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Operators allowed for one filter key. `None` means everything the kind supports.
#[derive(Clone, Debug, Default)]
pub struct FilterRule {
    pub operators: Option<BTreeSet<FilterOperator>>,
}

impl FilterRule {
    pub fn allows(&self, op: FilterOperator) -> bool {
        self.operators.as_ref().map(|ops| ops.contains(&op)).unwrap_or(true)
    }
}

/// What a caller may do with one resource when reached through one referrer.
#[derive(Clone, Debug, Default)]
pub struct CapabilityConfig {
    pub pagination_enabled: bool,
    pub default_limit: u32,
    pub max_limit: u32,
    pub ordering_enabled: bool,
    pub valid_order_fields: Vec<String>,
    pub default_order: Vec<(String, Direction)>,
    pub full_text_search_enabled: bool,
    pub filters: BTreeMap<String, FilterRule>,
    pub full_fields: Vec<String>,
    pub default_fields: Vec<String>,
    pub default_relations: Vec<String>,
}

impl CapabilityConfig {
    /// A single-item fetch cannot be paginated, ordered, searched or filtered.
    pub fn for_single_item(&self) -> CapabilityConfig {
        CapabilityConfig {
            pagination_enabled: false,
            ordering_enabled: false,
            default_order: Vec::new(),
            full_text_search_enabled: false,
            filters: BTreeMap::new(),
            ..self.clone()
        }
    }
}

/// How a resource is currently being reached. Candidates are ordered most specific first;
/// resolution falls back to [`DEFAULT_REFERRER`] after all of them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferrerContext {
    candidates: Vec<String>,
}

impl ReferrerContext {
    pub fn list() -> Self {
        ReferrerContext {
            candidates: vec![LIST_REFERRER.to_string()],
        }
    }

    pub fn single() -> Self {
        ReferrerContext {
            candidates: vec![SINGLE_REFERRER.to_string()],
        }
    }

    /// Context of `relation` reached from `parent`. When the parent is a single item the
    /// `<parent>.single.<relation>` variant is tried first.
    pub fn nested(parent: &str, relation: &str, parent_single: bool) -> Self {
        let mut candidates = Vec::with_capacity(2);
        if parent_single {
            candidates.push(format!("{}.single.{}", parent, relation));
        }
        candidates.push(format!("{}.{}", parent, relation));
        ReferrerContext { candidates }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }
}

#[derive(Clone, Debug)]
pub struct Through {
    pub table: String,
    pub source_key: String,
    pub target_key: String,
    /// Extra attributes carried by the link table (e.g. a distance).
    pub fields: BTreeMap<String, FieldType>,
    pub order_fields: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Relation {
    pub name: String,
    pub target: String,
    pub kind: RelationKind,
    pub source_key: String,
    pub target_key: String,
    pub through: Option<Through>,
}

impl Relation {
    pub fn is_to_one(&self) -> bool {
        matches!(self.kind, RelationKind::ToOne)
    }
}

#[derive(Clone, Debug)]
pub struct ResourceType {
    pub name: String,
    pub schema: String,
    pub table: String,
    pub id: String,
    pub search_column: String,
    pub fields: BTreeMap<String, FieldType>,
    pub relations: BTreeMap<String, Relation>,
    pub capabilities: BTreeMap<String, CapabilityConfig>,
}

impl ResourceType {
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    /// Exact referrer match first (most specific candidate wins), then `default`.
    pub fn capability(&self, referrer: &ReferrerContext) -> Result<(&str, &CapabilityConfig), ConfigError> {
        referrer
            .candidates()
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(DEFAULT_REFERRER))
            .find_map(|key| self.capabilities.get_key_value(key))
            .map(|(key, config)| (key.as_str(), config))
            .ok_or_else(|| ConfigError::MissingCapability {
                resource: self.name.clone(),
                referrers: referrer.candidates().to_vec(),
            })
    }
}

/// Immutable resource-type catalog, loaded once and shared read-only by every compiler.
#[derive(Clone, Debug, Default)]
pub struct ResourceCatalog {
    pub resources: BTreeMap<String, ResourceType>,
}

impl ResourceCatalog {
    pub fn resource(&self, name: &str) -> Result<&ResourceType, ConfigError> {
        self.resources
            .get(name)
            .ok_or_else(|| ConfigError::UnknownResource(name.to_string()))
    }

    pub fn get_config(&self, resource: &str, referrer: &ReferrerContext) -> Result<&CapabilityConfig, ConfigError> {
        Ok(self.resource(resource)?.capability(referrer)?.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource_with(referrers: &[&str]) -> ResourceType {
        ResourceType {
            name: "facility".into(),
            schema: "public".into(),
            table: "facilities".into(),
            id: "id".into(),
            search_column: "search_document".into(),
            fields: BTreeMap::new(),
            relations: BTreeMap::new(),
            capabilities: referrers
                .iter()
                .map(|r| {
                    let config = CapabilityConfig {
                        full_fields: vec![r.to_string()],
                        ..Default::default()
                    };
                    (r.to_string(), config)
                })
                .collect(),
        }
    }

    #[test]
    fn most_specific_referrer_wins() {
        let res = resource_with(&["default", "cabin.facilities", "cabin.single.facilities"]);
        let (key, _) = res.capability(&ReferrerContext::nested("cabin", "facilities", true)).unwrap();
        assert_eq!(key, "cabin.single.facilities");
        let (key, _) = res.capability(&ReferrerContext::nested("cabin", "facilities", false)).unwrap();
        assert_eq!(key, "cabin.facilities");
    }

    #[test]
    fn falls_back_to_default() {
        let res = resource_with(&["default"]);
        let (key, _) = res.capability(&ReferrerContext::list()).unwrap();
        assert_eq!(key, "default");
    }

    #[test]
    fn missing_default_is_fatal() {
        let res = resource_with(&["*single"]);
        let err = res.capability(&ReferrerContext::list()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCapability { .. }));
    }

    #[test]
    fn single_item_disables_query_shaping() {
        let mut config = CapabilityConfig {
            pagination_enabled: true,
            ordering_enabled: true,
            full_text_search_enabled: true,
            default_order: vec![("id".into(), Direction::Asc)],
            full_fields: vec!["id".into()],
            ..Default::default()
        };
        config.filters.insert("name".into(), FilterRule::default());
        let single = config.for_single_item();
        assert!(!single.pagination_enabled && !single.ordering_enabled && !single.full_text_search_enabled);
        assert!(single.filters.is_empty() && single.default_order.is_empty());
        assert_eq!(single.full_fields, vec!["id".to_string()]);
    }

    #[test]
    fn direction_is_case_insensitive() {
        assert_eq!(Direction::parse("DeSc"), Some(Direction::Desc));
        assert_eq!(Direction::parse("up"), None);
    }
}
