//! Catalog validation: referential integrity and capability consistency.

use crate::config::{CapabilityConfigRaw, FieldType, FullConfig, ResourceConfig, DEFAULT_REFERRER};
use crate::error::ConfigError;
use std::collections::{BTreeMap, HashMap};

/// Sentinel for "every field in `full_fields`".
pub const FULL_SENTINEL: &str = "*full";
/// Sentinel for "the computed default fields and relations".
pub const DEFAULT_SENTINEL: &str = "*default";

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let mut by_name: HashMap<&str, &ResourceConfig> = HashMap::new();
    for r in &config.resources {
        if by_name.insert(r.name.as_str(), r).is_some() {
            return Err(ConfigError::Validation(format!("duplicate resource '{}'", r.name)));
        }
    }

    // Link-table attributes are legal fields of the target only under the referrers of that link.
    let mut through_fields: HashMap<(&str, String), &BTreeMap<String, FieldType>> = HashMap::new();
    for r in &config.resources {
        for (rel_name, rel) in &r.relations {
            if !by_name.contains_key(rel.target.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "relation target",
                    id: format!("{}.{} -> {}", r.name, rel_name, rel.target),
                });
            }
            if r.fields.contains_key(rel_name) {
                return Err(ConfigError::Validation(format!(
                    "'{}.{}' is declared both as a field and as a relation",
                    r.name, rel_name
                )));
            }
            if let Some(through) = &rel.through {
                for order_field in &through.order_fields {
                    if !through.fields.contains_key(order_field) {
                        return Err(ConfigError::MissingReference {
                            kind: "through order field",
                            id: format!("{}.{}.{}", r.name, rel_name, order_field),
                        });
                    }
                }
                for referrer in [format!("{}.{}", r.name, rel_name), format!("{}.single.{}", r.name, rel_name)] {
                    through_fields.insert((rel.target.as_str(), referrer), &through.fields);
                }
            }
        }
    }

    for r in &config.resources {
        if !r.fields.contains_key(&r.id) {
            return Err(ConfigError::MissingReference {
                kind: "id field",
                id: format!("{}.{}", r.name, r.id),
            });
        }
        if !r.capabilities.contains_key(DEFAULT_REFERRER) {
            return Err(ConfigError::Validation(format!(
                "resource '{}' declares no '{}' capability",
                r.name, DEFAULT_REFERRER
            )));
        }
        for (referrer, cap) in &r.capabilities {
            let extra = through_fields.get(&(r.name.as_str(), referrer.clone())).copied();
            let field_type = |name: &str| r.fields.get(name).or_else(|| extra.and_then(|e| e.get(name))).copied();
            validate_capability(r, referrer, cap, &field_type, &by_name)?;
        }
    }

    Ok(())
}

fn validate_capability(
    r: &ResourceConfig,
    referrer: &str,
    cap: &CapabilityConfigRaw,
    field_type: &dyn Fn(&str) -> Option<FieldType>,
    by_name: &HashMap<&str, &ResourceConfig>,
) -> Result<(), ConfigError> {
    let at = |what: &str| format!("{} [{}] {}", r.name, referrer, what);
    let is_field = |name: &str| field_type(name).is_some();

    for f in &cap.full_fields {
        if !is_field(f.as_str()) {
            return Err(ConfigError::MissingReference { kind: "full field", id: at(f) });
        }
    }
    for token in &cap.default_fields {
        let name = token.strip_prefix('-').unwrap_or(token);
        if token != FULL_SENTINEL && !is_field(name) {
            return Err(ConfigError::MissingReference { kind: "default field", id: at(token) });
        }
    }
    for rel in &cap.default_relations {
        if !r.relations.contains_key(rel) {
            return Err(ConfigError::MissingReference { kind: "default relation", id: at(rel) });
        }
    }
    for key in cap.filters.keys() {
        let ty = match key.split_once('.') {
            None if r.relations.contains_key(key) => None,
            None => Some(field_type(key.as_str())),
            Some((rel, field)) => Some(
                r.relations
                    .get(rel)
                    .and_then(|rel| by_name.get(rel.target.as_str()))
                    .and_then(|target| target.fields.get(field).copied()),
            ),
        };
        match ty {
            Some(None) => return Err(ConfigError::MissingReference { kind: "filter", id: at(key) }),
            Some(Some(FieldType::Object | FieldType::Geometry)) => {
                return Err(ConfigError::Validation(format!("{}: field type has no filter grammar", at(key))));
            }
            _ => {}
        }
    }
    if let Some(pagination) = &cap.pagination {
        if pagination.max_limit == 0 || pagination.default_limit > pagination.max_limit {
            return Err(ConfigError::Validation(format!(
                "{}: default_limit {} must be within 1..={}",
                at("pagination"),
                pagination.default_limit,
                pagination.max_limit
            )));
        }
    }
    // Capability order fields resolve against the resource table; link fields order through
    // `through.order_fields` instead.
    if let Some(ordering) = &cap.ordering {
        for f in &ordering.fields {
            if !r.fields.contains_key(f) {
                return Err(ConfigError::MissingReference { kind: "order field", id: at(f) });
            }
        }
        for token in &ordering.default {
            let field = token.split_whitespace().next().unwrap_or_default();
            if !r.fields.contains_key(field) {
                return Err(ConfigError::MissingReference { kind: "default order field", id: at(token) });
            }
        }
    }
    Ok(())
}
