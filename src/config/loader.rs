//! Load the catalog from a JSON file or from a configuration table, then resolve it.

use crate::config::resolved::{CapabilityConfig, Direction, FilterRule, Relation, ResourceCatalog, ResourceType, Through};
use crate::config::types::*;
use crate::config::{validate, FULL_SENTINEL};
use crate::error::ConfigError;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::path::Path;

/// Default table holding one `ResourceConfig` JSON payload per row.
pub const CONFIG_TABLE: &str = "_sys_resources";

/// Build the resolved catalog from raw config (validates first).
pub fn resolve(config: &FullConfig) -> Result<ResourceCatalog, ConfigError> {
    validate(config)?;

    let mut resources = BTreeMap::new();
    for r in &config.resources {
        let relations = r
            .relations
            .iter()
            .map(|(name, rel)| (name.clone(), resolve_relation(name, rel)))
            .collect();
        let mut capabilities = BTreeMap::new();
        for (referrer, raw) in &r.capabilities {
            let cap = resolve_capability(raw).map_err(|e| {
                ConfigError::Validation(format!("{} [{}]: {}", r.name, referrer, e))
            })?;
            capabilities.insert(referrer.clone(), cap);
        }
        let resource = ResourceType {
            name: r.name.clone(),
            schema: r.schema.clone(),
            table: r.table.clone(),
            id: r.id.clone(),
            search_column: r.search_column.clone(),
            fields: r.fields.clone(),
            relations,
            capabilities,
        };
        resources.insert(r.name.clone(), resource);
    }

    tracing::info!(resources = resources.len(), "resolved resource catalog");
    Ok(ResourceCatalog { resources })
}

fn resolve_relation(name: &str, rel: &RelationConfig) -> Relation {
    Relation {
        name: name.to_string(),
        target: rel.target.clone(),
        kind: rel.kind,
        source_key: rel.source_key.clone(),
        target_key: rel.target_key.clone(),
        through: rel.through.as_ref().map(|t| Through {
            table: t.table.clone(),
            source_key: t.source_key.clone(),
            target_key: t.target_key.clone(),
            fields: t.fields.clone(),
            order_fields: t.order_fields.clone(),
        }),
    }
}

fn resolve_capability(raw: &CapabilityConfigRaw) -> Result<CapabilityConfig, String> {
    let (pagination_enabled, default_limit, max_limit) = match &raw.pagination {
        Some(p) => (p.enabled, p.default_limit, p.max_limit),
        None => (false, 0, 0),
    };
    let (ordering_enabled, valid_order_fields, default_order) = match &raw.ordering {
        Some(o) => {
            let default_order = o
                .default
                .iter()
                .map(|token| parse_default_order(token))
                .collect::<Result<Vec<_>, _>>()?;
            (o.enabled, o.fields.clone(), default_order)
        }
        None => (false, Vec::new(), Vec::new()),
    };
    let filters = raw
        .filters
        .iter()
        .map(|(key, f)| {
            let rule = FilterRule {
                operators: f.operators.as_ref().map(|ops| ops.iter().copied().collect()),
            };
            (key.clone(), rule)
        })
        .collect();
    // `*full` alone covers the common "everything by default" case.
    let default_fields = if raw.default_fields.is_empty() && raw.default_relations.is_empty() {
        vec![FULL_SENTINEL.to_string()]
    } else {
        raw.default_fields.clone()
    };
    Ok(CapabilityConfig {
        pagination_enabled,
        default_limit,
        max_limit,
        ordering_enabled,
        valid_order_fields,
        default_order,
        full_text_search_enabled: raw.full_text_search,
        filters,
        full_fields: raw.full_fields.clone(),
        default_fields,
        default_relations: raw.default_relations.clone(),
    })
}

fn parse_default_order(token: &str) -> Result<(String, Direction), String> {
    let parts: Vec<&str> = token.split_whitespace().collect();
    match parts.as_slice() {
        [field, dir] => Direction::parse(dir)
            .map(|d| (field.to_string(), d))
            .ok_or_else(|| format!("invalid default order direction in '{}'", token)),
        _ => Err(format!("invalid default order '{}'", token)),
    }
}

/// Parse a catalog document from JSON text.
pub fn parse_config(json: &str) -> Result<FullConfig, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))
}

/// Read and resolve a catalog document from disk.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<ResourceCatalog, ConfigError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    resolve(&parse_config(&json)?)
}

/// Load raw config from a configuration table (one `ResourceConfig` payload per row).
pub async fn load_from_pool(pool: &PgPool, table: &str) -> Result<FullConfig, ConfigError> {
    let sql = format!("SELECT payload FROM {} ORDER BY id", quoted_table(table));
    tracing::debug!(sql = %sql, "query");
    let rows = sqlx::query_scalar::<_, serde_json::Value>(&sql)
        .fetch_all(pool)
        .await
        .map_err(|e| ConfigError::Load(e.to_string()))?;
    tracing::info!(rows = rows.len(), table, "loaded catalog rows");
    from_payloads(rows)
}

/// Assemble a catalog document from per-resource JSON payloads.
pub fn from_payloads(rows: Vec<serde_json::Value>) -> Result<FullConfig, ConfigError> {
    let mut resources = Vec::with_capacity(rows.len());
    for row in rows {
        let value: ResourceConfig = serde_json::from_value(row).map_err(|e| ConfigError::Load(e.to_string()))?;
        resources.push(value);
    }
    Ok(FullConfig { resources })
}

fn quoted_table(table: &str) -> String {
    table
        .split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}
