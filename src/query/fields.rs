//! Field projection: which attributes and relations a response carries.

use crate::case::normalize_segment;
use crate::config::{CapabilityConfig, DEFAULT_SENTINEL, FULL_SENTINEL};
use crate::error::RequestErrorKind;
use std::collections::BTreeSet;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Projection {
    pub fields: Vec<String>,
    pub relations: Vec<String>,
}

impl Projection {
    fn add(list: &mut Vec<String>, name: &str) {
        if !list.iter().any(|n| n == name) {
            list.push(name.to_string());
        }
    }

    fn remove(list: &mut Vec<String>, name: &str) {
        list.retain(|n| n != name);
    }
}

/// Names that may appear in a projection at this level.
pub struct FieldSpace<'a> {
    pub full_fields: &'a [String],
    /// Link-table attributes, present only when scoped under that relation.
    pub extra_fields: Vec<&'a str>,
    pub relations: BTreeSet<&'a str>,
}

impl FieldSpace<'_> {
    fn is_field(&self, name: &str) -> bool {
        self.full_fields.iter().any(|f| f == name) || self.extra_fields.contains(&name)
    }

    fn is_relation(&self, name: &str) -> bool {
        self.relations.contains(name)
    }
}

fn full(config: &CapabilityConfig) -> Projection {
    let mut p = Projection::default();
    for f in &config.full_fields {
        Projection::add(&mut p.fields, f);
    }
    p
}

/// Apply the declared `default_fields` tokens left to right, then the default relations.
pub fn defaults(config: &CapabilityConfig) -> Projection {
    let mut p = Projection::default();
    for token in &config.default_fields {
        if token == FULL_SENTINEL {
            for f in &config.full_fields {
                Projection::add(&mut p.fields, f);
            }
        } else if let Some(name) = token.strip_prefix('-') {
            Projection::remove(&mut p.fields, name);
        } else {
            Projection::add(&mut p.fields, token);
        }
    }
    for rel in &config.default_relations {
        Projection::add(&mut p.relations, rel);
    }
    p
}

#[derive(Debug, Default)]
pub struct Resolved {
    pub projection: Projection,
    /// Relations the caller named outright (not seeded by a sentinel).
    pub named_relations: Vec<String>,
    pub errors: Vec<RequestErrorKind>,
}

/// Resolve a caller's comma-separated `fields` value. Unknown tokens are reported and skipped.
pub fn resolve(value: &str, config: &CapabilityConfig, space: &FieldSpace<'_>) -> Resolved {
    let mut out = Resolved::default();
    let tokens = value.split(',').map(str::trim).filter(|t| !t.is_empty());

    for (i, token) in tokens.enumerate() {
        if token == FULL_SENTINEL || token == DEFAULT_SENTINEL {
            if i != 0 {
                out.errors.push(RequestErrorKind::MisplacedSentinel(token.to_string()));
            } else if token == FULL_SENTINEL {
                out.projection = full(config);
            } else {
                out.projection = defaults(config);
            }
            continue;
        }

        let (removal, name) = match token.strip_prefix('-') {
            Some(rest) => (true, normalize_segment(rest)),
            None => (false, normalize_segment(token)),
        };
        let p = &mut out.projection;
        if space.is_field(&name) {
            if removal {
                Projection::remove(&mut p.fields, &name);
            } else {
                Projection::add(&mut p.fields, &name);
            }
        } else if space.is_relation(&name) {
            if removal {
                Projection::remove(&mut p.relations, &name);
            } else {
                Projection::add(&mut p.relations, &name);
                Projection::add(&mut out.named_relations, &name);
            }
        } else {
            out.errors.push(RequestErrorKind::UnknownField(token.to_string()));
        }
    }
    out
}
