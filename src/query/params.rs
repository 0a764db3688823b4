//! Request parameter parsing: split the flat key/value map into controls, filters and
//! per-relation buckets.

use crate::case::normalize_key;
use crate::error::{RequestError, RequestErrorKind};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Top-level control parameters.
pub const FIELDS: &str = "fields";
pub const LIMIT: &str = "limit";
pub const OFFSET: &str = "offset";
pub const ORDER: &str = "order";
pub const QUERY: &str = "q";

/// Prefix that forces a key inside a to-one relation to be read as a same-level filter.
pub const SAME_LEVEL_PREFIX: &str = "df";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawValue {
    Str(String),
    List(Vec<String>),
    Bool(bool),
}

impl RawValue {
    fn from_json(value: &Value) -> Option<RawValue> {
        match value {
            Value::String(s) => Some(RawValue::Str(s.clone())),
            Value::Bool(b) => Some(RawValue::Bool(*b)),
            Value::Array(items) if items.is_empty() => None,
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(RawValue::List),
            _ => None,
        }
    }

    fn trimmed(&self) -> RawValue {
        match self {
            RawValue::Str(s) => RawValue::Str(s.trim().to_string()),
            RawValue::List(items) => RawValue::List(items.iter().map(|s| s.trim().to_string()).collect()),
            RawValue::Bool(b) => RawValue::Bool(*b),
        }
    }

    pub fn as_single(&self) -> Option<&str> {
        match self {
            RawValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// One incoming key, parsed once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestParameter {
    pub raw_key: String,
    pub raw_keys: Vec<String>,
    pub raw_value: RawValue,
    pub key: String,
    pub keys: Vec<String>,
    pub first_key: String,
    pub value: RawValue,
    pub error_trace: String,
}

impl RequestParameter {
    fn new(raw_key: &str, raw_value: RawValue, key: String, trace: &str) -> Self {
        let keys: Vec<String> = key.split('.').map(str::to_string).collect();
        RequestParameter {
            raw_key: raw_key.to_string(),
            raw_keys: raw_key.split('.').map(str::to_string).collect(),
            value: raw_value.trimmed(),
            raw_value,
            first_key: keys[0].clone(),
            error_trace: format!("{}.{}", trace, key),
            key,
            keys,
        }
    }

    pub fn error(&self, kind: RequestErrorKind) -> RequestError {
        RequestError::new(self.error_trace.clone(), kind)
    }
}

/// Decoded request input. Nested objects are flattened into dotted keys.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestParams {
    entries: BTreeMap<String, Value>,
}

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Structured input, e.g. `{"facilities": {"name": "~hut"}}`.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let mut entries = BTreeMap::new();
        flatten_into("", object, &mut entries);
        RequestParams { entries }
    }

    /// Query-string pairs. Repeated keys collect into arrays.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries: BTreeMap<String, Value> = BTreeMap::new();
        for (k, v) in pairs {
            let k: String = k.into();
            let v = Value::String(v.into());
            let merged = match entries.remove(&k) {
                None => v,
                Some(Value::Array(mut items)) => {
                    items.push(v);
                    Value::Array(items)
                }
                Some(existing) => Value::Array(vec![existing, v]),
            };
            entries.insert(k, merged);
        }
        RequestParams { entries }
    }

    /// Returns the value previously stored under `key`, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}

fn flatten_into(prefix: &str, object: &Map<String, Value>, out: &mut BTreeMap<String, Value>) {
    for (k, v) in object {
        let key = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{}.{}", prefix, k)
        };
        match v {
            Value::Object(nested) if !nested.is_empty() => flatten_into(&key, nested, out),
            other => {
                out.insert(key, other.clone());
            }
        }
    }
}

/// Keys that are legal at the current level.
pub struct KeySpace<'a> {
    pub filters: &'a BTreeSet<String>,
    pub relations: &'a BTreeSet<String>,
    pub controls: &'a BTreeSet<&'static str>,
    /// Whether the `df.` same-level prefix applies (compiler scoped under a to-one relation).
    pub same_level_prefix: bool,
}

#[derive(Debug, Default)]
pub struct ParsedRequest {
    pub filters: Vec<RequestParameter>,
    pub parameters: BTreeMap<String, RequestParameter>,
    /// Remaining sub-keys per relation, for the child compiler.
    pub relations: BTreeMap<String, RequestParams>,
    pub errors: Vec<RequestError>,
}

pub fn parse(params: &RequestParams, keys: &KeySpace<'_>, trace: &str) -> ParsedRequest {
    let mut out = ParsedRequest::default();

    for (raw_key, raw_value) in params.iter() {
        let key = normalize_key(raw_key);
        let Some(value) = RawValue::from_json(raw_value) else {
            out.errors.push(RequestError::new(
                format!("{}.{}", trace, key),
                RequestErrorKind::InvalidValueType,
            ));
            continue;
        };
        let param = RequestParameter::new(raw_key, value, key, trace);

        if keys.same_level_prefix && param.first_key == SAME_LEVEL_PREFIX && param.keys.len() > 1 {
            let key = param.keys[1..].join(".");
            if keys.filters.contains(&key) {
                let mut param = param;
                param.keys = param.keys[1..].to_vec();
                param.first_key = param.keys[0].clone();
                param.key = key;
                out.filters.push(param);
            } else {
                out.errors.push(param.error(RequestErrorKind::UnknownParameter));
            }
            continue;
        }

        if keys.filters.contains(&param.key) {
            out.filters.push(param);
        } else if keys.relations.contains(&param.first_key) {
            if param.keys.len() == 1 {
                out.errors.push(param.error(RequestErrorKind::RelationKeyRequired));
                continue;
            }
            let sub_key = param.raw_keys[1..].join(".");
            let previous = out
                .relations
                .entry(param.first_key.clone())
                .or_default()
                .insert(sub_key, raw_value.clone());
            if previous.is_some() {
                out.errors.push(param.error(RequestErrorKind::DuplicateParameter));
            }
        } else if param.keys.len() == 1 && keys.controls.contains(param.first_key.as_str()) {
            if out.parameters.contains_key(&param.key) {
                out.errors.push(param.error(RequestErrorKind::DuplicateParameter));
            } else {
                out.parameters.insert(param.key.clone(), param);
            }
        } else {
            out.errors.push(param.error(RequestErrorKind::UnknownParameter));
        }
    }

    out
}
