//! Per-level request compiler.
//!
//! A [`RequestCompiler`] handles one resource at one nesting depth. [`RequestCompiler::verify`]
//! runs the validation stages in a fixed order, each consuming the previous state; problems in
//! the request are collected, never thrown. Relations that need their own level spawn a child
//! compiler, which is verified eagerly and executed together with its parent.
//! [`Verified::execute`] produces the [`QueryPlan`].

use crate::config::{
    CapabilityConfig, FieldType, FilterRule, ReferrerContext, Relation, ResourceCatalog, ResourceType, Through,
};
use crate::error::{ConfigError, RequestError, RequestErrorKind};
use crate::query::clause::{FieldRef, FieldScope};
use crate::query::fields::{self, FieldSpace, Projection};
use crate::query::filter::{self, relation, text, FilterTarget};
use crate::query::order::{self, OrderFields};
use crate::query::params::{self, KeySpace, ParsedRequest, RawValue, RequestParameter, RequestParams};
use crate::query::params::{FIELDS, LIMIT, OFFSET, ORDER, QUERY};
use crate::query::plan::{JoinKind, OrderEntry, QueryPlan};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

/// Deepest relation level a request may reach; the root is level 0.
pub const MAX_LEVEL_DEPTH: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestTarget {
    List,
    Single,
}

/// Compilation stages, in the only order they may run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    ConfigResolved,
    FiltersClassified,
    LimitOffsetValidated,
    OrderValidated,
    FieldsValidated,
    RelationsProcessed,
    Compiled,
}

enum FilterKind<'a> {
    Field { field: FieldRef, ty: FieldType },
    RelationExists(&'a Relation),
}

struct RequestFilter<'a> {
    parameter: RequestParameter,
    kind: FilterKind<'a>,
    rule: FilterRule,
}

struct State<'a> {
    stage: Stage,
    referrer: String,
    config: Cow<'a, CapabilityConfig>,
    parsed: ParsedRequest,
    filters: Vec<RequestFilter<'a>>,
    limit: Option<u32>,
    offset: Option<u32>,
    order: Vec<OrderEntry>,
    projection: Projection,
    named_relations: BTreeSet<String>,
    children: BTreeMap<String, Verified<'a>>,
    errors: Vec<RequestError>,
}

impl State<'_> {
    fn advance(mut self, next: Stage) -> Self {
        debug_assert!(next > self.stage, "stage {:?} after {:?}", next, self.stage);
        self.stage = next;
        self
    }
}

#[derive(Clone, Debug)]
pub struct RequestCompiler<'a> {
    catalog: &'a ResourceCatalog,
    resource: &'a ResourceType,
    referrer: ReferrerContext,
    single: bool,
    /// Relation this level was reached through; `None` at the root.
    via: Option<&'a Relation>,
    depth: usize,
    trace: String,
}

impl<'a> RequestCompiler<'a> {
    pub fn new(catalog: &'a ResourceCatalog, resource: &str, target: RequestTarget) -> Result<Self, ConfigError> {
        let resource = catalog.resource(resource)?;
        let single = target == RequestTarget::Single;
        Ok(RequestCompiler {
            catalog,
            resource,
            referrer: if single { ReferrerContext::single() } else { ReferrerContext::list() },
            single,
            via: None,
            depth: 0,
            trace: resource.name.clone(),
        })
    }

    fn child(&self, relation: &'a Relation) -> Result<RequestCompiler<'a>, ConfigError> {
        Ok(RequestCompiler {
            catalog: self.catalog,
            resource: self.catalog.resource(&relation.target)?,
            referrer: ReferrerContext::nested(&self.resource.name, &relation.name, self.single),
            single: false,
            via: Some(relation),
            depth: self.depth + 1,
            trace: format!("{}.{}", self.trace, relation.name),
        })
    }

    pub fn resource(&self) -> &'a ResourceType {
        self.resource
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn trace(&self) -> &str {
        &self.trace
    }

    fn through(&self) -> Option<&'a Through> {
        self.via.and_then(|r| r.through.as_ref())
    }

    /// Validate the request at this level and, recursively, at every relation level it
    /// touches. `Err` only for catalog problems.
    pub fn verify(self, params: &RequestParams) -> Result<Verified<'a>, ConfigError> {
        let state = self.resolve_config()?;
        let state = self.classify_filters(state, params);
        let state = self.validate_limit_offset(state);
        let state = self.validate_order(state);
        let state = self.validate_fields(state);
        let state = self.process_relations(state)?;
        Ok(Verified { compiler: self, state })
    }

    fn resolve_config(&self) -> Result<State<'a>, ConfigError> {
        let (key, config) = self.resource.capability(&self.referrer)?;
        tracing::debug!(resource = %self.resource.name, referrer = %key, depth = self.depth, "capability config");
        let config = if self.single {
            Cow::Owned(config.for_single_item())
        } else {
            Cow::Borrowed(config)
        };
        let state = State {
            stage: Stage::Init,
            referrer: key.to_string(),
            config,
            parsed: ParsedRequest::default(),
            filters: Vec::new(),
            limit: None,
            offset: None,
            order: Vec::new(),
            projection: Projection::default(),
            named_relations: BTreeSet::new(),
            children: BTreeMap::new(),
            errors: Vec::new(),
        };
        Ok(state.advance(Stage::ConfigResolved))
    }

    fn classify_filters(&self, mut state: State<'a>, params: &RequestParams) -> State<'a> {
        let filters: BTreeSet<String> = state.config.filters.keys().cloned().collect();
        let relations: BTreeSet<String> = self.resource.relations.keys().cloned().collect();
        let mut controls: BTreeSet<&'static str> = BTreeSet::from([FIELDS]);
        if state.config.pagination_enabled {
            controls.extend([LIMIT, OFFSET]);
        }
        if state.config.ordering_enabled {
            controls.insert(ORDER);
        }
        if state.config.full_text_search_enabled {
            controls.insert(QUERY);
        }
        let keys = KeySpace {
            filters: &filters,
            relations: &relations,
            controls: &controls,
            same_level_prefix: self.via.is_some_and(|r| r.is_to_one()),
        };

        let mut parsed = params::parse(params, &keys, &self.trace);
        state.errors.append(&mut parsed.errors);
        for parameter in std::mem::take(&mut parsed.filters) {
            let Some(kind) = self.classify(&parameter.key) else {
                state.errors.push(parameter.error(RequestErrorKind::UnknownParameter));
                continue;
            };
            let rule = state.config.filters.get(&parameter.key).cloned().unwrap_or_default();
            state.filters.push(RequestFilter { parameter, kind, rule });
        }
        state.parsed = parsed;
        state.advance(Stage::FiltersClassified)
    }

    fn classify(&self, key: &str) -> Option<FilterKind<'a>> {
        match key.split_once('.') {
            None => {
                if let Some(ty) = self.resource.field_type(key) {
                    return Some(FilterKind::Field { field: FieldRef::resource(key), ty });
                }
                if let Some(ty) = self.through().and_then(|t| t.fields.get(key).copied()) {
                    return Some(FilterKind::Field { field: FieldRef::through(key), ty });
                }
                self.resource.relation(key).map(FilterKind::RelationExists)
            }
            Some((rel, name)) => {
                let relation = self.resource.relation(rel)?;
                let ty = self.catalog.resource(&relation.target).ok()?.field_type(name)?;
                Some(FilterKind::Field { field: FieldRef::relation(rel, name), ty })
            }
        }
    }

    fn validate_limit_offset(&self, mut state: State<'a>) -> State<'a> {
        if state.config.pagination_enabled {
            let max = state.config.max_limit;
            state.limit = Some(state.config.default_limit);
            state.offset = Some(0);
            if let Some(p) = state.parsed.parameters.get(LIMIT) {
                let limit = single_value(p).and_then(|v| {
                    parse_count(v)
                        .filter(|n| (1..=max).contains(n))
                        .ok_or_else(|| p.error(RequestErrorKind::InvalidLimit { max }))
                });
                match limit {
                    Ok(n) => state.limit = Some(n),
                    Err(e) => state.errors.push(e),
                }
            }
            if let Some(p) = state.parsed.parameters.get(OFFSET) {
                let offset = single_value(p)
                    .and_then(|v| parse_count(v).ok_or_else(|| p.error(RequestErrorKind::InvalidOffset)));
                match offset {
                    Ok(n) => state.offset = Some(n),
                    Err(e) => state.errors.push(e),
                }
            }
        }
        state.advance(Stage::LimitOffsetValidated)
    }

    /// The declared default always applies; `ordering_enabled` only gates the caller's value.
    fn validate_order(&self, mut state: State<'a>) -> State<'a> {
        state.order = order::default_order(&state.config);
        if state.config.ordering_enabled {
            if let Some(p) = state.parsed.parameters.get(ORDER) {
                let fields = OrderFields {
                    resource: &state.config.valid_order_fields,
                    through: self.through().map(|t| t.order_fields.as_slice()).unwrap_or(&[]),
                };
                match single_value(p).and_then(|v| order::compile(v, &fields).map_err(|k| p.error(k))) {
                    Ok(entries) => state.order = entries,
                    Err(e) => state.errors.push(e),
                }
            }
        }
        state.advance(Stage::OrderValidated)
    }

    fn validate_fields(&self, mut state: State<'a>) -> State<'a> {
        let space = FieldSpace {
            full_fields: &state.config.full_fields,
            extra_fields: self
                .through()
                .map(|t| t.fields.keys().map(String::as_str).collect())
                .unwrap_or_default(),
            relations: self.resource.relations.keys().map(String::as_str).collect(),
        };
        state.projection = match state.parsed.parameters.get(FIELDS) {
            None => fields::defaults(&state.config),
            Some(p) => match field_list(&p.value) {
                None => {
                    state.errors.push(p.error(RequestErrorKind::InvalidValueType));
                    fields::defaults(&state.config)
                }
                Some(value) => {
                    let resolved = fields::resolve(&value, &state.config, &space);
                    state.errors.extend(resolved.errors.into_iter().map(|k| p.error(k)));
                    state.named_relations = resolved.named_relations.into_iter().collect();
                    resolved.projection
                }
            },
        };
        state.advance(Stage::FieldsValidated)
    }

    /// Spawn a child for every projected relation and every relation carrying nested
    /// parameters. At the depth limit, default relations are dropped quietly while
    /// explicitly requested ones are reported.
    fn process_relations(&self, mut state: State<'a>) -> Result<State<'a>, ConfigError> {
        let mut buffered = std::mem::take(&mut state.parsed.relations);
        let wanted: BTreeSet<String> = state
            .projection
            .relations
            .iter()
            .cloned()
            .chain(buffered.keys().cloned())
            .collect();

        for name in wanted {
            let Some(relation) = self.resource.relation(&name) else {
                continue;
            };
            let params = buffered.remove(&name);
            if self.depth >= MAX_LEVEL_DEPTH {
                if params.is_some() || state.named_relations.contains(&name) {
                    state.errors.push(RequestError::new(
                        format!("{}.{}", self.trace, name),
                        RequestErrorKind::DepthExceeded { max: MAX_LEVEL_DEPTH },
                    ));
                }
                continue;
            }
            let child = self.child(relation)?.verify(&params.unwrap_or_default())?;
            state.children.insert(name, child);
        }
        Ok(state.advance(Stage::RelationsProcessed))
    }
}

/// A level that passed through every verification stage.
pub struct Verified<'a> {
    compiler: RequestCompiler<'a>,
    state: State<'a>,
}

impl<'a> Verified<'a> {
    pub fn stage(&self) -> Stage {
        self.state.stage
    }

    pub fn referrer(&self) -> &str {
        &self.state.referrer
    }

    /// Problems found at this level so far (children excluded until execution).
    pub fn errors(&self) -> &[RequestError] {
        &self.state.errors
    }

    /// Compile filters, search and relation plans. Child errors are drained into this
    /// plan's error list.
    pub fn execute(self) -> QueryPlan {
        let Verified { compiler, state } = self;
        let State {
            referrer,
            parsed,
            filters: requested,
            limit,
            offset,
            order,
            projection,
            children,
            mut errors,
            ..
        } = state.advance(Stage::Compiled);

        let mut filters = Vec::new();
        let mut joins = BTreeMap::new();
        for f in requested {
            match &f.kind {
                FilterKind::Field { field, ty } => {
                    let target = FilterTarget { field: field.clone(), rule: &f.rule };
                    match filter::compile(*ty, &f.parameter.value, &target) {
                        Ok(clauses) => {
                            if let FieldScope::Relation(rel) = &field.scope {
                                joins.entry(rel.clone()).or_insert(JoinKind::Inner);
                            }
                            filters.extend(clauses);
                        }
                        Err(kinds) => errors.extend(kinds.into_iter().map(|k| f.parameter.error(k))),
                    }
                }
                FilterKind::RelationExists(rel) => {
                    let compiled = single_value(&f.parameter)
                        .and_then(|v| relation::compile(v, rel, &f.rule).map_err(|k| f.parameter.error(k)));
                    match compiled {
                        // An exclusion join wins over an inner join added for a field filter.
                        Ok((join, clauses)) => {
                            if join == JoinKind::LeftExclusive {
                                joins.insert(rel.name.clone(), join);
                            } else {
                                joins.entry(rel.name.clone()).or_insert(join);
                            }
                            filters.extend(clauses);
                        }
                        Err(e) => errors.push(e),
                    }
                }
            }
        }

        if let Some(p) = parsed.parameters.get(QUERY) {
            match single_value(p) {
                Ok(q) => filters.extend(text::compile(q, &compiler.resource.search_column)),
                Err(e) => errors.push(e),
            }
        }

        let mut relation_plans = BTreeMap::new();
        for (name, child) in children {
            let mut plan = child.execute();
            errors.append(&mut plan.errors);
            relation_plans.insert(name, plan);
        }

        tracing::debug!(
            trace = %compiler.trace,
            filters = filters.len(),
            relations = relation_plans.len(),
            errors = errors.len(),
            "compiled level"
        );

        QueryPlan {
            resource: compiler.resource.name.clone(),
            referrer,
            filters,
            joins,
            limit,
            offset,
            order,
            fields: projection.fields,
            relation_plans,
            errors,
        }
    }
}

/// Compile a request against `resource` in one go.
pub fn compile(
    catalog: &ResourceCatalog,
    resource: &str,
    target: RequestTarget,
    params: &RequestParams,
) -> Result<QueryPlan, ConfigError> {
    Ok(RequestCompiler::new(catalog, resource, target)?.verify(params)?.execute())
}

fn single_value(p: &RequestParameter) -> Result<&str, RequestError> {
    p.value
        .as_single()
        .ok_or_else(|| p.error(RequestErrorKind::SingleValueRequired))
}

/// Non-negative decimal integer; signs and other characters are rejected.
fn parse_count(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn field_list(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Str(s) => Some(s.clone()),
        RawValue::List(items) => Some(items.join(",")),
        RawValue::Bool(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_config, resolve, Direction};
    use crate::query::clause::{ClauseKind, Operand};
    use serde_json::{json, Value};

    fn catalog() -> ResourceCatalog {
        let doc = include_str!("../../tests/fixtures/catalog.json");
        resolve(&parse_config(doc).unwrap()).unwrap()
    }

    fn params(value: Value) -> RequestParams {
        RequestParams::from_object(value.as_object().unwrap())
    }

    fn list(catalog: &ResourceCatalog, resource: &str, value: Value) -> QueryPlan {
        compile(catalog, resource, RequestTarget::List, &params(value)).unwrap()
    }

    fn kinds(plan: &QueryPlan) -> Vec<RequestErrorKind> {
        plan.errors.iter().map(|e| e.kind.clone()).collect()
    }

    #[test]
    fn defaults_without_parameters() {
        let catalog = catalog();
        let plan = list(&catalog, "cabin", json!({}));
        assert!(plan.is_valid());
        assert_eq!(plan.referrer, "default");
        assert_eq!(plan.limit, Some(10));
        assert_eq!(plan.offset, Some(0));
        assert_eq!(plan.fields, vec!["id", "name", "description"]);
        assert_eq!(plan.order, vec![OrderEntry::new(FieldRef::resource("name"), Direction::Asc)]);
        assert_eq!(plan.relation_plans.keys().collect::<Vec<_>>(), vec!["area"]);
        assert_eq!(plan.relation_plans["area"].referrer, "default");
    }

    #[test]
    fn default_order_applies_with_ordering_disabled() {
        let doc = include_str!("../../tests/fixtures/catalog.json").replacen(
            "\"ordering\": { \"fields\"",
            "\"ordering\": { \"enabled\": false, \"fields\"",
            1,
        );
        let catalog = resolve(&parse_config(&doc).unwrap()).unwrap();
        let plan = list(&catalog, "cabin", json!({}));
        assert!(plan.is_valid(), "{:?}", plan.errors);
        assert_eq!(plan.order, vec![OrderEntry::new(FieldRef::resource("name"), Direction::Asc)]);

        let plan = list(&catalog, "cabin", json!({ "order": "updated_at desc" }));
        assert_eq!(kinds(&plan), vec![RequestErrorKind::UnknownParameter]);
        assert_eq!(plan.order, vec![OrderEntry::new(FieldRef::resource("name"), Direction::Asc)]);
    }

    #[test]
    fn verify_reaches_final_stage() {
        let catalog = catalog();
        let verified = RequestCompiler::new(&catalog, "cabin", RequestTarget::List)
            .unwrap()
            .verify(&params(json!({ "limit": "0" })))
            .unwrap();
        assert_eq!(verified.stage(), Stage::RelationsProcessed);
        assert_eq!(verified.errors()[0].kind, RequestErrorKind::InvalidLimit { max: 50 });
        assert_eq!(verified.execute().limit, Some(10));
    }

    #[test]
    fn limit_and_offset() {
        let catalog = catalog();
        let plan = list(&catalog, "cabin", json!({ "limit": "25", "offset": "40" }));
        assert_eq!((plan.limit, plan.offset), (Some(25), Some(40)));

        let plan = list(&catalog, "cabin", json!({ "limit": "51", "offset": "-1" }));
        assert_eq!(
            kinds(&plan),
            vec![RequestErrorKind::InvalidLimit { max: 50 }, RequestErrorKind::InvalidOffset]
        );
        let plan = list(&catalog, "cabin", json!({ "limit": "+5" }));
        assert_eq!(kinds(&plan), vec![RequestErrorKind::InvalidLimit { max: 50 }]);
    }

    #[test]
    fn single_item_rejects_query_shaping() {
        let catalog = catalog();
        let p = params(json!({ "limit": "5", "order": "name asc", "q": "hut", "name": "x" }));
        let plan = compile(&catalog, "cabin", RequestTarget::Single, &p).unwrap();
        assert_eq!(plan.referrer, "*single");
        assert_eq!(plan.errors.len(), 4);
        assert!(kinds(&plan).iter().all(|k| *k == RequestErrorKind::UnknownParameter));
        assert_eq!(plan.limit, None);
        assert!(plan.order.is_empty());
        assert_eq!(plan.fields.len(), 8);
        assert!(plan.relation_plans.contains_key("facilities"));
        assert_eq!(plan.relation_plans["facilities"].referrer, "cabin.facilities");
    }

    #[test]
    fn full_text_search() {
        let catalog = catalog();
        let plan = list(&catalog, "cabin", json!({ "q": " Stor Hytte " }));
        assert_eq!(plan.filters[0].operands, vec![Operand::Text("stor hytte".into())]);
        assert_eq!(plan.filters[0].field, Some(FieldRef::resource("search_document")));
    }

    #[test]
    fn relation_field_filter_adds_inner_join() {
        let catalog = catalog();
        let plan = list(&catalog, "cabin", json!({ "area.name": "Jotunheimen" }));
        assert!(plan.is_valid());
        assert_eq!(plan.joins["area"], JoinKind::Inner);
        assert_eq!(plan.filters[0].field, Some(FieldRef::relation("area", "name")));
    }

    #[test]
    fn relation_absence_uses_exclusive_join() {
        let catalog = catalog();
        let plan = list(&catalog, "cabin", json!({ "facilities": "!" }));
        assert!(plan.is_valid());
        assert_eq!(plan.joins["facilities"], JoinKind::LeftExclusive);
        assert_eq!(plan.filters[0].kind, ClauseKind::IsNull);
    }

    #[test]
    fn nested_parameters_reach_child() {
        let catalog = catalog();
        let plan = list(&catalog, "cabin", json!({ "facilities": { "name": "~hut", "order": "description desc" } }));
        assert!(plan.is_valid(), "{:?}", plan.errors);
        let child = &plan.relation_plans["facilities"];
        assert_eq!(child.referrer, "cabin.facilities");
        assert_eq!(child.filters[0].kind, ClauseKind::LikeContains);
        assert_eq!(child.order, vec![OrderEntry::new(FieldRef::through("description"), Direction::Desc)]);
    }

    #[test]
    fn through_field_filter() {
        let catalog = catalog();
        let plan = list(&catalog, "cabin", json!({ "facilities.description": "^wood" }));
        assert!(plan.is_valid(), "{:?}", plan.errors);
        let child = &plan.relation_plans["facilities"];
        assert_eq!(child.filters[0].field, Some(FieldRef::through("description")));
    }

    #[test]
    fn child_errors_move_to_root() {
        let catalog = catalog();
        let plan = list(&catalog, "cabin", json!({ "facilities.owner": "x" }));
        assert_eq!(plan.errors.len(), 1);
        assert_eq!(plan.errors[0].trace, "cabin.facilities.owner");
        assert!(plan.relation_plans["facilities"].errors.is_empty());
    }

    #[test]
    fn same_level_prefix_inside_to_one() {
        let catalog = catalog();
        let plan = list(&catalog, "cabin", json!({ "area.df.name": "Nordmarka" }));
        assert!(plan.is_valid(), "{:?}", plan.errors);
        assert_eq!(plan.relation_plans["area"].filters.len(), 1);

        let plan = list(&catalog, "cabin", json!({ "df.name": "x" }));
        assert_eq!(kinds(&plan), vec![RequestErrorKind::UnknownParameter]);
    }

    #[test]
    fn default_relations_stop_quietly_at_depth_limit() {
        let catalog = catalog();
        // area -> cabins -> area (default) -> cabins; the cabin at level 3 would add its
        // default `area` relation at level 4.
        let plan = list(&catalog, "area", json!({ "fields": "cabins", "cabins.area.fields": "cabins" }));
        assert!(plan.is_valid(), "{:?}", plan.errors);
        assert_eq!(plan.depth(), MAX_LEVEL_DEPTH);
        let deepest = &plan.relation_plans["cabins"].relation_plans["area"].relation_plans["cabins"];
        assert!(deepest.relation_plans.is_empty());
    }

    #[test]
    fn explicit_relation_beyond_depth_limit() {
        let catalog = catalog();
        let plan = list(&catalog, "cabin", json!({ "area.parent.parent.name": "x" }));
        assert!(plan.is_valid(), "{:?}", plan.errors);

        let plan = list(&catalog, "cabin", json!({ "area.parent.parent.parent.name": "x" }));
        assert_eq!(kinds(&plan), vec![RequestErrorKind::DepthExceeded { max: MAX_LEVEL_DEPTH }]);
        assert_eq!(plan.errors[0].trace, "cabin.area.parent.parent.parent");
    }

    #[test]
    fn fields_as_list() {
        let catalog = catalog();
        let plan = list(&catalog, "cabin", json!({ "fields": ["id", "beds"] }));
        assert_eq!(plan.fields, vec!["id", "beds"]);
        assert!(plan.relation_plans.is_empty());
    }

    #[test]
    fn parse_count_is_digits_only() {
        assert_eq!(parse_count("12"), Some(12));
        assert_eq!(parse_count(""), None);
        assert_eq!(parse_count("1e3"), None);
        assert_eq!(parse_count("-0"), None);
    }
}
