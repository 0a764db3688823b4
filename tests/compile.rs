use serde_json::{json, Value};
use turbase_query::config::{parse_config, resolve, Direction, ReferrerContext};
use turbase_query::query::{ClauseKind, FieldRef, Operand, OrderEntry, MAX_LEVEL_DEPTH};
use turbase_query::{compile, AppError, QueryPlan, RequestErrorKind, RequestParams, RequestTarget, ResourceCatalog};

fn catalog() -> ResourceCatalog {
    let doc = include_str!("fixtures/catalog.json");
    resolve(&parse_config(doc).unwrap()).unwrap()
}

fn list(catalog: &ResourceCatalog, resource: &str, value: Value) -> QueryPlan {
    let params = RequestParams::from_object(value.as_object().unwrap());
    compile(catalog, resource, RequestTarget::List, &params).unwrap()
}

fn kinds(plan: &QueryPlan) -> Vec<RequestErrorKind> {
    plan.errors.iter().map(|e| e.kind.clone()).collect()
}

#[test]
fn default_projection_with_edits_and_order() {
    let catalog = catalog();
    let plan = list(
        &catalog,
        "cabin",
        json!({ "fields": "*default,-description,coordinates", "order": "name asc" }),
    );
    assert!(plan.errors.is_empty(), "{:?}", plan.errors);
    assert_eq!(plan.fields, vec!["id", "name", "coordinates"]);
    assert_eq!(plan.order, vec![OrderEntry::new(FieldRef::resource("name"), Direction::Asc)]);
}

#[test]
fn nested_filter_recurses_one_level() {
    let catalog = catalog();
    let plan = list(&catalog, "cabin", json!({ "facilities.name": "~hut" }));
    assert!(plan.is_valid(), "{:?}", plan.errors);
    let filters = &plan.relation_plans["facilities"].filters;
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].kind, ClauseKind::LikeContains);
    assert_eq!(filters[0].field, Some(FieldRef::resource("name")));
    assert_eq!(filters[0].operands, vec![Operand::Text("hut".into())]);
}

#[test]
fn undeclared_null_check_yields_one_error() {
    let catalog = catalog();
    let plan = list(&catalog, "cabin", json!({ "status": "!" }));
    assert_eq!(kinds(&plan), vec![RequestErrorKind::UnsupportedOperator("is_null".into())]);
    assert_eq!(plan.errors[0].trace, "cabin.status");
    assert!(plan.filters.is_empty());
}

#[test]
fn invalid_uuid_in_set_has_no_clause() {
    let catalog = catalog();
    let valid = "6f1c6a5e-5b0e-4e5e-9c57-3f0c0f7e2b11";
    for prefix in ["$in:", "$nin:"] {
        let value = format!("{}\"a\",\"{}\"", prefix, valid);
        let plan = list(&catalog, "cabin", json!({ "id": value }));
        assert_eq!(kinds(&plan), vec![RequestErrorKind::InvalidListValues]);
        assert!(plan.filters.is_empty());
    }
}

#[test]
fn missing_capabilities_make_controls_unknown() {
    let catalog = catalog();
    let plan = list(
        &catalog,
        "facility",
        json!({ "limit": "5", "offset": "0", "order": "name asc", "name": "x", "q": "hut" }),
    );
    assert_eq!(plan.errors.len(), 5);
    assert!(kinds(&plan).iter().all(|k| *k == RequestErrorKind::UnknownParameter));
    assert_eq!(plan.limit, None);
    assert!(plan.order.is_empty());

    // Reached through a referrer with ordering, the same key is legal.
    let plan = list(&catalog, "cabin", json!({ "facilities.order": "name desc" }));
    assert!(plan.is_valid(), "{:?}", plan.errors);
}

#[test]
fn depth_boundary() {
    let catalog = catalog();
    let plan = list(&catalog, "cabin", json!({ "fields": "id", "area.parent.parent.fields": "name" }));
    assert!(plan.is_valid(), "{:?}", plan.errors);
    assert_eq!(plan.depth(), MAX_LEVEL_DEPTH);

    let plan = list(&catalog, "cabin", json!({ "fields": "id", "area.parent.parent.fields": "name,parent" }));
    assert_eq!(kinds(&plan), vec![RequestErrorKind::DepthExceeded { max: MAX_LEVEL_DEPTH }]);
    assert_eq!(plan.depth(), MAX_LEVEL_DEPTH);
}

#[test]
fn default_sentinel_is_idempotent() {
    let catalog = catalog();
    let none = list(&catalog, "cabin", json!({}));
    for _ in 0..2 {
        let explicit = list(&catalog, "cabin", json!({ "fields": "*default" }));
        assert_eq!(explicit.fields, none.fields);
        assert_eq!(
            explicit.relation_plans.keys().collect::<Vec<_>>(),
            none.relation_plans.keys().collect::<Vec<_>>()
        );
    }
}

#[test]
fn never_clause_and_error_for_the_same_key() {
    let catalog = catalog();
    let plan = list(
        &catalog,
        "cabin",
        json!({
            "beds": [">2", "<x"],
            "updated_at": "$between:2024-01-01|2024-02-01",
            "open": "true",
            "name": "^Fjell",
        }),
    );
    assert_eq!(plan.errors.len(), 1);
    assert_eq!(plan.errors[0].trace, "cabin.beds");
    assert!(plan.filters.iter().all(|c| c.field.as_ref().map(|f| f.name.as_str()) != Some("beds")));
    assert_eq!(plan.filters.len(), 3);
}

#[test]
fn every_problem_is_reported_at_once() {
    let catalog = catalog();
    let plan = list(
        &catalog,
        "cabin",
        json!({
            "limit": "500",
            "order": "owner asc",
            "fields": "id,bogus",
            "facilities": { "name": "~", "extra": "1" },
        }),
    );
    let traces: Vec<&str> = plan.errors.iter().map(|e| e.trace.as_str()).collect();
    assert_eq!(plan.errors.len(), 5, "{:?}", traces);
    assert!(traces.contains(&"cabin.limit"));
    assert!(traces.contains(&"cabin.order"));
    assert!(traces.contains(&"cabin.fields"));
    assert!(traces.contains(&"cabin.facilities.name"));
    assert!(traces.contains(&"cabin.facilities.extra"));
}

#[test]
fn pairs_and_camel_case_keys() {
    let catalog = catalog();
    let params = RequestParams::from_pairs(vec![
        ("updatedAt", "$after:2024-01-01"),
        ("updatedAt", "$before:2024-06-01T12:00:00Z"),
        ("NAME", "Fjellstua"),
    ]);
    let plan = compile(&catalog, "cabin", RequestTarget::List, &params).unwrap();
    assert!(plan.is_valid(), "{:?}", plan.errors);
    let kinds: Vec<ClauseKind> = plan.filters.iter().map(|c| c.kind).collect();
    assert!(kinds.contains(&ClauseKind::GreaterThan));
    assert!(kinds.contains(&ClauseKind::LessThan));
    assert!(kinds.contains(&ClauseKind::Equals));
}

#[test]
fn nested_single_referrer_is_preferred() {
    let catalog = catalog();
    let params = RequestParams::new();
    let plan = compile(&catalog, "cabin", RequestTarget::Single, &params).unwrap();
    assert_eq!(plan.referrer, "*single");
    assert_eq!(plan.relation_plans["facilities"].referrer, "cabin.facilities");
    assert!(catalog
        .get_config("facility", &ReferrerContext::nested("cabin", "facilities", true))
        .is_ok());
}

#[test]
fn unknown_resource_is_a_config_error() {
    let catalog = catalog();
    assert!(compile(&catalog, "hut", RequestTarget::List, &RequestParams::new()).is_err());
}

#[test]
fn invalid_plan_converts_to_app_error() {
    let catalog = catalog();
    let plan = list(&catalog, "cabin", json!({ "nope": "1" }));
    match plan.into_result() {
        Err(AppError::InvalidRequest(errors)) => assert_eq!(errors[0].to_string(), "cabin.nope: unknown query parameter"),
        other => panic!("unexpected {:?}", other.map(|p| p.resource)),
    }
}
