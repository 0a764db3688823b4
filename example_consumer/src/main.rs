//! Example consumer: an API layer that compiles query strings with turbase-query and
//! answers with the plan and the rendered SQL.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Or from this directory: `cargo run`

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use turbase_query::{
    compile, load_from_file, load_from_pool, resolve, select, select_by_id, AppError, RequestParams, RequestTarget,
    ResourceCatalog, CONFIG_TABLE,
};

#[derive(Clone)]
struct AppState {
    catalog: Arc<ResourceCatalog>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("turbase_query=info,example_consumer=info")),
        )
        .init();

    // DATABASE_URL selects the configuration table; otherwise the catalog comes from a file.
    let catalog = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(2)
                .connect(&database_url)
                .await?;
            let table = std::env::var("CONFIG_TABLE").unwrap_or_else(|_| CONFIG_TABLE.into());
            resolve(&load_from_pool(&pool, &table).await?)?
        }
        Err(_) => {
            let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "tests/fixtures/catalog.json".into());
            load_from_file(&config_path)?
        }
    };
    let state = AppState {
        catalog: Arc::new(catalog),
    };

    let app = Router::new()
        .route("/:resource", get(list))
        .route("/:resource/:id", get(single))
        .with_state(state);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("Example consumer listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn list(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, AppError> {
    respond(&state.catalog, &resource, None, pairs)
}

async fn single(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, String)>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, AppError> {
    respond(&state.catalog, &resource, Some(&id), pairs)
}

fn respond(
    catalog: &ResourceCatalog,
    resource: &str,
    id: Option<&str>,
    pairs: Vec<(String, String)>,
) -> Result<Json<Value>, AppError> {
    if !catalog.resources.contains_key(resource) {
        return Err(AppError::NotFound(resource.to_string()));
    }
    let target = if id.is_some() { RequestTarget::Single } else { RequestTarget::List };
    let params = RequestParams::from_pairs(pairs);
    let plan = compile(catalog, resource, target, &params)?.into_result()?;
    let query = match id {
        Some(id) => select_by_id(catalog, &plan, id)?,
        None => select(catalog, &plan)?,
    };
    Ok(Json(json!({
        "plan": plan,
        "sql": query.sql,
        "params": query.params,
    })))
}
