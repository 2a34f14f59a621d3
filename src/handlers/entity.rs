//! Entity CRUD handlers: one per route shape, translating HTTP requests into
//! lifecycle operations and operation outputs into response envelopes.

use crate::error::LifecycleError;
use crate::op::UrlParams;
use crate::response::render_output;
use crate::role::Actor;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Extension, Json,
};
use serde_json::Value;

fn actor_from(ext: Option<Extension<Actor>>) -> Actor {
    ext.map(|Extension(a)| a).unwrap_or_default()
}

fn require_object(body: Value) -> Result<Value, LifecycleError> {
    if body.is_object() {
        Ok(body)
    } else {
        Err(LifecycleError::BadRequest("body must be a JSON object".into()))
    }
}

fn require_array(body: Value) -> Result<Vec<Value>, LifecycleError> {
    match body {
        Value::Array(items) => {
            for item in &items {
                if !item.is_object() {
                    return Err(LifecycleError::BadRequest(
                        "each item must be a JSON object".into(),
                    ));
                }
            }
            Ok(items)
        }
        _ => Err(LifecycleError::BadRequest("body must be a JSON array".into())),
    }
}

pub async fn list(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Query(params): Query<UrlParams>,
    actor: Option<Extension<Actor>>,
) -> Result<Response, LifecycleError> {
    let out = state
        .ops
        .read_many(actor_from(actor), &type_name, params)
        .await?;
    Ok(render_output(out, StatusCode::OK))
}

pub async fn read(
    State(state): State<AppState>,
    Path((type_name, id)): Path<(String, String)>,
    Query(params): Query<UrlParams>,
    actor: Option<Extension<Actor>>,
) -> Result<Response, LifecycleError> {
    let out = state
        .ops
        .read_one(actor_from(actor), &type_name, &id, params)
        .await?;
    Ok(render_output(out, StatusCode::OK))
}

pub async fn create(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Query(params): Query<UrlParams>,
    actor: Option<Extension<Actor>>,
    Json(body): Json<Value>,
) -> Result<Response, LifecycleError> {
    let body = require_object(body)?;
    let out = state
        .ops
        .create_one(actor_from(actor), &type_name, body, params)
        .await?;
    Ok(render_output(out, StatusCode::CREATED))
}

pub async fn update(
    State(state): State<AppState>,
    Path((type_name, id)): Path<(String, String)>,
    Query(params): Query<UrlParams>,
    actor: Option<Extension<Actor>>,
    Json(body): Json<Value>,
) -> Result<Response, LifecycleError> {
    let body = require_object(body)?;
    let out = state
        .ops
        .update_one(actor_from(actor), &type_name, &id, body, params)
        .await?;
    Ok(render_output(out, StatusCode::OK))
}

pub async fn patch(
    State(state): State<AppState>,
    Path((type_name, id)): Path<(String, String)>,
    Query(params): Query<UrlParams>,
    actor: Option<Extension<Actor>>,
    Json(body): Json<Value>,
) -> Result<Response, LifecycleError> {
    let body = require_object(body)?;
    let out = state
        .ops
        .patch_one(actor_from(actor), &type_name, &id, body, params)
        .await?;
    Ok(render_output(out, StatusCode::OK))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((type_name, id)): Path<(String, String)>,
    Query(params): Query<UrlParams>,
    actor: Option<Extension<Actor>>,
) -> Result<Response, LifecycleError> {
    let out = state
        .ops
        .delete_one(actor_from(actor), &type_name, &id, params)
        .await?;
    Ok(render_output(out, StatusCode::OK))
}

pub async fn create_many(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Query(params): Query<UrlParams>,
    actor: Option<Extension<Actor>>,
    Json(body): Json<Value>,
) -> Result<Response, LifecycleError> {
    let bodies = require_array(body)?;
    let out = state
        .ops
        .create_many(actor_from(actor), &type_name, bodies, params)
        .await?;
    Ok(render_output(out, StatusCode::CREATED))
}

pub async fn update_many(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Query(params): Query<UrlParams>,
    actor: Option<Extension<Actor>>,
    Json(body): Json<Value>,
) -> Result<Response, LifecycleError> {
    let bodies = require_array(body)?;
    let out = state
        .ops
        .update_many(actor_from(actor), &type_name, bodies, params)
        .await?;
    Ok(render_output(out, StatusCode::OK))
}

pub async fn patch_many(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Query(params): Query<UrlParams>,
    actor: Option<Extension<Actor>>,
    Json(body): Json<Value>,
) -> Result<Response, LifecycleError> {
    let patches = require_array(body)?;
    let out = state
        .ops
        .patch_many(actor_from(actor), &type_name, patches, params)
        .await?;
    Ok(render_output(out, StatusCode::OK))
}

pub async fn delete_many(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Query(params): Query<UrlParams>,
    actor: Option<Extension<Actor>>,
    Json(body): Json<Value>,
) -> Result<Response, LifecycleError> {
    let bodies = require_array(body)?;
    let out = state
        .ops
        .delete_many(actor_from(actor), &type_name, bodies, params)
        .await?;
    Ok(render_output(out, StatusCode::OK))
}
