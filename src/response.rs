//! Standard response envelope helpers.

use crate::orchestrator::OpOutput;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Serialize)]
pub struct SuccessMany<T> {
    pub data: Vec<T>,
    pub meta: MetaCount,
}

#[derive(Serialize)]
pub struct MetaCount {
    pub count: u64,
}

/// Render a successful operation. A Render hook's custom body wins over the
/// default envelope; read-many prefers the mapper total for the count.
pub fn render_output(out: OpOutput, status: StatusCode) -> Response {
    if let Some(body) = out.custom_body {
        return (status, Json(body)).into_response();
    }
    match out.payload.endpoint.cardinality {
        crate::op::Cardinality::One => {
            let data = out.payload.models.into_iter().next().unwrap_or(Value::Null);
            (status, Json(SuccessOne { data, meta: None })).into_response()
        }
        crate::op::Cardinality::Many => {
            let count = out.total.unwrap_or(out.payload.models.len() as u64);
            (
                status,
                Json(SuccessMany {
                    data: out.payload.models,
                    meta: MetaCount { count },
                }),
            )
                .into_response()
        }
    }
}
