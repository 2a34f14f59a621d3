//! Lifecycle error taxonomy and HTTP mapping.
//!
//! Every failure renders a JSON body `{msg, code, error, moreInfo}` with an
//! HTTP status drawn from the taxonomy; no error kind silently succeeds.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Numeric application error codes carried in the rendered body.
pub mod code {
    pub const CREATE: i64 = 1001;
    pub const UPDATE: i64 = 1002;
    pub const PATCH: i64 = 1003;
    pub const DELETE: i64 = 1004;
    pub const NOT_FOUND: i64 = 1005;
    pub const INTERNAL: i64 = 1006;
    pub const TX_BEGIN: i64 = 1007;
    pub const COMMIT: i64 = 1008;
    pub const DATABASE: i64 = 1009;
    pub const BAD_REQUEST: i64 = 1010;
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("error in creating resource")]
    CreateFailed { detail: String },
    #[error("error in updating resource")]
    UpdateFailed { detail: String },
    #[error("error in patching resource")]
    PatchFailed { detail: String },
    #[error("error in deleting resource")]
    DeleteFailed { detail: String },
    #[error("resource not found")]
    NotFound,
    #[error("internal server error")]
    Internal { detail: String },
    #[error("transaction could not be started")]
    TxBegin { detail: String },
    #[error("transaction commit failed")]
    Commit { detail: String },
    #[error("database error")]
    Db(#[from] sqlx::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Mapper-supplied render passed through untouched.
    #[error("{}", .0.msg)]
    Custom(Rendered),
}

/// Render-ready error: HTTP status plus the JSON body fields.
#[derive(Clone, Debug)]
pub struct Rendered {
    pub status: StatusCode,
    pub code: i64,
    pub msg: String,
    pub error: String,
    pub more_info: Option<Value>,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub msg: String,
    pub code: i64,
    pub error: String,
    #[serde(rename = "moreInfo", skip_serializing_if = "Option::is_none")]
    pub more_info: Option<Value>,
}

impl Rendered {
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            msg: self.msg.clone(),
            code: self.code,
            error: self.error.clone(),
            more_info: self.more_info.clone(),
        }
    }
}

impl LifecycleError {
    pub fn render(&self) -> Rendered {
        let (status, code, detail) = match self {
            LifecycleError::CreateFailed { detail } => {
                (StatusCode::BAD_REQUEST, code::CREATE, detail.clone())
            }
            LifecycleError::UpdateFailed { detail } => {
                (StatusCode::BAD_REQUEST, code::UPDATE, detail.clone())
            }
            LifecycleError::PatchFailed { detail } => {
                (StatusCode::BAD_REQUEST, code::PATCH, detail.clone())
            }
            LifecycleError::DeleteFailed { detail } => {
                (StatusCode::BAD_REQUEST, code::DELETE, detail.clone())
            }
            LifecycleError::NotFound => (StatusCode::NOT_FOUND, code::NOT_FOUND, String::new()),
            LifecycleError::Internal { detail } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                code::INTERNAL,
                detail.clone(),
            ),
            LifecycleError::TxBegin { detail } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                code::TX_BEGIN,
                detail.clone(),
            ),
            LifecycleError::Commit { detail } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                code::COMMIT,
                detail.clone(),
            ),
            LifecycleError::Db(e) => {
                if matches!(e, sqlx::Error::RowNotFound) {
                    return Rendered {
                        status: StatusCode::NOT_FOUND,
                        code: code::NOT_FOUND,
                        msg: "resource not found".into(),
                        error: String::new(),
                        more_info: None,
                    };
                }
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    code::DATABASE,
                    db_detail(e),
                )
            }
            LifecycleError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, code::BAD_REQUEST, detail.clone())
            }
            LifecycleError::Custom(r) => return r.clone(),
        };
        Rendered {
            status,
            code,
            msg: self.to_string(),
            error: detail,
            more_info: None,
        }
    }
}

/// Postgres errors surface the driver message plus SQLSTATE code instead of
/// the raw Display string.
fn db_detail(e: &sqlx::Error) -> String {
    if let sqlx::Error::Database(db) = e {
        if let Some(pg) = db.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
            return format!("{} ({})", pg.message(), pg.code());
        }
        if let Some(c) = db.code() {
            return format!("{} ({})", db.message(), c);
        }
        return db.message().to_string();
    }
    e.to_string()
}

impl IntoResponse for LifecycleError {
    fn into_response(self) -> Response {
        let rendered = self.render();
        (rendered.status, Json(rendered.body())).into_response()
    }
}

impl IntoResponse for Rendered {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verb_defaults_render_400_with_distinct_texts() {
        let cases = [
            (
                LifecycleError::CreateFailed { detail: "boom".into() },
                "error in creating resource",
                code::CREATE,
            ),
            (
                LifecycleError::UpdateFailed { detail: "boom".into() },
                "error in updating resource",
                code::UPDATE,
            ),
            (
                LifecycleError::PatchFailed { detail: "boom".into() },
                "error in patching resource",
                code::PATCH,
            ),
            (
                LifecycleError::DeleteFailed { detail: "boom".into() },
                "error in deleting resource",
                code::DELETE,
            ),
        ];
        for (err, msg, code) in cases {
            let r = err.render();
            assert_eq!(r.status, StatusCode::BAD_REQUEST);
            assert_eq!(r.msg, msg);
            assert_eq!(r.code, code);
            assert_eq!(r.error, "boom");
        }
    }

    #[test]
    fn not_found_renders_404() {
        let r = LifecycleError::NotFound.render();
        assert_eq!(r.status, StatusCode::NOT_FOUND);
        assert_eq!(r.msg, "resource not found");
    }

    #[test]
    fn row_not_found_maps_to_404_not_generic_database_error() {
        let r = LifecycleError::Db(sqlx::Error::RowNotFound).render();
        assert_eq!(r.status, StatusCode::NOT_FOUND);
        assert_eq!(r.code, code::NOT_FOUND);
    }

    #[test]
    fn custom_render_passes_through_untouched() {
        let custom = Rendered {
            status: StatusCode::CONFLICT,
            code: 4242,
            msg: "already exists".into(),
            error: "duplicate slug".into(),
            more_info: Some(serde_json::json!({"slug": "a"})),
        };
        let r = LifecycleError::Custom(custom.clone()).render();
        assert_eq!(r.status, custom.status);
        assert_eq!(r.code, 4242);
        assert_eq!(r.msg, "already exists");
        assert_eq!(r.error, "duplicate slug");
    }

    #[test]
    fn body_serializes_more_info_only_when_present() {
        let r = LifecycleError::Internal { detail: "x".into() }.render();
        let v = serde_json::to_value(r.body()).unwrap();
        assert_eq!(v["msg"], "internal server error");
        assert_eq!(v["code"], code::INTERNAL);
        assert_eq!(v["error"], "x");
        assert!(v.get("moreInfo").is_none());
    }
}
