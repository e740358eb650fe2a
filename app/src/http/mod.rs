//! REST surface of the panel. Session handling and the SPA are fronted by
//! an external layer; this is the JSON seam it talks to.

pub mod nodes;
pub mod outbounds;
pub mod subs;

use crate::state::AppState;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use sbp_core::{ProbeError, StoreError};
use serde_json::json;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/outbounds",
            get(outbounds::list).post(outbounds::create),
        )
        .route(
            "/api/outbounds/:tag",
            axum::routing::put(outbounds::update).delete(outbounds::remove),
        )
        .route("/api/outbounds/:tag/link", get(outbounds::share_link))
        .route("/api/nodes/test", post(nodes::test_batch))
        .route("/api/nodes/:tag/test", get(nodes::test_single))
        .route("/api/nodes/:tag/landing", get(nodes::test_landing))
        .route("/api/subscriptions", get(subs::list).post(subs::create))
        .route(
            "/api/subscriptions/:id",
            axum::routing::put(subs::update).delete(subs::remove),
        )
        .route("/api/subscriptions/:id/refresh", post(subs::refresh))
        .route("/sub", get(subs::export_links))
        .with_state(state)
}

/// Handler error mapped onto a JSON body and a status code.
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::DuplicateTag(tag) => ApiError::BadRequest(format!("duplicate tag: {tag}")),
            StoreError::Db(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<ProbeError> for ApiError {
    fn from(e: ProbeError) -> Self {
        match e {
            ProbeError::NotFound(_) => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}
