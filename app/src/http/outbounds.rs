use super::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use sbp_types::Outbound;
use serde_json::{json, Map, Value};

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Outbound>>, ApiError> {
    Ok(Json(state.store.list_all().await?))
}

/// Body: a raw sing-box outbound dictionary (`type`, `tag`, options).
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Outbound>, ApiError> {
    let mut ob = Outbound::from_singbox(&body).map_err(ApiError::BadRequest)?;
    ob.id = state.store.insert(&ob).await?;
    Ok(Json(ob))
}

pub async fn update(
    State(state): State<AppState>,
    Path(tag): Path<String>,
    Json(body): Json<Map<String, Value>>,
) -> Result<Json<Value>, ApiError> {
    let ob = Outbound::from_singbox(&body).map_err(ApiError::BadRequest)?;
    state.store.update_config(&tag, &ob).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.store.delete(&tag).await? {
        return Err(ApiError::NotFound);
    }
    Ok(Json(json!({ "ok": true })))
}

pub async fn share_link(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let ob = state
        .store
        .get_by_tag(&tag)
        .await?
        .ok_or(ApiError::NotFound)?;
    let link = sbp_subscribe::outbound_to_link(&ob.singbox_map())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(json!({ "link": link })))
}
