use super::ApiError;
use crate::refresh::{refresh_subscription, RefreshReport};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sbp_types::{Subscription, UpdateMode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionForm {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Minutes between auto-updates; 0 disables.
    #[serde(default)]
    pub update_interval: Option<i64>,
    #[serde(default)]
    pub update_mode: Option<UpdateMode>,
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Subscription>>, ApiError> {
    Ok(Json(state.store.list_subscriptions().await?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(form): Json<SubscriptionForm>,
) -> Result<Json<Subscription>, ApiError> {
    let mut sub = Subscription {
        id: 0,
        name: form.name,
        url: form.url,
        enabled: form.enabled.unwrap_or(true),
        update_interval: form.update_interval.unwrap_or(0),
        update_mode: form.update_mode.unwrap_or_default(),
        last_update: 0,
        node_count: 0,
    };
    sub.id = state.store.add_subscription(&sub).await?;
    Ok(Json(sub))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(form): Json<SubscriptionForm>,
) -> Result<Json<Value>, ApiError> {
    let mut sub = state
        .store
        .get_subscription(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    sub.name = form.name;
    sub.url = form.url;
    if let Some(enabled) = form.enabled {
        sub.enabled = enabled;
    }
    if let Some(interval) = form.update_interval {
        sub.update_interval = interval;
    }
    if let Some(mode) = form.update_mode {
        sub.update_mode = mode;
    }
    state.store.update_subscription(&sub).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    state.store.delete_subscription(id).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn refresh(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RefreshReport>, ApiError> {
    let sub = state
        .store
        .get_subscription(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let report = refresh_subscription(&state, &sub)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(report))
}

/// Client-facing export: every shareable row as a link list, base64-coded
/// the way subscription clients expect.
pub async fn export_links(State(state): State<AppState>) -> Result<String, ApiError> {
    let rows = state.store.list_all().await?;
    let mut lines = Vec::with_capacity(rows.len());
    for row in rows {
        if row.kind.is_synthetic() {
            continue;
        }
        match sbp_subscribe::outbound_to_link(&row.singbox_map()) {
            Ok(link) => lines.push(link),
            Err(e) => debug!(tag = %row.tag, error = %e, "row not exportable"),
        }
    }
    Ok(STANDARD.encode(lines.join("\n")))
}
