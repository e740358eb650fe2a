use super::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use sbp_types::ProbeResult;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    /// Probe only these tags; absent = every probeable row.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// 0 = pipeline default (50 reachability / 10 enriched).
    #[serde(default)]
    pub concurrency: usize,
    /// Run the full landing-IP pipeline instead of reachability only.
    #[serde(default, rename = "withLanding")]
    pub with_landing: bool,
}

/// Batch probe; results are persisted as they complete.
pub async fn test_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> Result<Json<Vec<ProbeResult>>, ApiError> {
    let cancel = state.shutdown.child_token();
    let results = match req.tags {
        Some(tags) => {
            state
                .engine
                .test_selected(&tags, req.concurrency, req.with_landing, &cancel)
                .await?
        }
        None => {
            state
                .engine
                .test_all(req.concurrency, req.with_landing, &cancel)
                .await?
        }
    };
    Ok(Json(results))
}

/// One-off reachability check; does not touch the row.
pub async fn test_single(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<ProbeResult>, ApiError> {
    Ok(Json(state.engine.test_outbound(&tag).await?))
}

/// One-off full pipeline; does not touch the row.
pub async fn test_landing(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<ProbeResult>, ApiError> {
    let cancel = state.shutdown.child_token();
    Ok(Json(
        state.engine.test_outbound_with_landing(&tag, &cancel).await?,
    ))
}
