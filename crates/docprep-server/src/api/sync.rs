//! Reconciliation endpoints.
//!
//! `GET /api/files/sync` previews the corrective plan without touching the
//! store; `POST /api/files/sync` applies it.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;
use crate::error::ApiResult;

pub async fn preview_sync(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let (actions, summary) = state.service.sync_preview().await?;
    Ok(Json(json!({
        "summary": summary,
        "actions": actions,
    })))
}

pub async fn apply_sync(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let summary = state.service.sync_apply().await?;
    Ok(Json(json!({
        "message": "sync applied",
        "summary": summary,
    })))
}
