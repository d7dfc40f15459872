//! Link item endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use docprep_common::types::Pagination;

use super::AppState;
use crate::error::ApiResult;
use crate::models::{ItemKind, PipelineItem};

const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct UploadLinkRequest {
    pub uri: String,
}

pub async fn list_links(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<Value>> {
    let links = state
        .service
        .list(ItemKind::Link, pagination.clamped(MAX_PAGE_SIZE))
        .await?;
    Ok(Json(json!({ "links": links })))
}

pub async fn upload_link(
    State(state): State<AppState>,
    Json(request): Json<UploadLinkRequest>,
) -> ApiResult<(StatusCode, Json<PipelineItem>)> {
    let item = state.service.register_link(&request.uri).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineItem>> {
    Ok(Json(state.service.get(ItemKind::Link, id).await?))
}

pub async fn retry_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineItem>> {
    Ok(Json(state.service.retry(ItemKind::Link, id).await?))
}

pub async fn cancel_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineItem>> {
    Ok(Json(state.service.cancel(ItemKind::Link, id).await?))
}

pub async fn delete_link(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let item = state.service.delete(ItemKind::Link, id).await?;
    Ok(Json(json!({
        "message": format!("link '{}' queued for deletion", item.id)
    })))
}
