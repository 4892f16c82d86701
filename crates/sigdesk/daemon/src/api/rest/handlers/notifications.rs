//! Notification feed handlers

use super::require_actor;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use sigdesk_notify::Notification;

pub async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Notification>>> {
    let actor = require_actor(&state, &headers).await?;
    let feed = state
        .service
        .notifications()
        .list_notifications(&actor)
        .await?;
    Ok(Json(feed))
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread: usize,
}

pub async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<UnreadCountResponse>> {
    let actor = require_actor(&state, &headers).await?;
    let unread = state.service.notifications().unread_count(&actor).await?;
    Ok(Json(UnreadCountResponse { unread }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = require_actor(&state, &headers).await?;
    state.service.notifications().mark_read(&actor, &id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = require_actor(&state, &headers).await?;
    let updated = state.service.notifications().mark_all_read(&actor).await?;
    Ok(Json(serde_json::json!({ "success": true, "updated": updated })))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = require_actor(&state, &headers).await?;
    state.service.notifications().delete(&actor, &id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
