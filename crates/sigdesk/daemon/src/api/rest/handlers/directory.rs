//! User and sector administration handlers

use super::{require_actor, PageQuery, Paged};
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use sigdesk_service::UserUpdate;
use sigdesk_types::{Role, Sector, SectorId, User, UserId};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub name: String,
    pub password: String,
    pub role: Role,
    pub sector_id: String,
}

pub async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateUserRequest>,
) -> ApiResult<Json<User>> {
    let actor = require_actor(&state, &headers).await?;
    let user = state
        .service
        .directory()
        .create_user(
            &actor,
            &request.username,
            &request.name,
            &request.password,
            request.role,
            SectorId::new(request.sector_id),
        )
        .await?;
    Ok(Json(user))
}

pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Paged<User>>> {
    let actor = require_actor(&state, &headers).await?;
    let total = state
        .service
        .directory()
        .list_users(&actor, sigdesk_storage::QueryWindow::default())
        .await?
        .len();
    let items = state
        .service
        .directory()
        .list_users(&actor, page.window())
        .await?;
    Ok(Json(Paged {
        items,
        total,
        page: page.page(),
    }))
}

pub async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<User>> {
    let actor = require_actor(&state, &headers).await?;
    let user = state
        .service
        .directory()
        .get_user(&actor, &UserId::new(id))
        .await?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub name: Option<String>,
    pub role: Option<Role>,
    pub sector_id: Option<String>,
    pub password: Option<String>,
}

pub async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    let actor = require_actor(&state, &headers).await?;
    let update = UserUpdate {
        username: request.username,
        name: request.name,
        role: request.role,
        sector_id: request.sector_id.map(SectorId::new),
        password: request.password,
    };
    let user = state
        .service
        .directory()
        .update_user(&actor, &UserId::new(id), update)
        .await?;
    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = require_actor(&state, &headers).await?;
    state
        .service
        .directory()
        .delete_user(&actor, &UserId::new(id))
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct SectorRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

pub async fn create_sector(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SectorRequest>,
) -> ApiResult<Json<Sector>> {
    let actor = require_actor(&state, &headers).await?;
    let sector = state
        .service
        .directory()
        .create_sector(&actor, &request.name, &request.description)
        .await?;
    Ok(Json(sector))
}

/// Sector listing needs a session but no privilege; signature creation
/// and user forms both read it.
pub async fn list_sectors(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Sector>>> {
    require_actor(&state, &headers).await?;
    Ok(Json(state.service.directory().list_sectors().await?))
}

pub async fn update_sector(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<SectorRequest>,
) -> ApiResult<Json<Sector>> {
    let actor = require_actor(&state, &headers).await?;
    let sector = state
        .service
        .directory()
        .update_sector(&actor, &SectorId::new(id), &request.name, &request.description)
        .await?;
    Ok(Json(sector))
}

pub async fn delete_sector(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = require_actor(&state, &headers).await?;
    state
        .service
        .directory()
        .delete_sector(&actor, &SectorId::new(id))
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
