//! Request handlers

pub mod admin;
pub mod auth;
pub mod chat;
pub mod directory;
pub mod notifications;
pub mod requests;
pub mod signatures;

use super::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::{Deserialize, Serialize};
use sigdesk_storage::QueryWindow;
use sigdesk_types::Actor;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

/// Resolve the caller from the Authorization header.
pub async fn require_actor(state: &AppState, headers: &HeaderMap) -> ApiResult<Actor> {
    let token = bearer_token(headers)?;
    Ok(state.service.identity().authenticate(token).await?)
}

pub fn bearer_token(headers: &HeaderMap) -> ApiResult<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)
}

/// Common paging parameters, 1-based pages.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl PageQuery {
    pub fn window(&self) -> QueryWindow {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let page = self.page.unwrap_or(1).max(1);
        QueryWindow {
            limit,
            offset: (page - 1) * limit,
        }
    }

    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }
}

/// A page of results plus the unpaged total.
#[derive(Debug, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub uptime_secs: i64,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: state.version.clone(),
        uptime_secs: (chrono::Utc::now() - state.started_at).num_seconds(),
    })
}
