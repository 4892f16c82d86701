//! Authentication handlers

use super::require_actor;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use sigdesk_types::User;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
    pub must_change_password: bool,
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let outcome = state
        .service
        .identity()
        .login(&request.username, &request.password)
        .await?;
    Ok(Json(LoginResponse {
        token: outcome.token,
        user: outcome.user,
        must_change_password: outcome.must_change_password,
    }))
}

pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<User>> {
    let actor = require_actor(&state, &headers).await?;
    let user = state
        .service
        .directory()
        .get_user(&actor, &actor.user_id)
        .await?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChangePasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = require_actor(&state, &headers).await?;
    state
        .service
        .identity()
        .change_password(&actor, &request.current_password, &request.new_password)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct SecurityQuestionRequest {
    pub question: String,
    pub answer: String,
}

pub async fn set_security_question(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SecurityQuestionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = require_actor(&state, &headers).await?;
    state
        .service
        .identity()
        .set_security_question(&actor, &request.question, &request.answer)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Serialize)]
pub struct SecurityQuestionResponse {
    pub question: Option<String>,
}

/// Unauthenticated: the recovery flow starts before login.
pub async fn security_question(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<SecurityQuestionResponse>> {
    let question = state.service.identity().security_question(&username).await?;
    Ok(Json(SecurityQuestionResponse { question }))
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub username: String,
    pub answer: String,
    pub new_password: String,
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .service
        .identity()
        .reset_password(&request.username, &request.answer, &request.new_password)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
