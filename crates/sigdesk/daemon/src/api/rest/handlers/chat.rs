//! Chat handlers, including the unauthenticated guest surface

use super::{require_actor, PageQuery};
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use sigdesk_chat::ConversationSummary;
use sigdesk_types::{ChatMessage, MessageId, PartyId};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub to: String,
    pub text: String,
}

pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<Json<ChatMessage>> {
    let actor = require_actor(&state, &headers).await?;
    let message = state
        .service
        .chat()
        .send_message(&actor, PartyId(request.to), &request.text)
        .await?;
    Ok(Json(message))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    let actor = require_actor(&state, &headers).await?;
    let me = PartyId::user(&actor.user_id);
    Ok(Json(state.service.chat().list_conversations(&me).await?))
}

pub async fn conversation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(party): Path<String>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let actor = require_actor(&state, &headers).await?;
    let me = PartyId::user(&actor.user_id);
    let other = PartyId(party);
    Ok(Json(state.service.chat().conversation(&me, &other).await?))
}

pub async fn inbox(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let actor = require_actor(&state, &headers).await?;
    let me = PartyId::user(&actor.user_id);
    Ok(Json(state.service.chat().inbox(&me, page.window()).await?))
}

pub async fn mark_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = require_actor(&state, &headers).await?;
    let me = PartyId::user(&actor.user_id);
    state
        .service
        .chat()
        .mark_read(&me, &MessageId::new(id))
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct GuestMessageRequest {
    pub name: String,
    pub username: String,
    pub text: String,
}

/// Unauthenticated: guests have no account and no session.
pub async fn guest_send(
    State(state): State<AppState>,
    Json(request): Json<GuestMessageRequest>,
) -> ApiResult<Json<ChatMessage>> {
    let message = state
        .service
        .chat()
        .send_guest_message(&request.name, &request.username, &request.text)
        .await?;
    Ok(Json(message))
}

/// Unauthenticated polling endpoint for a guest's conversation. The guest
/// party id is derived from the username, so a guest can only ever see the
/// thread they could also write to.
pub async fn guest_conversation(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let guest = PartyId::guest(&username);
    let messages = state
        .service
        .chat()
        .list_conversations(&guest)
        .await?
        .into_iter()
        .map(|summary| summary.partner)
        .collect::<Vec<_>>();
    let mut thread = Vec::new();
    for partner in messages {
        thread.extend(state.service.chat().conversation(&guest, &partner).await?);
    }
    thread.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(Json(thread))
}
