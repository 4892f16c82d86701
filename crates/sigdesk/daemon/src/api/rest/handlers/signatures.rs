//! Signature record and attachment handlers

use super::{require_actor, PageQuery, Paged};
use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sigdesk_storage::SignatureFilter;
use sigdesk_types::{Attachment, AttachmentId, Signature, SignatureId};

#[derive(Debug, Deserialize)]
pub struct CreateSignatureRequest {
    pub reason: String,
    pub token: String,
}

pub async fn create_signature(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSignatureRequest>,
) -> ApiResult<Json<Signature>> {
    let actor = require_actor(&state, &headers).await?;
    let signature = state
        .service
        .signatures()
        .create_signature(&actor, &request.reason, &request.token)
        .await?;
    Ok(Json(signature))
}

/// Listing filters plus paging, all optional.
#[derive(Debug, Deserialize)]
pub struct ListSignaturesQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub search: Option<String>,
    pub token: Option<String>,
    pub server: Option<String>,
    pub sector: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

pub async fn list_signatures(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListSignaturesQuery>,
) -> ApiResult<Json<Paged<Signature>>> {
    require_actor(&state, &headers).await?;
    let filter = SignatureFilter {
        search: query.search,
        token: query.token,
        server: query.server,
        sector: query.sector,
        created_from: query.from,
        created_until: query.until,
    };
    let paging = PageQuery {
        page: query.page,
        limit: query.limit,
    };
    let (items, total) = state
        .service
        .signatures()
        .list_signatures(&filter, paging.window())
        .await?;
    Ok(Json(Paged {
        items,
        total,
        page: paging.page(),
    }))
}

/// Distinct server names across all records, for the filter dropdown.
pub async fn list_servers(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    require_actor(&state, &headers).await?;
    let servers = state.service.signatures().server_options().await?;
    Ok(Json(serde_json::json!({ "servers": servers })))
}

/// The fixed token list the creation form offers.
pub async fn list_tokens(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    require_actor(&state, &headers).await?;
    let tokens = state.service.signatures().token_options();
    Ok(Json(serde_json::json!({ "tokens": tokens })))
}

pub async fn get_signature(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Signature>> {
    let actor = require_actor(&state, &headers).await?;
    let signature = state
        .service
        .signatures()
        .get_signature(&actor, &SignatureId::new(id))
        .await?;
    Ok(Json(signature))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSignatureRequest {
    pub reason: String,
    pub token: String,
}

/// The direct update path for owners and privileged users.
pub async fn update_signature(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<UpdateSignatureRequest>,
) -> ApiResult<Json<Signature>> {
    let actor = require_actor(&state, &headers).await?;
    let signature = state
        .service
        .signatures()
        .update_signature(&actor, &SignatureId::new(id), &request.reason, &request.token)
        .await?;
    Ok(Json(signature))
}

pub async fn delete_signature(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = require_actor(&state, &headers).await?;
    state
        .service
        .signatures()
        .delete_signature(&actor, &SignatureId::new(id))
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn can_edit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<sigdesk_workflow::EditGate>> {
    let actor = require_actor(&state, &headers).await?;
    let gate = state
        .service
        .workflow()
        .can_edit(&actor, &SignatureId::new(id))
        .await?;
    Ok(Json(gate))
}

/// The gated edit path, consuming an approved edit request.
pub async fn apply_edit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<UpdateSignatureRequest>,
) -> ApiResult<Json<Signature>> {
    let actor = require_actor(&state, &headers).await?;
    let signature = state
        .service
        .workflow()
        .apply_approved_edit(&actor, &SignatureId::new(id), &request.reason, &request.token)
        .await?;
    Ok(Json(signature))
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: String,
}

/// Upload: raw bytes in the body, mime from Content-Type, name in the
/// query string.
pub async fn upload_attachment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> ApiResult<Json<Attachment>> {
    let actor = require_actor(&state, &headers).await?;
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Validation("content-type header is required".to_string()))?;
    let attachment = state
        .service
        .signatures()
        .add_attachment(
            &actor,
            &SignatureId::new(id),
            &query.filename,
            mime_type,
            body.to_vec(),
        )
        .await?;
    Ok(Json(attachment))
}

pub async fn list_attachments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Attachment>>> {
    let actor = require_actor(&state, &headers).await?;
    let attachments = state
        .service
        .signatures()
        .list_attachments(&actor, &SignatureId::new(id))
        .await?;
    Ok(Json(attachments))
}

pub async fn download_attachment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let actor = require_actor(&state, &headers).await?;
    let (attachment, bytes) = state
        .service
        .signatures()
        .attachment_bytes(&actor, &AttachmentId::new(id))
        .await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, attachment.mime_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", attachment.filename),
            ),
        ],
        bytes,
    )
        .into_response())
}

pub async fn delete_attachment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let actor = require_actor(&state, &headers).await?;
    state
        .service
        .signatures()
        .delete_attachment(&actor, &AttachmentId::new(id))
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
