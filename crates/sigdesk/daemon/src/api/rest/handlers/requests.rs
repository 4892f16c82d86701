//! Workflow request handlers

use super::{require_actor, PageQuery, Paged};
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use sigdesk_types::{Decision, Request, RequestId, RequestStatus, RequestType, SignatureId};

#[derive(Debug, Deserialize)]
pub struct CreateRequestRequest {
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub signature_id: String,
    pub reason: String,
}

pub async fn create_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateRequestRequest>,
) -> ApiResult<Json<Request>> {
    let actor = require_actor(&state, &headers).await?;
    let created = state
        .service
        .workflow()
        .create_request(
            &actor,
            request.request_type,
            &SignatureId::new(request.signature_id),
            &request.reason,
        )
        .await?;
    Ok(Json(created))
}

#[derive(Debug, Deserialize)]
pub struct ListRequestsQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    pub status: Option<RequestStatus>,
}

pub async fn list_requests(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListRequestsQuery>,
) -> ApiResult<Json<Paged<Request>>> {
    let actor = require_actor(&state, &headers).await?;
    let paging = PageQuery {
        page: query.page,
        limit: query.limit,
    };
    let (items, total) = state
        .service
        .workflow()
        .list_requests(&actor, query.status, paging.window())
        .await?;
    Ok(Json(Paged {
        items,
        total,
        page: paging.page(),
    }))
}

pub async fn get_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Request>> {
    let actor = require_actor(&state, &headers).await?;
    let request = state
        .service
        .workflow()
        .get_request(&actor, &RequestId::new(id))
        .await?;
    Ok(Json(request))
}

#[derive(Debug, Deserialize)]
pub struct AdjudicateRequest {
    pub decision: Decision,
    pub admin_response: Option<String>,
}

pub async fn adjudicate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<AdjudicateRequest>,
) -> ApiResult<Json<Request>> {
    let actor = require_actor(&state, &headers).await?;
    let adjudicated = state
        .service
        .workflow()
        .adjudicate(
            &actor,
            &RequestId::new(id),
            request.decision,
            request.admin_response,
        )
        .await?;
    Ok(Json(adjudicated))
}
