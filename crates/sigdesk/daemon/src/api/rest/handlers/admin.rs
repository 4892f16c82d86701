//! Administrative export handlers

use super::require_actor;
use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use sigdesk_export::Table;

pub async fn export_table(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(table): Path<String>,
) -> ApiResult<Response> {
    let actor = require_actor(&state, &headers).await?;
    let name = table.to_lowercase();
    let table: Table = name.parse()?;
    let bytes = state.service.export().export_table(&actor, table).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.csv\"", name),
            ),
        ],
        bytes,
    )
        .into_response())
}

pub async fn export_attachments(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let actor = require_actor(&state, &headers).await?;
    let bytes = state.service.export().export_attachments(&actor).await?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zstd".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"attachments.tar.zst\"".to_string(),
            ),
        ],
        bytes,
    )
        .into_response())
}
