//! JSON API handlers

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use requeststore::{Request, RequestFilter, RequestId, RequestStatus};
use serde::Deserialize;
use tracing::debug;

use super::AppState;
use super::error::ApiError;
use crate::wire::{CreateRequestBody, CreatedBody, HealthBody, PollBody, RespondBody, SourceBody, StatusBody};

/// Query string of `GET /api/requests`; empty values are ignored
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub source_name: Option<String>,
    pub app_name: Option<String>,
    pub status: Option<String>,
}

impl ListQuery {
    fn into_filter(self) -> Result<RequestFilter, ApiError> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        let status = non_empty(self.status)
            .map(|s| s.parse::<RequestStatus>())
            .transpose()
            .map_err(ApiError::bad_request)?;
        Ok(RequestFilter {
            source_name: non_empty(self.source_name),
            app_name: non_empty(self.app_name),
            status,
        })
    }
}

fn parse_id(raw: &str) -> Result<RequestId, ApiError> {
    raw.parse::<RequestId>()
        .ok()
        .filter(|id| *id >= 0)
        .ok_or_else(|| ApiError::bad_request("invalid id"))
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid body: {}", e)))
}

pub async fn health() -> Json<HealthBody> {
    Json(HealthBody::ok())
}

pub async fn source(State(state): State<AppState>) -> Json<SourceBody> {
    Json(SourceBody {
        source_name: state.source_name.to_string(),
    })
}

/// Create a request on behalf of a secondary, which then polls for the answer
pub async fn create_request(State(state): State<AppState>, body: Bytes) -> Result<Json<CreatedBody>, ApiError> {
    let body: CreateRequestBody = parse_body(&body)?;
    debug!(source_name = %body.source_name, app_name = %body.app_name, "create_request: called");
    if body.source_name.trim().is_empty() {
        return Err(ApiError::bad_request("source_name, app_name and question are required"));
    }

    let (id, handle) = state
        .manager
        .create_request(&body.source_name, &body.app_name, &body.question)
        .await?;
    // Remote callers poll; nobody waits locally
    drop(handle);

    state
        .broker
        .publish(id, &body.source_name, &body.app_name, &body.question);
    Ok(Json(CreatedBody { id }))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Request>>, ApiError> {
    debug!(?query, "list_requests: called");
    let filter = query.into_filter()?;
    Ok(Json(state.manager.list(filter).await?))
}

pub async fn get_request(State(state): State<AppState>, Path(raw): Path<String>) -> Result<Json<Request>, ApiError> {
    let id = parse_id(&raw)?;
    Ok(Json(state.manager.get(id).await?))
}

pub async fn poll_request(State(state): State<AppState>, Path(raw): Path<String>) -> Result<Json<PollBody>, ApiError> {
    let id = parse_id(&raw)?;
    let request = state.manager.get(id).await?;
    Ok(Json(PollBody {
        id: request.id,
        status: request.status,
        response: request.response,
    }))
}

pub async fn respond(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    body: Bytes,
) -> Result<Json<StatusBody>, ApiError> {
    let id = parse_id(&raw)?;
    let body: RespondBody = parse_body(&body)?;
    debug!(id, "respond: called");
    state.manager.respond(id, &body.response).await?;
    Ok(Json(StatusBody::ok()))
}
