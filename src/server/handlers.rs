//! HTTP request handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{RegistryError, ScheduleError};
use crate::model::{Filter, Update};
use crate::payload::FilePayload;

use super::ApiState;

/// Body of `POST /api/updates/cancel`.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub update_id: String,
}

/// Uniform error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(code: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        code,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn registry_error(err: RegistryError) -> axum::response::Response {
    let code = match err {
        RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
        RegistryError::AlreadyExists { .. } => StatusCode::CONFLICT,
        RegistryError::Invalid { .. } => StatusCode::BAD_REQUEST,
        RegistryError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(code, err.to_string())
}

fn schedule_error(err: ScheduleError) -> axum::response::Response {
    let code = match err {
        ScheduleError::NotFound { .. } => StatusCode::NOT_FOUND,
        ScheduleError::AlreadyScheduled { .. } => StatusCode::CONFLICT,
        ScheduleError::AlreadyRunning | ScheduleError::NotRunning => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    };
    error_response(code, err.to_string())
}

/// `GET /`: the embedded dashboard page.
pub async fn dashboard() -> Html<&'static str> {
    Html(include_str!("../../static/dashboard.html"))
}

/// `GET /api/devices`
pub async fn list_devices(State(state): State<Arc<ApiState>>) -> axum::response::Response {
    match state.registry.list(&Filter::default()).await {
        Ok(devices) => Json(devices).into_response(),
        Err(err) => registry_error(err),
    }
}

/// `GET /api/devices/:id`
pub async fn get_device(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.registry.get(&id).await {
        Ok(device) => Json(device).into_response(),
        Err(err) => registry_error(err),
    }
}

/// `GET /api/updates`
pub async fn list_updates(State(state): State<Arc<ApiState>>) -> axum::response::Response {
    Json(state.scheduler.list_all().await).into_response()
}

/// `GET /api/updates/:id`
pub async fn get_update(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.scheduler.status(&id).await {
        Ok(status) => Json(status).into_response(),
        Err(err) => schedule_error(err),
    }
}

/// `POST /api/updates/schedule`: accepts an [`Update`] whose
/// `payload_url` names a file served as the payload.
pub async fn schedule_update(
    State(state): State<Arc<ApiState>>,
    Json(update): Json<Update>,
) -> axum::response::Response {
    let Some(payload_url) = update.payload_url.clone().filter(|u| !u.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "payload_url is required");
    };
    let path = payload_url.strip_prefix("file://").unwrap_or(&payload_url);
    let payload = Arc::new(FilePayload::new(path));

    match state.scheduler.schedule(update, payload).await {
        Ok(()) => Json(json!({ "status": "scheduled" })).into_response(),
        Err(err) => schedule_error(err),
    }
}

/// `POST /api/updates/cancel`
pub async fn cancel_update(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CancelRequest>,
) -> axum::response::Response {
    match state.scheduler.cancel(&request.update_id).await {
        Ok(()) => Json(json!({ "status": "cancelled" })).into_response(),
        Err(err) => schedule_error(err),
    }
}
