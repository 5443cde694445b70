//! # HTTP Routes
//!
//! The axum surface in front of the [`RequestDispatcher`].
//!
//! ## Endpoints:
//! - `POST /api/maritime/ais-stream`: action dispatch. Other methods get 405.
//! - `GET /api/maritime/status`: aggregate figures. Other methods get 405.
//! - `GET /health`: liveness.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use super::dispatcher::{AisStreamRequest, RequestDispatcher};
use crate::core::AisStreamError;

pub const AIS_STREAM_PATH: &str = "/api/maritime/ais-stream";
pub const SYSTEM_STATUS_PATH: &str = "/api/maritime/status";
pub const HEALTH_PATH: &str = "/health";

impl IntoResponse for AisStreamError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AisStreamError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "message": message }),
            ),
            AisStreamError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                json!({ "message": "Connection not found" }),
            ),
            AisStreamError::InvalidState { id, status } => {
                log::warn!("Rejected resubscribe for {} in state {}", id, status);
                (
                    StatusCode::BAD_REQUEST,
                    json!({ "message": "Connection is not active" }),
                )
            }
            AisStreamError::Transport(error) => {
                log::error!("AIS Stream update error: {}", error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "success": false,
                        "message": "Failed to update subscription",
                        "error": error,
                    }),
                )
            }
            AisStreamError::Internal(error) => {
                log::error!("AIS Stream API error: {}", error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "success": false,
                        "message": "AIS Stream operation failed",
                        "error": error,
                    }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Builds the router. The caller adds CORS and other layers.
pub fn router(dispatcher: Arc<RequestDispatcher>) -> Router {
    Router::new()
        .route(
            AIS_STREAM_PATH,
            post(handle_ais_stream).fallback(method_not_allowed),
        )
        .route(
            SYSTEM_STATUS_PATH,
            get(handle_system_status).fallback(method_not_allowed),
        )
        .route(HEALTH_PATH, get(|| async { "OK" }))
        .with_state(dispatcher)
}

/// Parses the body by hand so a malformed one is a 400 with our JSON shape
/// instead of the extractor's plain-text rejection.
async fn handle_ais_stream(
    State(dispatcher): State<Arc<RequestDispatcher>>,
    body: Bytes,
) -> Result<Response, AisStreamError> {
    let request: AisStreamRequest = serde_json::from_slice(&body)
        .map_err(|e| AisStreamError::Validation(format!("Invalid request body: {}", e)))?;

    log::debug!(
        "AIS Stream request: action={:?} connection={:?}",
        request.action,
        request.connection_id
    );
    let reply = dispatcher.dispatch(request).await?;
    Ok(Json(reply).into_response())
}

async fn handle_system_status(State(dispatcher): State<Arc<RequestDispatcher>>) -> Response {
    let data = dispatcher.system_status().await;
    Json(json!({
        "success": true,
        "data": data,
        "message": "System status retrieved successfully",
    }))
    .into_response()
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "message": "Method not allowed" })),
    )
        .into_response()
}
