//! HTTP surface.
//!
//! Typed endpoints return the bare DTO; ad-hoc endpoints wrap their result
//! in the `{success, code, message, data}` envelope. Errors are translated
//! exactly once, in [`ApiError`], from the gateway taxonomy to HTTP
//! statuses. Bearer-key authentication guards `/api/v1`; an empty
//! allow-list disables it.

mod data;
mod health;
mod trading;

use crate::state::AppState;
use crate::ws;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use derive_more::From;
use serde::Serialize;
use serde_json::json;
use xtgate_core::GatewayError;

/// Envelope for the ad-hoc endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self { success: true, code: 200, message: message.into(), data: Some(data) })
    }
}

/// Transport-boundary error wrapper; the single place gateway errors
/// become HTTP responses.
#[derive(Debug, From)]
pub struct ApiError(pub GatewayError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "success": false,
            "code": status.as_u16(),
            "message": self.0.to_string(),
            "data": null,
        }));
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    if !state.settings.auth_enabled() {
        return Ok(next.run(request).await);
    }
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| state.settings.security.api_keys.iter().any(|key| key == token))
        .unwrap_or(false);
    if authorized {
        Ok(next.run(request).await)
    } else {
        Err(ApiError(GatewayError::Unauthenticated))
    }
}

async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "code": 200,
        "message": "xtgate gateway",
        "data": {
            "name": state.settings.app.name,
            "mode": state.mode.as_str(),
            "docs_url": "/api/v1",
        },
    }))
}

async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "code": 200,
        "message": "application info",
        "data": {
            "name": state.settings.app.name,
            "host": state.settings.app.host,
            "port": state.settings.app.port,
            "mode": state.mode.as_str(),
            "log_level": state.settings.logging.level,
            "rpc_enabled": state.settings.rpc.enabled,
            "whole_quote_enabled": state.settings.subscription.whole_quote_enabled,
        },
    }))
}

/// Builds the full HTTP application.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/data", data::routes())
        .nest("/trading", trading::routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));
    Router::new()
        .nest("/api/v1", api)
        .merge(health::routes())
        .merge(ws::routes())
        .route("/", get(root))
        .route("/info", get(info))
        .with_state(state)
}
