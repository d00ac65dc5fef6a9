//! Liveness/readiness probes. Unauthenticated and answered directly on the
//! event domain, so they stay responsive while vendor calls hang.

use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

async fn live() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn ready(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "mode": state.mode.as_str(),
        "sessions": state.trading.registry().len(),
        "subscriptions": state.subscriptions.len(),
    }))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/health/live", get(live)).route("/health/ready", get(ready))
}
