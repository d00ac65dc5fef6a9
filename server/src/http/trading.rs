//! Trading endpoints: decode DTO, call the service, encode the result.

use super::{ApiResponse, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use xtgate_service::model::trading::*;

async fn connect(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> ApiResult<Json<ConnectResponse>> {
    Ok(Json(state.trading.connect(request).await?))
}

async fn disconnect(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let success = state.trading.disconnect(&session_id).await?;
    let message = if success { "account disconnected" } else { "session was not connected" };
    Ok(ApiResponse::ok(json!({ "success": success }), message))
}

async fn status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let connected = state.trading.is_connected(&session_id);
    Ok(ApiResponse::ok(json!({ "connected": connected }), "connection status"))
}

async fn account(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<AccountInfo>> {
    Ok(Json(state.trading.get_account(&session_id)?))
}

async fn asset(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<AssetInfo>> {
    Ok(Json(state.trading.get_asset(&session_id).await?))
}

async fn positions(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<PositionInfo>>> {
    Ok(Json(state.trading.get_positions(&session_id).await?))
}

async fn orders(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<OrderResponse>>> {
    Ok(Json(state.trading.get_orders(&session_id).await?))
}

async fn trades(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<TradeInfo>>> {
    Ok(Json(state.trading.get_trades(&session_id).await?))
}

async fn risk(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<RiskInfo>> {
    Ok(Json(state.trading.get_risk(&session_id).await?))
}

async fn strategies(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<Vec<StrategyInfo>>> {
    Ok(Json(state.trading.get_strategies(&session_id)?))
}

async fn submit_order(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<OrderRequest>,
) -> ApiResult<Json<OrderResponse>> {
    Ok(Json(state.trading.submit_order(&session_id, request).await?))
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<CancelOrderRequest>,
) -> ApiResult<Json<CancelResponse>> {
    Ok(Json(state.trading.cancel_order(&session_id, request).await?))
}

async fn submit_order_async(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<OrderRequest>,
) -> ApiResult<Json<AsyncOrderResponse>> {
    Ok(Json(state.trading.submit_order_async(&session_id, request).await?))
}

async fn cancel_order_async(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<AsyncCancelRequest>,
) -> ApiResult<Json<AsyncCancelResponse>> {
    Ok(Json(state.trading.cancel_order_async(&session_id, request).await?))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/connect", post(connect))
        .route("/disconnect/{session_id}", post(disconnect))
        .route("/status/{session_id}", get(status))
        .route("/account/{session_id}", get(account))
        .route("/asset/{session_id}", get(asset))
        .route("/positions/{session_id}", get(positions))
        .route("/orders/{session_id}", get(orders))
        .route("/trades/{session_id}", get(trades))
        .route("/risk/{session_id}", get(risk))
        .route("/strategies/{session_id}", get(strategies))
        .route("/order/{session_id}", post(submit_order))
        .route("/cancel/{session_id}", post(cancel_order))
        .route("/order-async/{session_id}", post(submit_order_async))
        .route("/cancel-async/{session_id}", post(cancel_order_async))
}
