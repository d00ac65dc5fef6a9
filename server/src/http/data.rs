//! Data endpoints: thin adapters from request DTOs to the data service and
//! the subscription manager.

use super::{ApiResponse, ApiResult};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use xtgate_core::GatewayError;
use xtgate_qmtlink::QuoteTick;
use xtgate_service::model::data::*;
use xtgate_service::subscription::{SubscriptionInfo, SubscriptionRequest, SubscriptionStatus};

async fn market(
    State(state): State<AppState>,
    Json(request): Json<MarketDataRequest>,
) -> ApiResult<Json<Vec<MarketDataResponse>>> {
    Ok(Json(state.data.get_market_data(request).await?))
}

async fn financial(
    State(state): State<AppState>,
    Json(request): Json<FinancialDataRequest>,
) -> ApiResult<Json<Vec<FinancialDataResponse>>> {
    Ok(Json(state.data.get_financial_data(request).await?))
}

async fn sectors(State(state): State<AppState>) -> ApiResult<Json<Vec<SectorResponse>>> {
    Ok(Json(state.data.get_sector_list().await?))
}

async fn sector_stocks(
    State(state): State<AppState>,
    Json(request): Json<SectorRequest>,
) -> ApiResult<Json<ApiResponse<SectorResponse>>> {
    let sector = state.data.get_sector_stocks(request).await?;
    Ok(ApiResponse::ok(sector, "sector stocks"))
}

async fn sector_create(
    State(state): State<AppState>,
    Json(request): Json<CreateSectorRequest>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    state.data.create_sector(request).await?;
    Ok(ApiResponse::ok(json!({ "success": true }), "sector created"))
}

async fn sector_add_stocks(
    State(state): State<AppState>,
    Json(request): Json<SectorStocksRequest>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    state.data.add_sector_stocks(request).await?;
    Ok(ApiResponse::ok(json!({ "success": true }), "stocks added to sector"))
}

async fn sector_remove_stocks(
    State(state): State<AppState>,
    Json(request): Json<SectorStocksRequest>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    state.data.remove_sector_stocks(request).await?;
    Ok(ApiResponse::ok(json!({ "success": true }), "stocks removed from sector"))
}

async fn sector_remove(
    State(state): State<AppState>,
    Json(request): Json<SectorRequest>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    state.data.remove_sector(request).await?;
    Ok(ApiResponse::ok(json!({ "success": true }), "sector removed"))
}

async fn sector_reset(
    State(state): State<AppState>,
    Json(request): Json<SectorStocksRequest>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    state.data.reset_sector(request).await?;
    Ok(ApiResponse::ok(json!({ "success": true }), "sector reset"))
}

async fn index_weight(
    State(state): State<AppState>,
    Json(request): Json<IndexWeightRequest>,
) -> ApiResult<Json<IndexWeightResponse>> {
    Ok(Json(state.data.get_index_weight(request).await?))
}

async fn trading_calendar(
    State(state): State<AppState>,
    Path(year): Path<i32>,
) -> ApiResult<Json<TradingCalendarResponse>> {
    Ok(Json(state.data.get_trading_calendar(year).await?))
}

async fn instrument(
    State(state): State<AppState>,
    Path(stock_code): Path<String>,
) -> ApiResult<Json<InstrumentInfo>> {
    Ok(Json(state.data.get_instrument_info(&stock_code).await?))
}

async fn instrument_type(
    State(state): State<AppState>,
    Path(stock_code): Path<String>,
) -> ApiResult<Json<InstrumentTypeInfo>> {
    Ok(Json(state.data.get_instrument_type(&stock_code).await?))
}

async fn holidays(State(state): State<AppState>) -> ApiResult<Json<HolidayInfo>> {
    Ok(Json(state.data.get_holidays().await?))
}

async fn divid_factors(
    State(state): State<AppState>,
    Json(request): Json<DividFactorsRequest>,
) -> ApiResult<Json<Vec<Row>>> {
    Ok(Json(state.data.get_divid_factors(request).await?))
}

async fn tick(
    State(state): State<AppState>,
    Json(request): Json<TickDataRequest>,
) -> ApiResult<Json<Vec<MarketDataResponse>>> {
    Ok(Json(state.data.get_tick_data(request).await?))
}

async fn full_tick(
    State(state): State<AppState>,
    Json(request): Json<CodesRequest>,
) -> ApiResult<Json<HashMap<String, QuoteTick>>> {
    Ok(Json(state.data.get_full_tick(request).await?))
}

async fn full_kline(
    State(state): State<AppState>,
    Json(request): Json<FullKlineRequest>,
) -> ApiResult<Json<Vec<MarketDataResponse>>> {
    Ok(Json(state.data.get_full_kline(request).await?))
}

async fn l2_quote(
    State(state): State<AppState>,
    Json(request): Json<CodesRequest>,
) -> ApiResult<Json<HashMap<String, Vec<Row>>>> {
    Ok(Json(state.data.get_l2_quote(request).await?))
}

async fn l2_order(
    State(state): State<AppState>,
    Json(request): Json<CodesRequest>,
) -> ApiResult<Json<HashMap<String, Vec<Row>>>> {
    Ok(Json(state.data.get_l2_order(request).await?))
}

async fn l2_transaction(
    State(state): State<AppState>,
    Json(request): Json<CodesRequest>,
) -> ApiResult<Json<HashMap<String, Vec<Row>>>> {
    Ok(Json(state.data.get_l2_transaction(request).await?))
}

async fn periods(State(state): State<AppState>) -> Json<PeriodListResponse> {
    Json(state.data.get_period_list())
}

async fn data_dir(State(state): State<AppState>) -> Json<DataDirResponse> {
    Json(state.data.get_data_dir())
}

async fn download_history(
    State(state): State<AppState>,
    Json(request): Json<DownloadHistoryRequest>,
) -> ApiResult<Json<DownloadResponse>> {
    Ok(Json(state.data.download_history(request).await?))
}

async fn download_history_batch(
    State(state): State<AppState>,
    Json(request): Json<DownloadHistoryBatchRequest>,
) -> ApiResult<Json<DownloadResponse>> {
    Ok(Json(state.data.download_history_batch(request).await?))
}

async fn download_financial(
    State(state): State<AppState>,
    Json(request): Json<DownloadFinancialRequest>,
) -> ApiResult<Json<DownloadResponse>> {
    Ok(Json(state.data.download_financial(request).await?))
}

async fn download_sector(State(state): State<AppState>) -> ApiResult<Json<DownloadResponse>> {
    Ok(Json(state.data.download_sector().await?))
}

async fn download_index_weight(
    State(state): State<AppState>,
    Json(request): Json<DownloadIndexWeightRequest>,
) -> ApiResult<Json<DownloadResponse>> {
    Ok(Json(state.data.download_index_weight(request).await?))
}

async fn download_holiday(State(state): State<AppState>) -> ApiResult<Json<DownloadResponse>> {
    Ok(Json(state.data.download_holiday().await?))
}

async fn subscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscriptionRequest>,
) -> ApiResult<Json<SubscriptionInfo>> {
    Ok(Json(state.subscriptions.subscribe(request).await?))
}

async fn unsubscribe(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let removed = state.subscriptions.unsubscribe(&subscription_id).await?;
    let message = if removed { "subscription removed" } else { "subscription not found" };
    Ok(ApiResponse::ok(json!({ "success": removed }), message))
}

async fn subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
) -> ApiResult<Json<SubscriptionStatus>> {
    state
        .subscriptions
        .get(&subscription_id)
        .map(Json)
        .ok_or_else(|| {
            GatewayError::InvalidArgument(format!("subscription not found: {subscription_id}"))
                .into()
        })
}

async fn subscriptions(State(state): State<AppState>) -> Json<Vec<SubscriptionStatus>> {
    Json(state.subscriptions.list())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/market", post(market))
        .route("/financial", post(financial))
        .route("/sectors", get(sectors))
        .route("/sector", post(sector_stocks))
        .route("/sector/create", post(sector_create))
        .route("/sector/add-stocks", post(sector_add_stocks))
        .route("/sector/remove-stocks", post(sector_remove_stocks))
        .route("/sector/remove", post(sector_remove))
        .route("/sector/reset", post(sector_reset))
        .route("/index-weight", post(index_weight))
        .route("/trading-calendar/{year}", get(trading_calendar))
        .route("/instrument/{stock_code}", get(instrument))
        .route("/instrument-type/{stock_code}", get(instrument_type))
        .route("/holidays", get(holidays))
        .route("/divid-factors", post(divid_factors))
        .route("/tick", post(tick))
        .route("/full-tick", post(full_tick))
        .route("/full-kline", post(full_kline))
        .route("/l2/quote", post(l2_quote))
        .route("/l2/order", post(l2_order))
        .route("/l2/transaction", post(l2_transaction))
        .route("/periods", get(periods))
        .route("/data-dir", get(data_dir))
        .route("/download/history", post(download_history))
        .route("/download/history-batch", post(download_history_batch))
        .route("/download/financial", post(download_financial))
        .route("/download/sector", post(download_sector))
        .route("/download/index-weight", post(download_index_weight))
        .route("/download/holiday", post(download_holiday))
        .route("/subscription", post(subscribe))
        .route("/subscription/{subscription_id}", delete(unsubscribe).get(subscription))
        .route("/subscriptions", get(subscriptions))
}
