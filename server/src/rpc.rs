//! Framed RPC surface.
//!
//! Length-prefixed frames over TCP carrying JSON request/response bodies;
//! every response carries a `Status { code, message }` with canonical
//! codes. Methods mirror the HTTP operations one for one. The streaming
//! method `trading.stream_callbacks` switches the connection into push
//! mode: a history frame, then one frame per callback, heartbeat frames
//! while the producer is idle.

use crate::state::AppState;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::MissedTickBehavior;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, warn};
use xtgate_core::{GatewayError, GatewayResult};
use xtgate_service::model::trading::{AsyncCancelRequest, CancelOrderRequest, OrderRequest};
use xtgate_service::subscription::SubscriptionRequest;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub auth_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RpcStatus {
    pub code: i32,
    pub message: String,
}

impl RpcStatus {
    fn ok() -> Self {
        Self { code: 0, message: String::new() }
    }
}

impl From<&GatewayError> for RpcStatus {
    fn from(err: &GatewayError) -> Self {
        Self { code: err.rpc_code() as i32, message: err.to_string() }
    }
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub id: u64,
    pub status: RpcStatus,
    pub payload: Value,
}

impl RpcResponse {
    fn ok(id: u64, payload: Value) -> Self {
        Self { id, status: RpcStatus::ok(), payload }
    }

    fn err(id: u64, err: &GatewayError) -> Self {
        Self { id, status: RpcStatus::from(err), payload: Value::Null }
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> GatewayResult<T> {
    serde_json::from_value(params)
        .map_err(|err| GatewayError::InvalidArgument(format!("bad params: {err}")))
}

fn encode<T: Serialize>(value: T) -> GatewayResult<Value> {
    serde_json::to_value(value).map_err(|err| GatewayError::Internal(err.to_string()))
}

#[derive(Debug, Deserialize)]
struct SessionParams {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct SessionOrderParams {
    session_id: String,
    #[serde(flatten)]
    order: OrderRequest,
}

#[derive(Debug, Deserialize)]
struct SessionCancelParams {
    session_id: String,
    #[serde(flatten)]
    cancel: CancelOrderRequest,
}

#[derive(Debug, Deserialize)]
struct SessionAsyncCancelParams {
    session_id: String,
    #[serde(flatten)]
    cancel: AsyncCancelRequest,
}

#[derive(Debug, Deserialize)]
struct YearParams {
    year: i32,
}

#[derive(Debug, Deserialize)]
struct CodeParams {
    stock_code: String,
}

#[derive(Debug, Deserialize)]
struct SubscriptionIdParams {
    subscription_id: String,
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    #[serde(default)]
    account_id: Option<String>,
}

async fn dispatch(state: &AppState, method: &str, params: Value) -> GatewayResult<Value> {
    match method {
        // Trading
        "trading.connect" => encode(state.trading.connect(parse(params)?).await?),
        "trading.disconnect" => {
            let p: SessionParams = parse(params)?;
            let success = state.trading.disconnect(&p.session_id).await?;
            Ok(json!({ "success": success }))
        }
        "trading.status" => {
            let p: SessionParams = parse(params)?;
            Ok(json!({ "connected": state.trading.is_connected(&p.session_id) }))
        }
        "trading.account" => {
            let p: SessionParams = parse(params)?;
            encode(state.trading.get_account(&p.session_id)?)
        }
        "trading.asset" => {
            let p: SessionParams = parse(params)?;
            encode(state.trading.get_asset(&p.session_id).await?)
        }
        "trading.positions" => {
            let p: SessionParams = parse(params)?;
            encode(state.trading.get_positions(&p.session_id).await?)
        }
        "trading.orders" => {
            let p: SessionParams = parse(params)?;
            encode(state.trading.get_orders(&p.session_id).await?)
        }
        "trading.trades" => {
            let p: SessionParams = parse(params)?;
            encode(state.trading.get_trades(&p.session_id).await?)
        }
        "trading.risk" => {
            let p: SessionParams = parse(params)?;
            encode(state.trading.get_risk(&p.session_id).await?)
        }
        "trading.strategies" => {
            let p: SessionParams = parse(params)?;
            encode(state.trading.get_strategies(&p.session_id)?)
        }
        "trading.submit_order" => {
            let p: SessionOrderParams = parse(params)?;
            encode(state.trading.submit_order(&p.session_id, p.order).await?)
        }
        "trading.cancel_order" => {
            let p: SessionCancelParams = parse(params)?;
            encode(state.trading.cancel_order(&p.session_id, p.cancel).await?)
        }
        "trading.submit_order_async" => {
            let p: SessionOrderParams = parse(params)?;
            encode(state.trading.submit_order_async(&p.session_id, p.order).await?)
        }
        "trading.cancel_order_async" => {
            let p: SessionAsyncCancelParams = parse(params)?;
            encode(state.trading.cancel_order_async(&p.session_id, p.cancel).await?)
        }

        // Market / reference data
        "data.market" => encode(state.data.get_market_data(parse(params)?).await?),
        "data.financial" => encode(state.data.get_financial_data(parse(params)?).await?),
        "data.sectors" => encode(state.data.get_sector_list().await?),
        "data.sector" => encode(state.data.get_sector_stocks(parse(params)?).await?),
        "data.sector_create" => encode(state.data.create_sector(parse(params)?).await?),
        "data.sector_add_stocks" => encode(state.data.add_sector_stocks(parse(params)?).await?),
        "data.sector_remove_stocks" => {
            encode(state.data.remove_sector_stocks(parse(params)?).await?)
        }
        "data.sector_remove" => encode(state.data.remove_sector(parse(params)?).await?),
        "data.sector_reset" => encode(state.data.reset_sector(parse(params)?).await?),
        "data.index_weight" => encode(state.data.get_index_weight(parse(params)?).await?),
        "data.trading_calendar" => {
            let p: YearParams = parse(params)?;
            encode(state.data.get_trading_calendar(p.year).await?)
        }
        "data.instrument" => {
            let p: CodeParams = parse(params)?;
            encode(state.data.get_instrument_info(&p.stock_code).await?)
        }
        "data.instrument_type" => {
            let p: CodeParams = parse(params)?;
            encode(state.data.get_instrument_type(&p.stock_code).await?)
        }
        "data.holidays" => encode(state.data.get_holidays().await?),
        "data.divid_factors" => encode(state.data.get_divid_factors(parse(params)?).await?),
        "data.tick" => encode(state.data.get_tick_data(parse(params)?).await?),
        "data.full_tick" => encode(state.data.get_full_tick(parse(params)?).await?),
        "data.full_kline" => encode(state.data.get_full_kline(parse(params)?).await?),
        "data.l2_quote" => encode(state.data.get_l2_quote(parse(params)?).await?),
        "data.l2_order" => encode(state.data.get_l2_order(parse(params)?).await?),
        "data.l2_transaction" => encode(state.data.get_l2_transaction(parse(params)?).await?),
        "data.periods" => encode(state.data.get_period_list()),
        "data.data_dir" => encode(state.data.get_data_dir()),
        "data.download_history" => encode(state.data.download_history(parse(params)?).await?),
        "data.download_history_batch" => {
            encode(state.data.download_history_batch(parse(params)?).await?)
        }
        "data.download_financial" => encode(state.data.download_financial(parse(params)?).await?),
        "data.download_sector" => encode(state.data.download_sector().await?),
        "data.download_index_weight" => {
            encode(state.data.download_index_weight(parse(params)?).await?)
        }
        "data.download_holiday" => encode(state.data.download_holiday().await?),

        // Subscriptions
        "data.subscribe" => {
            let request: SubscriptionRequest = parse(params)?;
            encode(state.subscriptions.subscribe(request).await?)
        }
        "data.unsubscribe" => {
            let p: SubscriptionIdParams = parse(params)?;
            let removed = state.subscriptions.unsubscribe(&p.subscription_id).await?;
            Ok(json!({ "success": removed }))
        }
        "data.subscription" => {
            let p: SubscriptionIdParams = parse(params)?;
            match state.subscriptions.get(&p.subscription_id) {
                Some(status) => encode(status),
                None => Err(GatewayError::InvalidArgument(format!(
                    "subscription not found: {}",
                    p.subscription_id
                ))),
            }
        }
        "data.subscriptions" => encode(state.subscriptions.list()),

        other => {
            Err(GatewayError::InvalidArgument(format!("unknown method: {other}")))
        }
    }
}

fn authorized(state: &AppState, request: &RpcRequest) -> bool {
    if !state.settings.auth_enabled() {
        return true;
    }
    request
        .auth_key
        .as_deref()
        .map(|key| state.settings.security.api_keys.iter().any(|k| k == key))
        .unwrap_or(false)
}

async fn stream_callbacks(
    state: AppState,
    framed: Framed<TcpStream, LengthDelimitedCodec>,
    request: RpcRequest,
) {
    let (mut sink, mut source) = framed.split();
    let send = |value: RpcResponse| serde_json::to_vec(&value).map(Bytes::from);

    let params: StreamParams = match parse(request.params) {
        Ok(params) => params,
        Err(err) => {
            if let Ok(frame) = send(RpcResponse::err(request.id, &err)) {
                let _ = sink.send(frame).await;
            }
            return;
        }
    };
    let mut subscription = state.callbacks.subscribe(params.account_id);
    let history = RpcResponse::ok(
        request.id,
        json!({ "type": "history", "data": subscription.replay }),
    );
    match send(history) {
        Ok(frame) => {
            if sink.send(frame).await.is_err() {
                return;
            }
        }
        Err(_) => return,
    }

    let period = state.settings.subscription.heartbeat_interval();
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_sent = tokio::time::Instant::now();

    loop {
        tokio::select! {
            received = subscription.receiver.recv() => match received {
                Ok(record) => {
                    last_sent = tokio::time::Instant::now();
                    let frame = RpcResponse::ok(
                        request.id,
                        json!({ "type": "callback", "data": record }),
                    );
                    match send(frame) {
                        Ok(bytes) => {
                            if sink.send(bytes).await.is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "rpc callback stream lagged");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            frame = source.next() => match frame {
                // Client frames are ignored in push mode; EOF ends the stream.
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => break,
            },
            _ = heartbeat.tick() => {
                if last_sent.elapsed() >= period {
                    let frame = RpcResponse::ok(
                        request.id,
                        json!({
                            "type": "callback",
                            "data": { "callback_type": "heartbeat", "timestamp": chrono::Utc::now() },
                        }),
                    );
                    match send(frame) {
                        Ok(bytes) => {
                            if sink.send(bytes).await.is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            }
        }
    }
    debug!("rpc callback stream closed");
}

async fn handle_connection(state: AppState, stream: TcpStream, peer: std::net::SocketAddr) {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    debug!(%peer, "rpc connection opened");
    while let Some(frame) = framed.next().await {
        let bytes = match frame {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%peer, error = %err, "rpc framing error");
                break;
            }
        };
        let request: RpcRequest = match serde_json::from_slice(&bytes) {
            Ok(request) => request,
            Err(err) => {
                let error = GatewayError::InvalidArgument(format!("bad request frame: {err}"));
                let response = RpcResponse::err(0, &error);
                match serde_json::to_vec(&response) {
                    Ok(body) => {
                        if framed.send(Bytes::from(body)).await.is_err() {
                            break;
                        }
                        continue;
                    }
                    Err(_) => break,
                }
            }
        };
        if !authorized(&state, &request) {
            let response = RpcResponse::err(request.id, &GatewayError::Unauthenticated);
            match serde_json::to_vec(&response) {
                Ok(body) => {
                    if framed.send(Bytes::from(body)).await.is_err() {
                        break;
                    }
                    continue;
                }
                Err(_) => break,
            }
        }
        if request.method == "trading.stream_callbacks" {
            stream_callbacks(state, framed, request).await;
            return;
        }
        let response = match dispatch(&state, &request.method, request.params.clone()).await {
            Ok(payload) => RpcResponse::ok(request.id, payload),
            Err(err) => RpcResponse::err(request.id, &err),
        };
        match serde_json::to_vec(&response) {
            Ok(body) => {
                if framed.send(Bytes::from(body)).await.is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    debug!(%peer, "rpc connection closed");
}

/// Accept loop; one task per connection.
pub async fn serve(state: AppState, listener: TcpListener) {
    info!(addr = ?listener.local_addr().ok(), "rpc listening");
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handle_connection(state.clone(), stream, peer));
            }
            Err(err) => {
                warn!(error = %err, "rpc accept failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use xtgate_core::{Mode, Settings};

    fn state(mode: Mode) -> AppState {
        let mut settings = Settings::default();
        settings.vendor.sim_tick_interval_ms = 0;
        AppState::new(Arc::new(settings), mode)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unknown_method_is_invalid_argument() {
        let state = state(Mode::Sim);
        let err = dispatch(&state, "trading.noop", Value::Null).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn connect_and_query_through_dispatch() {
        let state = state(Mode::Sim);
        let payload = dispatch(
            &state,
            "trading.connect",
            json!({ "account_id": "8886006288" }),
        )
        .await
        .unwrap();
        assert_eq!(payload["success"], json!(true));
        let session_id = payload["session_id"].as_str().unwrap().to_string();

        let asset = dispatch(&state, "trading.asset", json!({ "session_id": session_id }))
            .await
            .unwrap();
        assert!(asset["total_asset"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn error_maps_to_canonical_code() {
        let state = state(Mode::Sim);
        let err = dispatch(&state, "trading.asset", json!({ "session_id": "nope" }))
            .await
            .unwrap_err();
        let status = RpcStatus::from(&err);
        // session-not-found → FAILED_PRECONDITION
        assert_eq!(status.code, 9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn auth_gate_checks_allow_list() {
        let mut settings = Settings::default();
        settings.security.api_keys = vec!["secret".into()];
        let state = AppState::new(Arc::new(settings), Mode::Sim);
        let ok = RpcRequest {
            id: 1,
            method: "data.sectors".into(),
            params: Value::Null,
            auth_key: Some("secret".into()),
        };
        let bad = RpcRequest {
            id: 2,
            method: "data.sectors".into(),
            params: Value::Null,
            auth_key: Some("wrong".into()),
        };
        let missing =
            RpcRequest { id: 3, method: "data.sectors".into(), params: Value::Null, auth_key: None };
        assert!(authorized(&state, &ok));
        assert!(!authorized(&state, &bad));
        assert!(!authorized(&state, &missing));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn data_market_round_trips_through_dispatch() {
        let state = state(Mode::Sim);
        let payload = dispatch(
            &state,
            "data.market",
            json!({ "stock_codes": ["000001.SZ"], "period": "1d" }),
        )
        .await
        .unwrap();
        let rows = payload[0]["data"].as_array().unwrap();
        assert!(!rows.is_empty());
    }
}
