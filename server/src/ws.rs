//! Streaming push channels.
//!
//! Two WebSocket adapters bridge the in-process queues to clients: the
//! quote stream pulls from a subscription's per-client ring, the trading
//! stream from a callback-dispatcher subscription. Both speak the same
//! small envelope protocol, synthesise heartbeats when the producer is
//! idle, answer client pings with pongs, and evict clients that stay
//! silent past the heartbeat timeout. On any exit path the adapter
//! detaches from its producer; the producer is unaffected.

use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};
use xtgate_service::subscription::StreamEvent;

type WsSink = SplitSink<WebSocket, Message>;

async fn send_json(sink: &mut WsSink, value: &Value) -> bool {
    sink.send(Message::Text(value.to_string().into())).await.is_ok()
}

/// What a client frame means for the read loop.
enum ClientFrame {
    Ping,
    Other,
    Gone,
}

fn classify(frame: Option<Result<Message, axum::Error>>) -> ClientFrame {
    match frame {
        Some(Ok(Message::Text(text))) => {
            let is_ping = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(|t| t == "ping"))
                .unwrap_or(false);
            if is_ping {
                ClientFrame::Ping
            } else {
                ClientFrame::Other
            }
        }
        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => ClientFrame::Gone,
        Some(Ok(_)) => ClientFrame::Other,
    }
}

// ---------------------------------------------------------------------------
// Quote stream
// ---------------------------------------------------------------------------

async fn quote_upgrade(
    State(state): State<AppState>,
    Path(subscription_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| quote_stream(state, subscription_id, socket))
}

async fn quote_stream(state: AppState, subscription_id: String, socket: WebSocket) {
    let (mut sink, mut client) = socket.split();
    let mut stream = match state.subscriptions.attach(&subscription_id) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = send_json(&mut sink, &json!({ "type": "error", "message": err.to_string() }))
                .await;
            return;
        }
    };
    info!(subscription_id, "quote stream attached");
    let _ = send_json(
        &mut sink,
        &json!({
            "type": "connected",
            "subscription_id": subscription_id,
            "timestamp": Utc::now(),
        }),
    )
    .await;

    let period = state.settings.subscription.heartbeat_interval();
    let timeout = state.settings.subscription.heartbeat_timeout();
    let mut heartbeat = interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_tick = Instant::now();
    let mut last_client = Instant::now();

    loop {
        tokio::select! {
            event = stream.next() => match event {
                StreamEvent::Tick(tick) => {
                    last_tick = Instant::now();
                    let envelope = json!({
                        "type": "quote",
                        "data": &*tick,
                        "timestamp": Utc::now(),
                    });
                    if !send_json(&mut sink, &envelope).await {
                        break;
                    }
                }
                // The ring already counted the drop; keep following live.
                StreamEvent::Lagged(_) => continue,
                StreamEvent::Closed => {
                    let _ = send_json(
                        &mut sink,
                        &json!({ "type": "error", "message": "subscription closed" }),
                    )
                    .await;
                    break;
                }
            },
            frame = client.next() => match classify(frame) {
                ClientFrame::Ping => {
                    last_client = Instant::now();
                    if !send_json(&mut sink, &json!({ "type": "pong", "timestamp": Utc::now() }))
                        .await
                    {
                        break;
                    }
                }
                ClientFrame::Other => last_client = Instant::now(),
                ClientFrame::Gone => break,
            },
            _ = heartbeat.tick() => {
                if last_client.elapsed() > timeout {
                    debug!(subscription_id = %stream.subscription_id, "client heartbeat timeout; evicting");
                    break;
                }
                if last_tick.elapsed() >= period {
                    let envelope = json!({ "type": "heartbeat", "timestamp": Utc::now() });
                    if !send_json(&mut sink, &envelope).await {
                        break;
                    }
                }
            }
        }
    }
    // Dropping `stream` detaches from the subscription.
    info!(subscription_id = %stream.subscription_id, "quote stream detached");
}

// ---------------------------------------------------------------------------
// Trading-event stream
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TradingStreamQuery {
    #[serde(default)]
    account_id: Option<String>,
}

async fn trading_upgrade(
    State(state): State<AppState>,
    Query(query): Query<TradingStreamQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| trading_stream(state, query.account_id, socket))
}

async fn trading_stream(state: AppState, account_id: Option<String>, socket: WebSocket) {
    let (mut sink, mut client) = socket.split();
    let mut subscription = state.callbacks.subscribe(account_id.clone());
    info!(account_id = account_id.as_deref().unwrap_or("all"), "trading stream attached");

    let _ = send_json(
        &mut sink,
        &json!({
            "type": "connected",
            "account_id": account_id,
            "timestamp": Utc::now(),
        }),
    )
    .await;
    let _ = send_json(
        &mut sink,
        &json!({
            "type": "history",
            "count": subscription.replay.len(),
            "data": subscription.replay,
            "timestamp": Utc::now(),
        }),
    )
    .await;

    let period = state.settings.subscription.heartbeat_interval();
    let timeout = state.settings.subscription.heartbeat_timeout();
    let mut heartbeat = interval_at(Instant::now() + period, period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_callback = Instant::now();
    let mut last_client = Instant::now();

    loop {
        tokio::select! {
            received = subscription.receiver.recv() => match received {
                Ok(record) => {
                    last_callback = Instant::now();
                    let envelope = json!({
                        "type": "callback",
                        "data": record,
                        "timestamp": Utc::now(),
                    });
                    if !send_json(&mut sink, &envelope).await {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "trading stream lagged; continuing from oldest retained");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    let _ = send_json(
                        &mut sink,
                        &json!({ "type": "error", "message": "dispatcher shut down" }),
                    )
                    .await;
                    break;
                }
            },
            frame = client.next() => match classify(frame) {
                ClientFrame::Ping => {
                    last_client = Instant::now();
                    if !send_json(&mut sink, &json!({ "type": "pong", "timestamp": Utc::now() }))
                        .await
                    {
                        break;
                    }
                }
                ClientFrame::Other => last_client = Instant::now(),
                ClientFrame::Gone => break,
            },
            _ = heartbeat.tick() => {
                if last_client.elapsed() > timeout {
                    debug!("client heartbeat timeout; evicting trading stream");
                    break;
                }
                if last_callback.elapsed() >= period {
                    let envelope = json!({
                        "type": "callback",
                        "data": { "callback_type": "heartbeat", "timestamp": Utc::now() },
                        "timestamp": Utc::now(),
                    });
                    if !send_json(&mut sink, &envelope).await {
                        break;
                    }
                }
            }
        }
    }
    info!("trading stream detached");
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ws/quote/{subscription_id}", get(quote_upgrade))
        .route("/ws/trading", get(trading_upgrade))
}
