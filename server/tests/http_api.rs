//! In-process HTTP surface tests: routing, auth, error mapping, the
//! timeout path and the LIVE_RO simulation contract.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;
use xtgate_core::{Mode, Settings};
use xtgate_qmtlink::{SimData, SimTrader, XtData, XtTrader};
use xtgate_server::{http, AppState};
use xtgate_service::trading::TraderFactory;

fn sim_settings() -> Settings {
    let mut settings = Settings::default();
    // No spontaneous tick generators in tests.
    settings.vendor.sim_tick_interval_ms = 0;
    settings
}

fn app(settings: Settings, mode: Mode) -> Router {
    http::router(AppState::new(Arc::new(settings), mode))
}

/// State wired against a vendor whose every call sleeps.
fn hanging_vendor_app(hang: Duration, market_data_timeout: f64) -> Router {
    let mut settings = sim_settings();
    settings.timeouts.market_data = market_data_timeout;
    settings.timeouts.download = market_data_timeout;
    let data = Arc::new(SimData::new(Duration::ZERO));
    data.set_call_delay(hang);
    let factory: TraderFactory =
        Arc::new(|session_id: &str| Ok(Arc::new(SimTrader::new(session_id)) as Arc<dyn XtTrader>));
    let state = AppState::with_connectors(
        Arc::new(settings),
        Mode::LiveRo,
        data as Arc<dyn XtData>,
        factory,
    );
    http::router(state)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn connect(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(post("/api/v1/trading/connect", json!({ "account_id": "8886006288" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    body["session_id"].as_str().unwrap().to_string()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_live_answers_immediately() {
    let app = app(sim_settings(), Mode::Sim);
    let response = app.oneshot(get("/health/live")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], json!("ok"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_api_key_is_401_with_envelope() {
    let mut settings = sim_settings();
    settings.security.api_keys = vec!["k1".into()];
    let app = app(settings, Mode::Sim);

    let response = app.clone().oneshot(get("/api/v1/data/sectors")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!(401));

    let authed = Request::builder()
        .uri("/api/v1/data/sectors")
        .header(header::AUTHORIZATION, "Bearer k1")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(authed).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_allow_list_disables_auth() {
    let app = app(sim_settings(), Mode::Sim);
    let response = app.oneshot(get("/api/v1/data/sectors")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn live_ro_order_is_simulated_with_diagnostic() {
    let app = app(sim_settings(), Mode::LiveRo);
    let session_id = connect(&app).await;

    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/v1/trading/order/{session_id}"),
            json!({
                "stock_code": "000001.SZ",
                "side": "BUY",
                "order_type": "LIMIT",
                "volume": 100,
                "price": 13.5,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("SUBMITTED"));
    assert_eq!(body["simulated"], json!(true));
    assert_eq!(body["sim_reason"], json!("mode_refused"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_symbol_maps_to_400() {
    let app = app(sim_settings(), Mode::Sim);
    let session_id = connect(&app).await;
    let response = app
        .oneshot(post(
            &format!("/api/v1/trading/order/{session_id}"),
            json!({ "stock_code": "PETR4", "side": "BUY", "volume": 100, "price": 10.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_session_maps_to_400() {
    let app = app(sim_settings(), Mode::Sim);
    let response = app.oneshot(get("/api/v1/trading/asset/session_unknown")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hanging_vendor_times_out_while_health_stays_live() {
    // Vendor sleeps 3 s, budget 200 ms: expect 504 shortly after the
    // budget, and a live health probe during the wait.
    let app = hanging_vendor_app(Duration::from_secs(3), 0.2);

    let market = app.clone().oneshot(post(
        "/api/v1/data/market",
        json!({ "stock_codes": ["000001.SZ"], "period": "1d", "disable_download": true }),
    ));
    let probe = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let started = Instant::now();
        let response = app.clone().oneshot(get("/health/live")).await.unwrap();
        (response.status(), started.elapsed())
    };

    let started = Instant::now();
    let (market_response, (probe_status, probe_latency)) = tokio::join!(market, probe);
    let market_response = market_response.unwrap();
    assert_eq!(market_response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert!(started.elapsed() < Duration::from_secs(2), "timeout was not enforced");
    assert_eq!(probe_status, StatusCode::OK);
    assert!(probe_latency < Duration::from_millis(100), "event domain was blocked");

    let body = body_json(market_response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["code"], json!(504));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn subscription_crud_round_trip() {
    let app = app(sim_settings(), Mode::Sim);

    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/data/subscription",
            json!({ "stock_codes": ["000001.SZ"], "period": "tick" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let subscription_id = created["subscription_id"].as_str().unwrap().to_string();

    let response =
        app.clone().oneshot(get(&format!("/api/v1/data/subscription/{subscription_id}"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["attached_streams"], json!(0));

    let response = app.clone().oneshot(get("/api/v1/data/subscriptions")).await.unwrap();
    let all = body_json(response).await;
    assert_eq!(all.as_array().unwrap().len(), 1);

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/api/v1/data/subscription/{subscription_id}"))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["success"], json!(true));

    let response = app.oneshot(get("/api/v1/data/subscriptions")).await.unwrap();
    let all = body_json(response).await;
    assert_eq!(all.as_array().unwrap().len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn whole_market_subscription_refused_by_default() {
    let app = app(sim_settings(), Mode::Sim);
    let response = app
        .oneshot(post(
            "/api/v1/data/subscription",
            json!({ "kind": "whole_market", "markets": ["SH"], "period": "tick" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnect_is_idempotent_over_http() {
    let app = app(sim_settings(), Mode::Sim);
    let session_id = connect(&app).await;

    let response = app
        .clone()
        .oneshot(post(&format!("/api/v1/trading/disconnect/{session_id}"), json!({})))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["success"], json!(true));

    let response = app
        .oneshot(post(&format!("/api/v1/trading/disconnect/{session_id}"), json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["success"], json!(false));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn market_data_shape() {
    let app = app(sim_settings(), Mode::Sim);
    let response = app
        .oneshot(post(
            "/api/v1/data/market",
            json!({ "stock_codes": ["000001.SZ"], "period": "1d" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let first = &body[0];
    assert_eq!(first["stock_code"], json!("000001.SZ"));
    let row = &first["data"][0];
    assert!(row["time"].is_i64());
    assert!(row["close"].is_f64());
}
