//! Trading service.
//!
//! Thin, mode-guarded wrappers over the vendor trading calls. Reads go to
//! the session's vendor handle (the simulated connector plays that role in
//! `sim` mode); mutations pass the mode guard first and are fabricated
//! locally whenever the guard says simulate, without ever touching the
//! vendor handle.

use crate::callbacks::{CallbackDispatcher, CallbackKind, CallbackRecord};
use crate::executor::BlockingExecutor;
use crate::model::trading::*;
use crate::session::{Session, SessionRegistry};
use crate::symbol;
use crate::map_xt_err;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use xtgate_core::config::{TimeoutConfig, TimeoutFamily};
use xtgate_core::{Gate, GatewayError, GatewayResult, Mode, OpClass};
use xtgate_qmtlink::{StockAccount, XtError, XtTrader, XT_OK};

/// Builds a vendor client handle bound to a session identifier. Wired at
/// startup: the simulated connector in `sim` deployments, the real SDK
/// adapter elsewhere.
pub type TraderFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn XtTrader>, XtError> + Send + Sync>;

pub struct TradingService {
    mode: Mode,
    timeouts: TimeoutConfig,
    executor: BlockingExecutor,
    registry: SessionRegistry,
    dispatcher: Arc<CallbackDispatcher>,
    factory: TraderFactory,
    /// Process-wide async sequence. Lock-guarded so the returned values
    /// form a strictly increasing series.
    async_seq: Mutex<i64>,
    /// Orders submitted through this gateway, keyed by order id. In
    /// simulate modes this is the only order book there is.
    local_orders: Mutex<HashMap<String, OrderResponse>>,
    sim_order_counter: AtomicU64,
}

impl fmt::Debug for TradingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TradingService")
            .field("mode", &self.mode)
            .field("sessions", &self.registry.len())
            .finish()
    }
}

impl TradingService {
    pub fn new(
        mode: Mode,
        timeouts: TimeoutConfig,
        dispatcher: Arc<CallbackDispatcher>,
        factory: TraderFactory,
    ) -> Self {
        Self {
            mode,
            timeouts,
            executor: BlockingExecutor::new(),
            registry: SessionRegistry::new(),
            dispatcher,
            factory,
            async_seq: Mutex::new(0),
            local_orders: Mutex::new(HashMap::new()),
            sim_order_counter: AtomicU64::new(1000),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn trading_deadline(&self) -> std::time::Duration {
        self.timeouts.duration(TimeoutFamily::Trading)
    }

    fn next_seq(&self) -> i64 {
        let mut seq = self.async_seq.lock();
        *seq += 1;
        *seq
    }

    fn sim_reason(mode_refused: bool) -> SimReason {
        if mode_refused {
            SimReason::ModeRefused
        } else {
            SimReason::SimMode
        }
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Connects an account: instantiate the vendor handle, register the
    /// callback dispatcher, start the vendor I/O thread, connect, subscribe
    /// the account and probe it with an asset query. Any failure unwinds
    /// the earlier steps.
    pub async fn connect(&self, request: ConnectRequest) -> GatewayResult<ConnectResponse> {
        if request.account_id.trim().is_empty() {
            return Err(GatewayError::InvalidArgument("account_id must not be empty".into()));
        }
        let session_id =
            format!("session_{}_{}", request.account_id, Utc::now().timestamp());
        let trader = (self.factory)(&session_id).map_err(map_xt_err)?;
        let account = StockAccount::new(&request.account_id);
        let dispatcher: Arc<dyn xtgate_qmtlink::XtTraderCallback> = Arc::clone(&self.dispatcher) as _;

        let worker_trader = Arc::clone(&trader);
        let worker_account = account.clone();
        let asset = self
            .executor
            .run("connect", self.trading_deadline(), move || {
                worker_trader.register_callback(dispatcher);
                worker_trader.start();
                let rc = worker_trader.connect();
                if rc != XT_OK {
                    worker_trader.stop();
                    return Err(GatewayError::UpstreamUnavailable(format!(
                        "vendor connect failed, code {rc}"
                    )));
                }
                let rc = worker_trader.subscribe(&worker_account);
                if rc != XT_OK {
                    worker_trader.stop();
                    return Err(GatewayError::UpstreamUnavailable(format!(
                        "account subscribe failed, code {rc}"
                    )));
                }
                match worker_trader.query_stock_asset(&worker_account) {
                    Ok(asset) => Ok(asset),
                    Err(err) => {
                        worker_trader.stop();
                        Err(map_xt_err(err))
                    }
                }
            })
            .await?;

        let account_info = AccountInfo {
            account_id: request.account_id.clone(),
            account_type: AccountType::Security,
            account_name: format!("Account {}", request.account_id),
            status: "CONNECTED".into(),
            balance: asset.cash,
            available_balance: asset.cash - asset.frozen_cash,
            frozen_balance: asset.frozen_cash,
            market_value: asset.market_value,
            total_asset: asset.total_asset,
        };
        let session = Arc::new(Session {
            session_id: session_id.clone(),
            account_id: request.account_id.clone(),
            trader,
            account,
            connected_at: Utc::now(),
            account_info: Mutex::new(account_info.clone()),
        });
        self.registry.insert(session);
        info!(session_id, account_id = %request.account_id, mode = %self.mode, "account connected");

        Ok(ConnectResponse {
            success: true,
            message: "account connected".into(),
            session_id: Some(session_id),
            account_info: Some(account_info),
        })
    }

    /// Tears a session down. Idempotent: a second call for the same
    /// identifier reports `false` without error.
    pub async fn disconnect(&self, session_id: &str) -> GatewayResult<bool> {
        match self.registry.remove(session_id) {
            Some(session) => {
                self.executor
                    .run("disconnect", self.trading_deadline(), move || {
                        session.trader.stop();
                        Ok(())
                    })
                    .await?;
                info!(session_id, "account disconnected");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn get_account(&self, session_id: &str) -> GatewayResult<AccountInfo> {
        Ok(self.registry.get(session_id)?.account_info.lock().clone())
    }

    pub fn is_connected(&self, session_id: &str) -> bool {
        self.registry.contains(session_id)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_asset(&self, session_id: &str) -> GatewayResult<AssetInfo> {
        let session = self.registry.get(session_id)?;
        let worker = Arc::clone(&session);
        let asset = self
            .executor
            .run("query_stock_asset", self.trading_deadline(), move || {
                worker.trader.query_stock_asset(&worker.account).map_err(map_xt_err)
            })
            .await?;
        let info = AssetInfo::from(&asset);
        {
            let mut snapshot = session.account_info.lock();
            snapshot.balance = asset.cash;
            snapshot.available_balance = info.available_cash;
            snapshot.market_value = asset.market_value;
            snapshot.total_asset = asset.total_asset;
        }
        Ok(info)
    }

    pub async fn get_positions(&self, session_id: &str) -> GatewayResult<Vec<PositionInfo>> {
        let session = self.registry.get(session_id)?;
        let positions = self
            .executor
            .run("query_stock_positions", self.trading_deadline(), move || {
                session.trader.query_stock_positions(&session.account).map_err(map_xt_err)
            })
            .await?;
        Ok(positions
            .iter()
            .filter(|p| p.volume > 0)
            .map(PositionInfo::from)
            .collect())
    }

    pub async fn get_orders(&self, session_id: &str) -> GatewayResult<Vec<OrderResponse>> {
        let session = self.registry.get(session_id)?;
        let mut orders: Vec<OrderResponse> = self
            .executor
            .run("query_stock_orders", self.trading_deadline(), move || {
                session.trader.query_stock_orders(&session.account).map_err(map_xt_err)
            })
            .await?
            .iter()
            .map(OrderResponse::from)
            .collect();
        // In simulate modes fabricated orders never reach the vendor, so
        // the local book is the only place they exist.
        if self.mode.check(OpClass::Mutate) != Gate::Allow {
            orders.extend(self.local_orders.lock().values().cloned());
        }
        Ok(orders)
    }

    pub async fn get_trades(&self, session_id: &str) -> GatewayResult<Vec<TradeInfo>> {
        let session = self.registry.get(session_id)?;
        let trades = self
            .executor
            .run("query_stock_trades", self.trading_deadline(), move || {
                session.trader.query_stock_trades(&session.account).map_err(map_xt_err)
            })
            .await?;
        Ok(trades.iter().map(TradeInfo::from).collect())
    }

    /// Risk ratios derived from the asset snapshot; the remaining fields
    /// are constants until a real risk model lands.
    pub async fn get_risk(&self, session_id: &str) -> GatewayResult<RiskInfo> {
        let asset = self.get_asset(session_id).await?;
        let total = asset.total_asset.max(1.0);
        Ok(RiskInfo {
            position_ratio: asset.market_value / total,
            cash_ratio: asset.cash / total,
            max_drawdown: 0.05,
            var_95: 0.02,
            var_99: 0.03,
        })
    }

    pub fn get_strategies(&self, session_id: &str) -> GatewayResult<Vec<StrategyInfo>> {
        self.registry.get(session_id)?;
        let now = Utc::now();
        Ok(vec![
            StrategyInfo {
                strategy_name: "ma_cross".into(),
                strategy_type: "TREND_FOLLOWING".into(),
                status: "RUNNING".into(),
                created_time: now,
                last_update_time: now,
                parameters: json!({ "period": 20, "threshold": 0.02 }),
            },
            StrategyInfo {
                strategy_name: "mean_reversion".into(),
                strategy_type: "MEAN_REVERSION".into(),
                status: "STOPPED".into(),
                created_time: now,
                last_update_time: now,
                parameters: json!({ "lookback": 10, "entry_threshold": 0.05 }),
            },
        ])
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    fn validate_order(request: &OrderRequest) -> GatewayResult<()> {
        symbol::validate_stock_code(&request.stock_code)?;
        if request.volume <= 0 {
            return Err(GatewayError::InvalidArgument("volume must be positive".into()));
        }
        if let Some(price) = request.price {
            if price <= 0.0 {
                return Err(GatewayError::InvalidArgument("price must be positive".into()));
            }
        } else if request.order_type == OrderType::Limit {
            return Err(GatewayError::InvalidArgument("price required for LIMIT orders".into()));
        }
        Ok(())
    }

    pub async fn submit_order(
        &self,
        session_id: &str,
        request: OrderRequest,
    ) -> GatewayResult<OrderResponse> {
        let session = self.registry.get(session_id)?;
        Self::validate_order(&request)?;
        match self.mode.check(OpClass::Mutate) {
            Gate::Allow => {
                let req = request.clone();
                let order_id = self
                    .executor
                    .run("order_stock", self.trading_deadline(), move || {
                        let id = session.trader.order_stock(
                            &session.account,
                            &req.stock_code,
                            req.side.to_vendor(),
                            req.volume,
                            req.order_type.to_vendor(),
                            req.price.unwrap_or(0.0),
                            req.strategy_name.as_deref().unwrap_or("default"),
                            "",
                        );
                        if id < 0 {
                            Err(GatewayError::Vendor {
                                code: id,
                                message: "order_stock rejected".into(),
                            })
                        } else {
                            Ok(id)
                        }
                    })
                    .await?;
                let response = self.build_order_response(
                    order_id.to_string(),
                    &request,
                    false,
                    None,
                );
                info!(session_id, order_id, stock_code = %request.stock_code, "order submitted");
                Ok(response)
            }
            Gate::Simulate { mode_refused } => {
                warn!(
                    mode = %self.mode,
                    stock_code = %request.stock_code,
                    "order not sent to vendor; returning simulated response"
                );
                let n = self.sim_order_counter.fetch_add(1, Ordering::Relaxed);
                Ok(self.build_order_response(
                    format!("sim_order_{n}"),
                    &request,
                    true,
                    Some(Self::sim_reason(mode_refused)),
                ))
            }
            Gate::Refuse => {
                Err(GatewayError::ModeRefused { op: "submit_order", mode: self.mode.as_str() })
            }
        }
    }

    fn build_order_response(
        &self,
        order_id: String,
        request: &OrderRequest,
        simulated: bool,
        sim_reason: Option<SimReason>,
    ) -> OrderResponse {
        let response = OrderResponse {
            order_id: order_id.clone(),
            stock_code: request.stock_code.clone(),
            side: request.side,
            order_type: request.order_type,
            volume: request.volume,
            price: request.price,
            status: OrderStatus::Submitted,
            submitted_time: Utc::now(),
            filled_volume: 0,
            filled_amount: 0.0,
            average_price: None,
            simulated,
            sim_reason,
        };
        self.local_orders.lock().insert(order_id, response.clone());
        response
    }

    pub async fn cancel_order(
        &self,
        session_id: &str,
        request: CancelOrderRequest,
    ) -> GatewayResult<CancelResponse> {
        let session = self.registry.get(session_id)?;
        match self.mode.check(OpClass::Mutate) {
            Gate::Allow => {
                let order_id: i64 = request.order_id.parse().map_err(|_| {
                    GatewayError::InvalidArgument(format!(
                        "order_id must be numeric: {}",
                        request.order_id
                    ))
                })?;
                let rc = self
                    .executor
                    .run("cancel_order_stock", self.trading_deadline(), move || {
                        Ok(session.trader.cancel_order_stock(&session.account, order_id))
                    })
                    .await?;
                if rc != XT_OK {
                    return Err(GatewayError::Vendor {
                        code: rc.into(),
                        message: "cancel_order_stock rejected".into(),
                    });
                }
                if let Some(order) = self.local_orders.lock().get_mut(&request.order_id) {
                    order.status = OrderStatus::Cancelled;
                }
                info!(session_id, order_id, "order cancelled");
                Ok(CancelResponse {
                    success: true,
                    order_id: request.order_id,
                    simulated: false,
                    sim_reason: None,
                })
            }
            Gate::Simulate { mode_refused } => {
                warn!(mode = %self.mode, order_id = %request.order_id, "cancel simulated");
                if let Some(order) = self.local_orders.lock().get_mut(&request.order_id) {
                    order.status = OrderStatus::Cancelled;
                }
                Ok(CancelResponse {
                    success: true,
                    order_id: request.order_id,
                    simulated: true,
                    sim_reason: Some(Self::sim_reason(mode_refused)),
                })
            }
            Gate::Refuse => {
                Err(GatewayError::ModeRefused { op: "cancel_order", mode: self.mode.as_str() })
            }
        }
    }

    /// Async submit. The sequence is allocated under the process-wide lock
    /// and returned synchronously; success or failure arrives later through
    /// the callback dispatcher carrying the same sequence.
    pub async fn submit_order_async(
        &self,
        session_id: &str,
        request: OrderRequest,
    ) -> GatewayResult<AsyncOrderResponse> {
        let session = self.registry.get(session_id)?;
        Self::validate_order(&request)?;
        let seq = self.next_seq();
        match self.mode.check(OpClass::Mutate) {
            Gate::Allow => {
                let req = request.clone();
                let rc = self
                    .executor
                    .run("order_stock_async", self.trading_deadline(), move || {
                        Ok(session.trader.order_stock_async(
                            &session.account,
                            &req.stock_code,
                            req.side.to_vendor(),
                            req.volume,
                            req.order_type.to_vendor(),
                            req.price.unwrap_or(0.0),
                            req.strategy_name.as_deref().unwrap_or("default"),
                            "",
                            seq,
                        ))
                    })
                    .await?;
                if rc < 0 {
                    return Err(GatewayError::Vendor {
                        code: rc.into(),
                        message: "order_stock_async rejected".into(),
                    });
                }
                info!(session_id, seq, stock_code = %request.stock_code, "async order submitted");
                Ok(self.build_async_order_response(&request, seq, false, None))
            }
            Gate::Simulate { mode_refused } => {
                warn!(mode = %self.mode, seq, "async order simulated");
                // Fabricated acknowledgement keeps the correlation contract:
                // every sequence appears exactly once on the callback stream.
                self.dispatcher.dispatch(CallbackRecord::new(
                    CallbackKind::AsyncOrder,
                    session.account_id.clone(),
                    Some(seq),
                    json!({
                        "account_id": session.account_id,
                        "stock_code": request.stock_code,
                        "side": request.side,
                        "volume": request.volume,
                        "price": request.price,
                        "seq": seq,
                        "simulated": true,
                    }),
                ));
                Ok(self.build_async_order_response(
                    &request,
                    seq,
                    true,
                    Some(Self::sim_reason(mode_refused)),
                ))
            }
            Gate::Refuse => Err(GatewayError::ModeRefused {
                op: "submit_order_async",
                mode: self.mode.as_str(),
            }),
        }
    }

    fn build_async_order_response(
        &self,
        request: &OrderRequest,
        seq: i64,
        simulated: bool,
        sim_reason: Option<SimReason>,
    ) -> AsyncOrderResponse {
        AsyncOrderResponse {
            success: true,
            message: if simulated {
                "async order accepted (simulated)".into()
            } else {
                "async order accepted".into()
            },
            seq,
            stock_code: request.stock_code.clone(),
            side: request.side,
            volume: request.volume,
            price: request.price,
            simulated,
            sim_reason,
        }
    }

    pub async fn cancel_order_async(
        &self,
        session_id: &str,
        request: AsyncCancelRequest,
    ) -> GatewayResult<AsyncCancelResponse> {
        let session = self.registry.get(session_id)?;
        if request.order_id.is_none() && request.order_sysid.is_none() {
            return Err(GatewayError::InvalidArgument(
                "either order_id or order_sysid is required".into(),
            ));
        }
        let seq = self.next_seq();
        match self.mode.check(OpClass::Mutate) {
            Gate::Allow => {
                let order_id = request.order_id.clone();
                let order_sysid = request.order_sysid.clone();
                let parsed_order_id = match &order_id {
                    Some(id) if order_sysid.is_none() => Some(id.parse::<i64>().map_err(|_| {
                        GatewayError::InvalidArgument(format!("order_id must be numeric: {id}"))
                    })?),
                    _ => None,
                };
                let rc = self
                    .executor
                    .run("cancel_order_stock_async", self.trading_deadline(), move || {
                        let rc = match (&order_sysid, parsed_order_id) {
                            (Some(sysid), _) => session.trader.cancel_order_stock_sysid_async(
                                &session.account,
                                sysid,
                                seq,
                            ),
                            (None, Some(id)) => session.trader.cancel_order_stock_async(
                                &session.account,
                                id,
                                seq,
                            ),
                            (None, None) => unreachable!("validated above"),
                        };
                        Ok(rc)
                    })
                    .await?;
                if rc < 0 {
                    return Err(GatewayError::Vendor {
                        code: rc.into(),
                        message: "cancel_order_stock_async rejected".into(),
                    });
                }
                info!(session_id, seq, "async cancel submitted");
                Ok(AsyncCancelResponse {
                    success: true,
                    message: "async cancel accepted".into(),
                    seq,
                    order_id: request.order_id,
                    simulated: false,
                    sim_reason: None,
                })
            }
            Gate::Simulate { mode_refused } => {
                warn!(mode = %self.mode, seq, "async cancel simulated");
                if let Some(id) = &request.order_id {
                    if let Some(order) = self.local_orders.lock().get_mut(id) {
                        order.status = OrderStatus::Cancelled;
                    }
                }
                self.dispatcher.dispatch(CallbackRecord::new(
                    CallbackKind::AsyncCancel,
                    session.account_id.clone(),
                    Some(seq),
                    json!({
                        "account_id": session.account_id,
                        "order_id": request.order_id,
                        "seq": seq,
                        "simulated": true,
                    }),
                ));
                Ok(AsyncCancelResponse {
                    success: true,
                    message: "async cancel accepted (simulated)".into(),
                    seq,
                    order_id: request.order_id,
                    simulated: true,
                    sim_reason: Some(Self::sim_reason(mode_refused)),
                })
            }
            Gate::Refuse => Err(GatewayError::ModeRefused {
                op: "cancel_order_async",
                mode: self.mode.as_str(),
            }),
        }
    }

    /// Stops every session, for shutdown.
    pub async fn shutdown(&self) {
        for session in self.registry.drain() {
            let _ = self
                .executor
                .run("disconnect", self.trading_deadline(), move || {
                    session.trader.stop();
                    Ok(())
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use xtgate_qmtlink::SimTrader;

    struct Harness {
        service: TradingService,
        dispatcher: Arc<CallbackDispatcher>,
        traders: Arc<Mutex<Vec<Arc<SimTrader>>>>,
    }

    fn harness(mode: Mode, setup: fn(&SimTrader)) -> Harness {
        let dispatcher = Arc::new(CallbackDispatcher::new(128, 100));
        let traders: Arc<Mutex<Vec<Arc<SimTrader>>>> = Arc::new(Mutex::new(Vec::new()));
        let created = Arc::clone(&traders);
        let factory: TraderFactory = Arc::new(move |session_id: &str| {
            let trader = Arc::new(SimTrader::new(session_id));
            setup(&trader);
            created.lock().push(Arc::clone(&trader));
            Ok(trader as Arc<dyn XtTrader>)
        });
        let service = TradingService::new(
            mode,
            TimeoutConfig::default(),
            Arc::clone(&dispatcher),
            factory,
        );
        Harness { service, dispatcher, traders }
    }

    async fn connect(h: &Harness) -> String {
        let resp = h
            .service
            .connect(ConnectRequest {
                account_id: "8886006288".into(),
                password: None,
                client_id: None,
            })
            .await
            .unwrap();
        assert!(resp.success);
        resp.session_id.unwrap()
    }

    fn order_request() -> OrderRequest {
        OrderRequest {
            stock_code: "000001.SZ".into(),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            volume: 100,
            price: Some(13.5),
            strategy_name: None,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn connect_disconnect_round_trip_is_idempotent() {
        let h = harness(Mode::Sim, |_| {});
        assert_eq!(h.service.registry().len(), 0);
        let session_id = connect(&h).await;
        assert_eq!(h.service.registry().len(), 1);
        assert!(h.service.is_connected(&session_id));

        assert!(h.service.disconnect(&session_id).await.unwrap());
        assert_eq!(h.service.registry().len(), 0);
        // Second disconnect: success=false, no error.
        assert!(!h.service.disconnect(&session_id).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_connect_leaves_no_session() {
        let h = harness(Mode::LiveRo, |trader| trader.set_connect_result(-151));
        let err = h
            .service
            .connect(ConnectRequest {
                account_id: "8886006288".into(),
                password: None,
                client_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamUnavailable(_)));
        assert_eq!(h.service.registry().len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_account_subscribe_unwinds() {
        let h = harness(Mode::LiveRo, |trader| trader.set_subscribe_result(-2));
        let err = h
            .service
            .connect(ConnectRequest {
                account_id: "8886006288".into(),
                password: None,
                client_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UpstreamUnavailable(_)));
        assert_eq!(h.service.registry().len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unknown_session_is_session_not_found() {
        let h = harness(Mode::Sim, |_| {});
        let err = h.service.get_asset("session_missing").await.unwrap_err();
        assert!(matches!(err, GatewayError::SessionNotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn live_ro_order_is_simulated_and_vendor_untouched() {
        let h = harness(Mode::LiveRo, |_| {});
        let session_id = connect(&h).await;
        let resp = h.service.submit_order(&session_id, order_request()).await.unwrap();
        assert!(resp.simulated);
        assert_eq!(resp.sim_reason, Some(SimReason::ModeRefused));
        assert_eq!(resp.status, OrderStatus::Submitted);
        assert!(resp.order_id.starts_with("sim_order_"));
        // The vendor handle never saw the order.
        assert_eq!(h.traders.lock()[0].order_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn live_rw_order_reaches_vendor() {
        let h = harness(Mode::LiveRw, |_| {});
        let session_id = connect(&h).await;
        let resp = h.service.submit_order(&session_id, order_request()).await.unwrap();
        assert!(!resp.simulated);
        assert_eq!(h.traders.lock()[0].order_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn simulated_cancel_transitions_local_order() {
        let h = harness(Mode::LiveRo, |_| {});
        let session_id = connect(&h).await;
        let order = h.service.submit_order(&session_id, order_request()).await.unwrap();
        let cancel = h
            .service
            .cancel_order(&session_id, CancelOrderRequest { order_id: order.order_id.clone() })
            .await
            .unwrap();
        assert!(cancel.success && cancel.simulated);
        let orders = h.service.get_orders(&session_id).await.unwrap();
        let tracked = orders.iter().find(|o| o.order_id == order.order_id).unwrap();
        assert_eq!(tracked.status, OrderStatus::Cancelled);
        assert_eq!(h.traders.lock()[0].cancel_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn invalid_symbol_rejected_before_vendor() {
        let h = harness(Mode::LiveRw, |_| {});
        let session_id = connect(&h).await;
        let mut request = order_request();
        request.stock_code = "PETR4".into();
        let err = h.service.submit_order(&session_id, request).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
        assert_eq!(h.traders.lock()[0].order_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn async_sequences_are_strictly_increasing_across_ops() {
        let h = harness(Mode::Sim, |_| {});
        let session_id = connect(&h).await;
        let mut seqs = Vec::new();
        for _ in 0..3 {
            seqs.push(
                h.service
                    .submit_order_async(&session_id, order_request())
                    .await
                    .unwrap()
                    .seq,
            );
        }
        seqs.push(
            h.service
                .cancel_order_async(
                    &session_id,
                    AsyncCancelRequest { order_id: Some("sim_order_1000".into()), order_sysid: None },
                )
                .await
                .unwrap()
                .seq,
        );
        assert!(seqs.windows(2).all(|w| w[0] < w[1]), "seqs: {seqs:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn async_ack_carries_the_returned_sequence() {
        let h = harness(Mode::LiveRw, |trader| {
            trader.set_async_ack_delay(Duration::from_millis(20))
        });
        let session_id = connect(&h).await;
        // Stream subscribed before the call, as a client would.
        let mut sub = h.dispatcher.subscribe(Some("8886006288".into()));
        let resp = h.service.submit_order_async(&session_id, order_request()).await.unwrap();
        assert!(!resp.simulated);

        let ack = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let record = sub.receiver.recv().await.unwrap();
                if record.callback_type == CallbackKind::AsyncOrder {
                    return record;
                }
            }
        })
        .await
        .expect("async ack not delivered");
        assert_eq!(ack.seq, Some(resp.seq));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn simulated_async_order_still_acks_on_the_stream() {
        let h = harness(Mode::LiveRo, |_| {});
        let session_id = connect(&h).await;
        let mut sub = h.dispatcher.subscribe(None);
        let resp = h.service.submit_order_async(&session_id, order_request()).await.unwrap();
        assert!(resp.simulated);
        let ack = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let record = sub.receiver.recv().await.unwrap();
                if record.callback_type == CallbackKind::AsyncOrder {
                    return record;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(ack.seq, Some(resp.seq));
        assert_eq!(h.traders.lock()[0].order_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn risk_ratios_derive_from_asset() {
        let h = harness(Mode::Sim, |_| {});
        let session_id = connect(&h).await;
        let risk = h.service.get_risk(&session_id).await.unwrap();
        // Sim fixture: 800k market value, 950k cash, 1.8m total.
        assert!((risk.position_ratio - 800_000.0 / 1_800_000.0).abs() < 1e-9);
        assert!((risk.cash_ratio - 950_000.0 / 1_800_000.0).abs() < 1e-9);
        assert_eq!(risk.max_drawdown, 0.05);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn async_cancel_requires_an_identifier() {
        let h = harness(Mode::LiveRw, |_| {});
        let session_id = connect(&h).await;
        let err = h
            .service
            .cancel_order_async(
                &session_id,
                AsyncCancelRequest { order_id: None, order_sysid: None },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
    }
}
