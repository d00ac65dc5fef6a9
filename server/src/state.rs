//! Dependency record handed to every handler at wire-up time.
//!
//! There are no global singletons: the services, the subscription manager
//! and the callback dispatcher are constructed once here and cloned (all
//! `Arc`s) into the HTTP router, the push adapters and the RPC dispatcher.

use std::sync::Arc;
use std::time::Duration;
use xtgate_core::{Mode, Settings};
use xtgate_qmtlink::{SimData, SimTrader, XtData, XtTrader};
use xtgate_service::callbacks::CallbackDispatcher;
use xtgate_service::data::DataService;
use xtgate_service::subscription::SubscriptionManager;
use xtgate_service::trading::{TraderFactory, TradingService};

#[derive(Debug, Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub mode: Mode,
    pub trading: Arc<TradingService>,
    pub data: Arc<DataService>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub callbacks: Arc<CallbackDispatcher>,
}

impl AppState {
    /// Wires the gateway against the simulated connector. Deployments that
    /// link the real SDK substitute their own connector pair through
    /// [`AppState::with_connectors`].
    pub fn new(settings: Arc<Settings>, mode: Mode) -> Self {
        let vendor_data: Arc<dyn XtData> = Arc::new(SimData::new(Duration::from_millis(
            settings.vendor.sim_tick_interval_ms,
        )));
        let factory: TraderFactory =
            Arc::new(|session_id: &str| Ok(Arc::new(SimTrader::new(session_id)) as Arc<dyn XtTrader>));
        Self::with_connectors(settings, mode, vendor_data, factory)
    }

    pub fn with_connectors(
        settings: Arc<Settings>,
        mode: Mode,
        vendor_data: Arc<dyn XtData>,
        trader_factory: TraderFactory,
    ) -> Self {
        let callbacks = Arc::new(CallbackDispatcher::new(
            settings.subscription.max_queue_size,
            settings.subscription.callback_history,
        ));
        let trading = Arc::new(TradingService::new(
            mode,
            settings.timeouts.clone(),
            Arc::clone(&callbacks),
            trader_factory,
        ));
        let data_dir = settings
            .vendor
            .qmt_userdata_path
            .as_ref()
            .map(|path| path.join("datadir").display().to_string());
        let data = Arc::new(DataService::new(
            Arc::clone(&vendor_data),
            settings.timeouts.clone(),
            data_dir,
        ));
        let subscriptions = Arc::new(SubscriptionManager::new(
            vendor_data,
            mode,
            settings.subscription.clone(),
            settings.timeouts.clone(),
        ));
        Self { settings, mode, trading, data, subscriptions, callbacks }
    }

    /// Ordered teardown: stop accepting callbacks, unregister quote
    /// subscriptions at the vendor, then disconnect every session.
    pub async fn shutdown(&self) {
        self.callbacks.close();
        self.subscriptions.shutdown();
        self.trading.shutdown().await;
    }
}
