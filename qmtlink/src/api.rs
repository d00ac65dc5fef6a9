//! Blocking vendor-core interface.
//!
//! Every method on [`XtTrader`] and [`XtData`] may block for as long as the
//! vendor pleases and must only be invoked from a dedicated worker thread,
//! never from the request-serving runtime. Callbacks registered through
//! [`XtTrader::register_callback`] and the tick sinks fire on threads owned
//! by the vendor; receivers must do nothing there beyond packing the event
//! and handing it off.

use crate::error::{XtError, XtResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Account handle passed to every trading call (**StockAccount**).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StockAccount {
    pub account_id: String,
}

impl StockAccount {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self { account_id: account_id.into() }
    }
}

/// Asset snapshot (**query_stock_asset**).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct XtAsset {
    pub account_id: String,
    pub total_asset: f64,
    pub market_value: f64,
    pub cash: f64,
    pub frozen_cash: f64,
    pub profit: f64,
}

/// Position row (**query_stock_positions**).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct XtPosition {
    pub account_id: String,
    pub stock_code: String,
    pub stock_name: String,
    pub volume: i64,
    pub can_use_volume: i64,
    pub frozen_volume: i64,
    pub open_price: f64,
    pub market_value: f64,
    pub profit: f64,
}

/// Order row (**query_stock_orders** / **on_stock_order**).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct XtOrder {
    pub account_id: String,
    pub order_id: i64,
    pub order_sysid: String,
    pub stock_code: String,
    pub stock_name: String,
    /// Buy/sell constant ([`crate::STOCK_BUY`] / [`crate::STOCK_SELL`]).
    pub order_type: i32,
    /// Price-type constant ([`crate::FIX_PRICE`] / [`crate::LATEST_PRICE`]).
    pub price_type: i32,
    pub order_volume: i64,
    pub price: f64,
    /// Raw status byte, 48..=57.
    pub order_status: i32,
    pub status_msg: String,
    pub traded_volume: i64,
    pub traded_amount: f64,
    pub traded_price: f64,
    /// Epoch seconds.
    pub order_time: i64,
}

/// Fill row (**query_stock_trades** / **on_stock_trade**).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct XtTrade {
    pub account_id: String,
    pub traded_id: String,
    pub order_id: i64,
    pub order_sysid: String,
    pub stock_code: String,
    pub stock_name: String,
    pub order_type: i32,
    pub traded_volume: i64,
    pub traded_price: f64,
    pub traded_amount: f64,
    pub commission: f64,
    /// Epoch seconds.
    pub traded_time: i64,
}

/// Rejected submission (**on_order_error**).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct XtOrderError {
    pub account_id: String,
    pub order_id: i64,
    pub error_id: i32,
    pub error_msg: String,
}

/// Rejected cancellation (**on_cancel_error**).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct XtCancelError {
    pub account_id: String,
    pub order_id: i64,
    pub error_id: i32,
    pub error_msg: String,
}

/// Acknowledgement of an async submit/cancel
/// (**on_order_async_response** / **on_cancel_async_response**).
///
/// `seq` echoes the gateway-allocated sequence passed into the async call,
/// which is what lets callers correlate the synchronous response with the
/// eventual callback.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct XtAsyncResponse {
    pub account_id: String,
    pub order_id: i64,
    pub seq: i64,
    pub error_msg: Option<String>,
}

/// Account lifecycle notification (**on_account_status**).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct XtAccountStatus {
    pub account_id: String,
    pub status: i32,
}

/// One market-data tick as delivered to a subscription sink.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct QuoteTick {
    pub stock_code: String,
    /// Epoch milliseconds.
    pub time: i64,
    pub last_price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub pre_close: f64,
    pub volume: i64,
    pub amount: f64,
    pub bid_price: Vec<f64>,
    pub ask_price: Vec<f64>,
    pub bid_vol: Vec<i64>,
    pub ask_vol: Vec<i64>,
}

/// One cell of a tabular vendor payload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum Cell {
    F64(f64),
    I64(i64),
    Bool(bool),
    Str(String),
    Null,
}

/// Field-major matrix of `fields × timestamps` for one symbol, the shape
/// the vendor hands back from its table queries. `values[f][t]` is the
/// value of `fields[f]` at `index[t]`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FieldTable {
    pub fields: Vec<String>,
    /// Row timestamps, epoch milliseconds.
    pub index: Vec<i64>,
    pub values: Vec<Vec<Cell>>,
}

/// Static instrument detail (**get_instrument_detail**).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct XtInstrumentDetail {
    pub stock_code: String,
    pub stock_name: String,
    pub exchange: String,
    pub instrument_type: String,
    pub open_date: String,
    pub total_volume: i64,
    pub float_volume: i64,
    pub price_tick: f64,
    pub is_trading: bool,
}

/// Receiver of the vendor's trading callbacks.
///
/// All methods fire on vendor-owned threads.
pub trait XtTraderCallback: Send + Sync {
    fn on_connected(&self);
    fn on_disconnected(&self);
    fn on_account_status(&self, status: &XtAccountStatus);
    fn on_stock_asset(&self, asset: &XtAsset);
    fn on_stock_order(&self, order: &XtOrder);
    fn on_stock_trade(&self, trade: &XtTrade);
    fn on_stock_position(&self, position: &XtPosition);
    fn on_order_error(&self, error: &XtOrderError);
    fn on_cancel_error(&self, error: &XtCancelError);
    fn on_order_async_response(&self, response: &XtAsyncResponse);
    fn on_cancel_async_response(&self, response: &XtAsyncResponse);
}

/// Sink receiving subscription ticks on a vendor thread.
pub type TickSink = Arc<dyn Fn(QuoteTick) + Send + Sync>;

/// Blocking trading interface of the vendor core (**XtQuantTrader**).
///
/// One instance per gateway session. The handle is not re-entrant: callers
/// serialise access per instance.
pub trait XtTrader: Send + Sync + Debug {
    /// Registers the callback receiver (**register_callback**). Must be
    /// called before [`XtTrader::start`].
    fn register_callback(&self, callback: Arc<dyn XtTraderCallback>);

    /// Starts the vendor's I/O thread (**start**).
    fn start(&self);

    /// Connects to the broker front (**connect**). Blocking.
    fn connect(&self) -> XtResult;

    /// Subscribes the account for callbacks (**subscribe**). Blocking.
    fn subscribe(&self, account: &StockAccount) -> XtResult;

    /// Stops the vendor I/O thread and releases the handle (**stop**).
    /// Idempotent.
    fn stop(&self);

    fn query_stock_asset(&self, account: &StockAccount) -> Result<XtAsset, XtError>;
    fn query_stock_positions(&self, account: &StockAccount) -> Result<Vec<XtPosition>, XtError>;
    fn query_stock_orders(&self, account: &StockAccount) -> Result<Vec<XtOrder>, XtError>;
    fn query_stock_trades(&self, account: &StockAccount) -> Result<Vec<XtTrade>, XtError>;

    /// Submits an order (**order_stock**). Returns the vendor order id,
    /// negative on error.
    #[allow(clippy::too_many_arguments)]
    fn order_stock(
        &self,
        account: &StockAccount,
        stock_code: &str,
        order_type: i32,
        order_volume: i64,
        price_type: i32,
        price: f64,
        strategy_name: &str,
        order_remark: &str,
    ) -> i64;

    /// Cancels an order by id (**cancel_order_stock**).
    fn cancel_order_stock(&self, account: &StockAccount, order_id: i64) -> XtResult;

    /// Async submit (**order_stock_async**). `seq` is echoed in the
    /// eventual [`XtTraderCallback::on_order_async_response`].
    #[allow(clippy::too_many_arguments)]
    fn order_stock_async(
        &self,
        account: &StockAccount,
        stock_code: &str,
        order_type: i32,
        order_volume: i64,
        price_type: i32,
        price: f64,
        strategy_name: &str,
        order_remark: &str,
        seq: i64,
    ) -> XtResult;

    /// Async cancel (**cancel_order_stock_async**). `seq` is echoed in the
    /// eventual [`XtTraderCallback::on_cancel_async_response`].
    fn cancel_order_stock_async(&self, account: &StockAccount, order_id: i64, seq: i64)
        -> XtResult;

    /// Async cancel by counter id (**cancel_order_stock_sysid_async**).
    fn cancel_order_stock_sysid_async(
        &self,
        account: &StockAccount,
        order_sysid: &str,
        seq: i64,
    ) -> XtResult;
}

/// Blocking market/reference-data interface of the vendor core (**xtdata**).
pub trait XtData: Send + Sync + Debug {
    /// Historical candles for a set of symbols (**get_market_data**).
    #[allow(clippy::too_many_arguments)]
    fn get_market_data(
        &self,
        fields: &[String],
        stock_codes: &[String],
        period: &str,
        start_time: &str,
        end_time: &str,
        dividend_type: &str,
        fill_data: bool,
    ) -> Result<HashMap<String, FieldTable>, XtError>;

    /// Downloads candle history into the vendor's local store
    /// (**download_history_data**). Blocking, potentially for minutes.
    fn download_history_data(
        &self,
        stock_code: &str,
        period: &str,
        start_time: &str,
        end_time: &str,
    ) -> Result<(), XtError>;

    /// Financial statement tables per symbol (**get_financial_data**).
    fn get_financial_data(
        &self,
        stock_codes: &[String],
        tables: &[String],
        start_time: &str,
        end_time: &str,
    ) -> Result<HashMap<String, HashMap<String, FieldTable>>, XtError>;

    fn download_financial_data(
        &self,
        stock_codes: &[String],
        tables: &[String],
    ) -> Result<(), XtError>;

    fn get_sector_list(&self) -> Result<Vec<String>, XtError>;
    fn get_stock_list_in_sector(&self, sector_name: &str) -> Result<Vec<String>, XtError>;
    fn create_sector(&self, parent_node: &str, sector_name: &str, overwrite: bool)
        -> Result<(), XtError>;
    fn add_sector(&self, sector_name: &str, stock_codes: &[String]) -> Result<(), XtError>;
    fn remove_stock_from_sector(
        &self,
        sector_name: &str,
        stock_codes: &[String],
    ) -> Result<(), XtError>;
    fn remove_sector(&self, sector_name: &str) -> Result<(), XtError>;
    fn reset_sector(&self, sector_name: &str, stock_codes: &[String]) -> Result<(), XtError>;

    /// Constituent weights of an index (**get_index_weight**).
    fn get_index_weight(&self, index_code: &str) -> Result<HashMap<String, f64>, XtError>;

    /// Trading days of one year, `YYYYMMDD` strings
    /// (**get_trading_calendar**).
    fn get_trading_calendar(&self, market: &str, year: i32) -> Result<Vec<String>, XtError>;

    fn get_instrument_detail(&self, stock_code: &str) -> Result<XtInstrumentDetail, XtError>;
    fn get_instrument_type(&self, stock_code: &str) -> Result<Vec<String>, XtError>;
    fn get_holidays(&self) -> Result<Vec<String>, XtError>;
    fn get_divid_factors(&self, stock_code: &str, start_time: &str, end_time: &str)
        -> Result<FieldTable, XtError>;

    /// Latest full snapshot per symbol (**get_full_tick**).
    fn get_full_tick(&self, stock_codes: &[String]) -> Result<HashMap<String, QuoteTick>, XtError>;

    /// Level-2 snapshot / order / transaction batches.
    fn get_l2_quote(&self, stock_codes: &[String]) -> Result<HashMap<String, FieldTable>, XtError>;
    fn get_l2_order(&self, stock_codes: &[String]) -> Result<HashMap<String, FieldTable>, XtError>;
    fn get_l2_transaction(
        &self,
        stock_codes: &[String],
    ) -> Result<HashMap<String, FieldTable>, XtError>;

    fn download_sector_data(&self) -> Result<(), XtError>;
    fn download_index_weight(&self, index_codes: &[String]) -> Result<(), XtError>;
    fn download_holiday_data(&self) -> Result<(), XtError>;

    /// Registers a per-symbol quote subscription (**subscribe_quote**).
    /// One registration covers the whole symbol set; returns the vendor
    /// registration number used for [`XtData::unsubscribe_quote`]. The sink
    /// fires on a vendor thread.
    fn subscribe_quote(
        &self,
        stock_codes: &[String],
        period: &str,
        dividend_type: &str,
        sink: TickSink,
    ) -> Result<i64, XtError>;

    /// Registers a whole-market subscription (**subscribe_whole_quote**).
    fn subscribe_whole_quote(&self, markets: &[String], sink: TickSink) -> Result<i64, XtError>;

    /// Drops a vendor-side registration (**unsubscribe_quote**).
    fn unsubscribe_quote(&self, vendor_id: i64);

    /// Registrations currently live at the vendor.
    fn quote_registration_count(&self) -> usize;
}
