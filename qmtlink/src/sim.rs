//! Simulated connector.
//!
//! Stands in for the real QMT client wherever the SDK is unavailable: the
//! whole of `sim` mode, plus tests. Behaviour mirrors the real thing where
//! the gateway can observe it: blocking calls, callbacks delivered from
//! dedicated OS threads, deterministic synthetic series in place of market
//! data. Test knobs (forced result codes, injected call latency, manual
//! tick pushes) are plain setters rather than environment variables.

use crate::api::*;
use crate::error::*;
use chrono::{Datelike, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Deterministic per-symbol price base so repeated runs agree.
fn base_price(stock_code: &str) -> f64 {
    let seed: u32 = stock_code.bytes().map(u32::from).sum();
    10.0 + f64::from(seed % 40) / 4.0
}

/// Oscillation used by every synthetic series, same shape as the tick
/// generator so candles and ticks line up.
fn osc(base: f64, seq: i64) -> f64 {
    base + ((seq % 20) - 10) as f64 / 100.0
}

// ---------------------------------------------------------------------------
// Trading side
// ---------------------------------------------------------------------------

/// Simulated **XtQuantTrader**.
pub struct SimTrader {
    session_id: String,
    callback: Mutex<Option<Arc<dyn XtTraderCallback>>>,
    connected: AtomicBool,
    connect_rc: AtomicI32,
    subscribe_rc: AtomicI32,
    call_delay_ms: AtomicU64,
    async_ack_delay_ms: AtomicU64,
    next_order_id: AtomicI64,
    orders: Mutex<Vec<XtOrder>>,
    order_calls: AtomicU64,
    cancel_calls: AtomicU64,
}

impl fmt::Debug for SimTrader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimTrader")
            .field("session_id", &self.session_id)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish()
    }
}

impl SimTrader {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            callback: Mutex::new(None),
            connected: AtomicBool::new(false),
            connect_rc: AtomicI32::new(XT_OK),
            subscribe_rc: AtomicI32::new(XT_OK),
            call_delay_ms: AtomicU64::new(0),
            async_ack_delay_ms: AtomicU64::new(50),
            next_order_id: AtomicI64::new(100_000),
            orders: Mutex::new(Vec::new()),
            order_calls: AtomicU64::new(0),
            cancel_calls: AtomicU64::new(0),
        }
    }

    /// Forces every blocking call to sleep first, approximating a hung or
    /// slow vendor.
    pub fn set_call_delay(&self, delay: Duration) {
        self.call_delay_ms.store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Forces the result of the next [`XtTrader::connect`].
    pub fn set_connect_result(&self, rc: XtResult) {
        self.connect_rc.store(rc, Ordering::Relaxed);
    }

    /// Forces the result of the next [`XtTrader::subscribe`].
    pub fn set_subscribe_result(&self, rc: XtResult) {
        self.subscribe_rc.store(rc, Ordering::Relaxed);
    }

    /// Latency between an async submit and its acknowledgement callback.
    pub fn set_async_ack_delay(&self, delay: Duration) {
        self.async_ack_delay_ms.store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// How many times **order_stock** was invoked on this handle.
    pub fn order_calls(&self) -> u64 {
        self.order_calls.load(Ordering::Relaxed)
    }

    /// How many times **cancel_order_stock** was invoked on this handle.
    pub fn cancel_calls(&self) -> u64 {
        self.cancel_calls.load(Ordering::Relaxed)
    }

    fn block(&self) {
        let ms = self.call_delay_ms.load(Ordering::Relaxed);
        if ms > 0 {
            thread::sleep(Duration::from_millis(ms));
        }
    }

    /// Delivers an event on a fresh thread, the way the real SDK calls back
    /// from its own I/O threads.
    fn emit(&self, deliver: impl FnOnce(Arc<dyn XtTraderCallback>) + Send + 'static) {
        if let Some(cb) = self.callback.lock().clone() {
            thread::spawn(move || deliver(cb));
        }
    }

    fn emit_cancel_ack(&self, account_id: String, order_id: i64, seq: i64) {
        let delay = Duration::from_millis(self.async_ack_delay_ms.load(Ordering::Relaxed));
        if let Some(cb) = self.callback.lock().clone() {
            thread::spawn(move || {
                thread::sleep(delay);
                cb.on_cancel_async_response(&XtAsyncResponse {
                    account_id,
                    order_id,
                    seq,
                    error_msg: None,
                });
            });
        }
    }

    fn make_order(
        &self,
        account: &StockAccount,
        stock_code: &str,
        order_type: i32,
        order_volume: i64,
        price_type: i32,
        price: f64,
        order_status: i32,
    ) -> XtOrder {
        let order_id = self.next_order_id.fetch_add(1, Ordering::Relaxed);
        XtOrder {
            account_id: account.account_id.clone(),
            order_id,
            order_sysid: format!("sys_{order_id}"),
            stock_code: stock_code.to_string(),
            stock_name: format!("Stock {}", &stock_code[..stock_code.len().min(6)]),
            order_type,
            price_type,
            order_volume,
            price,
            order_status,
            status_msg: String::new(),
            traded_volume: 0,
            traded_amount: 0.0,
            traded_price: 0.0,
            order_time: Utc::now().timestamp(),
        }
    }
}

impl XtTrader for SimTrader {
    fn register_callback(&self, callback: Arc<dyn XtTraderCallback>) {
        *self.callback.lock() = Some(callback);
    }

    fn start(&self) {}

    fn connect(&self) -> XtResult {
        self.block();
        let rc = self.connect_rc.load(Ordering::Relaxed);
        if rc != XT_OK {
            return rc;
        }
        self.connected.store(true, Ordering::Relaxed);
        self.emit(|cb| cb.on_connected());
        XT_OK
    }

    fn subscribe(&self, account: &StockAccount) -> XtResult {
        self.block();
        let rc = self.subscribe_rc.load(Ordering::Relaxed);
        if rc != XT_OK {
            return rc;
        }
        let status = XtAccountStatus { account_id: account.account_id.clone(), status: 1 };
        self.emit(move |cb| cb.on_account_status(&status));
        XT_OK
    }

    fn stop(&self) {
        if self.connected.swap(false, Ordering::Relaxed) {
            self.emit(|cb| cb.on_disconnected());
        }
    }

    fn query_stock_asset(&self, account: &StockAccount) -> Result<XtAsset, XtError> {
        self.block();
        if !self.connected.load(Ordering::Relaxed) {
            return Err(XtError::NotConnected);
        }
        Ok(XtAsset {
            account_id: account.account_id.clone(),
            total_asset: 1_800_000.0,
            market_value: 800_000.0,
            cash: 950_000.0,
            frozen_cash: 50_000.0,
            profit: 50_000.0,
        })
    }

    fn query_stock_positions(&self, account: &StockAccount) -> Result<Vec<XtPosition>, XtError> {
        self.block();
        if !self.connected.load(Ordering::Relaxed) {
            return Err(XtError::NotConnected);
        }
        Ok(vec![
            XtPosition {
                account_id: account.account_id.clone(),
                stock_code: "000001.SZ".into(),
                stock_name: "Ping An Bank".into(),
                volume: 10_000,
                can_use_volume: 10_000,
                frozen_volume: 0,
                open_price: 12.50,
                market_value: 132_000.0,
                profit: 7_000.0,
            },
            XtPosition {
                account_id: account.account_id.clone(),
                stock_code: "000002.SZ".into(),
                stock_name: "Vanke A".into(),
                volume: 5_000,
                can_use_volume: 5_000,
                frozen_volume: 0,
                open_price: 18.80,
                market_value: 97_500.0,
                profit: 3_500.0,
            },
        ])
    }

    fn query_stock_orders(&self, _account: &StockAccount) -> Result<Vec<XtOrder>, XtError> {
        self.block();
        if !self.connected.load(Ordering::Relaxed) {
            return Err(XtError::NotConnected);
        }
        Ok(self.orders.lock().clone())
    }

    fn query_stock_trades(&self, account: &StockAccount) -> Result<Vec<XtTrade>, XtError> {
        self.block();
        if !self.connected.load(Ordering::Relaxed) {
            return Err(XtError::NotConnected);
        }
        // One synthetic full fill per order this handle has accepted.
        Ok(self
            .orders
            .lock()
            .iter()
            .filter(|o| o.order_status == ORDER_STATUS_SUCCEEDED)
            .map(|o| XtTrade {
                account_id: account.account_id.clone(),
                traded_id: format!("fill_{}", o.order_id),
                order_id: o.order_id,
                order_sysid: o.order_sysid.clone(),
                stock_code: o.stock_code.clone(),
                stock_name: o.stock_name.clone(),
                order_type: o.order_type,
                traded_volume: o.order_volume,
                traded_price: o.price,
                traded_amount: o.price * o.order_volume as f64,
                commission: (o.price * o.order_volume as f64 * 0.0003).max(5.0),
                traded_time: Utc::now().timestamp(),
            })
            .collect())
    }

    fn order_stock(
        &self,
        account: &StockAccount,
        stock_code: &str,
        order_type: i32,
        order_volume: i64,
        price_type: i32,
        price: f64,
        _strategy_name: &str,
        _order_remark: &str,
    ) -> i64 {
        self.block();
        self.order_calls.fetch_add(1, Ordering::Relaxed);
        if !self.connected.load(Ordering::Relaxed) {
            return -1;
        }
        let mut order = self.make_order(
            account,
            stock_code,
            order_type,
            order_volume,
            price_type,
            price,
            ORDER_STATUS_REPORTED,
        );
        let order_id = order.order_id;
        let snapshot = order.clone();
        self.emit(move |cb| cb.on_stock_order(&snapshot));
        // Fill straight away; the sim does not model a resting book.
        order.order_status = ORDER_STATUS_SUCCEEDED;
        order.traded_volume = order.order_volume;
        order.traded_price = order.price;
        order.traded_amount = order.price * order.order_volume as f64;
        let filled = order.clone();
        self.orders.lock().push(order);
        self.emit(move |cb| cb.on_stock_order(&filled));
        order_id
    }

    fn cancel_order_stock(&self, _account: &StockAccount, order_id: i64) -> XtResult {
        self.block();
        self.cancel_calls.fetch_add(1, Ordering::Relaxed);
        if !self.connected.load(Ordering::Relaxed) {
            return -1;
        }
        let mut orders = self.orders.lock();
        match orders.iter_mut().find(|o| o.order_id == order_id) {
            Some(order) => {
                order.order_status = ORDER_STATUS_CANCELLED;
                let snapshot = order.clone();
                drop(orders);
                self.emit(move |cb| cb.on_stock_order(&snapshot));
                XT_OK
            }
            None => -1,
        }
    }

    fn order_stock_async(
        &self,
        account: &StockAccount,
        stock_code: &str,
        order_type: i32,
        order_volume: i64,
        price_type: i32,
        price: f64,
        _strategy_name: &str,
        _order_remark: &str,
        seq: i64,
    ) -> XtResult {
        self.block();
        self.order_calls.fetch_add(1, Ordering::Relaxed);
        if !self.connected.load(Ordering::Relaxed) {
            return -1;
        }
        let order = self.make_order(
            account,
            stock_code,
            order_type,
            order_volume,
            price_type,
            price,
            ORDER_STATUS_REPORTED,
        );
        self.orders.lock().push(order.clone());
        let delay = Duration::from_millis(self.async_ack_delay_ms.load(Ordering::Relaxed));
        let callback = self.callback.lock().clone();
        let account_id = account.account_id.clone();
        if let Some(cb) = callback {
            thread::spawn(move || {
                thread::sleep(delay);
                cb.on_stock_order(&order);
                cb.on_order_async_response(&XtAsyncResponse {
                    account_id,
                    order_id: order.order_id,
                    seq,
                    error_msg: None,
                });
            });
        }
        XT_OK
    }

    fn cancel_order_stock_async(
        &self,
        account: &StockAccount,
        order_id: i64,
        seq: i64,
    ) -> XtResult {
        self.block();
        self.cancel_calls.fetch_add(1, Ordering::Relaxed);
        if !self.connected.load(Ordering::Relaxed) {
            return -1;
        }
        if let Some(order) = self.orders.lock().iter_mut().find(|o| o.order_id == order_id) {
            order.order_status = ORDER_STATUS_CANCELLED;
        }
        self.emit_cancel_ack(account.account_id.clone(), order_id, seq);
        XT_OK
    }

    fn cancel_order_stock_sysid_async(
        &self,
        account: &StockAccount,
        order_sysid: &str,
        seq: i64,
    ) -> XtResult {
        self.block();
        self.cancel_calls.fetch_add(1, Ordering::Relaxed);
        if !self.connected.load(Ordering::Relaxed) {
            return -1;
        }
        let mut orders = self.orders.lock();
        let order_id = match orders.iter_mut().find(|o| o.order_sysid == order_sysid) {
            Some(order) => {
                order.order_status = ORDER_STATUS_CANCELLED;
                order.order_id
            }
            None => return -1,
        };
        drop(orders);
        self.emit_cancel_ack(account.account_id.clone(), order_id, seq);
        XT_OK
    }
}

// ---------------------------------------------------------------------------
// Market-data side
// ---------------------------------------------------------------------------

struct GeneratorEntry {
    stop: Arc<AtomicBool>,
    sink: TickSink,
    codes: Vec<String>,
    ticks: Arc<AtomicU64>,
}

/// Simulated **xtdata**.
pub struct SimData {
    tick_interval: Duration,
    call_delay_ms: AtomicU64,
    next_registration: AtomicI64,
    generators: Mutex<HashMap<i64, GeneratorEntry>>,
    sectors: Mutex<HashMap<String, Vec<String>>>,
}

impl fmt::Debug for SimData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimData")
            .field("tick_interval", &self.tick_interval)
            .field("registrations", &self.generators.lock().len())
            .finish()
    }
}

impl Default for SimData {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl SimData {
    /// `tick_interval == 0` disables the spontaneous generators; ticks then
    /// only flow through [`SimData::push_tick`].
    pub fn new(tick_interval: Duration) -> Self {
        let mut sectors = HashMap::new();
        sectors.insert(
            "bank".to_string(),
            vec!["000001.SZ".to_string(), "600036.SH".to_string(), "601398.SH".to_string()],
        );
        sectors.insert(
            "real_estate".to_string(),
            vec!["000002.SZ".to_string(), "600048.SH".to_string()],
        );
        Self {
            tick_interval,
            call_delay_ms: AtomicU64::new(0),
            next_registration: AtomicI64::new(1),
            generators: Mutex::new(HashMap::new()),
            sectors: Mutex::new(sectors),
        }
    }

    /// Forces every blocking call to sleep first.
    pub fn set_call_delay(&self, delay: Duration) {
        self.call_delay_ms.store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Drives one tick through a registration's sink on the caller's
    /// thread, which therefore plays the vendor thread.
    pub fn push_tick(&self, vendor_id: i64, tick: QuoteTick) -> bool {
        let sink = match self.generators.lock().get(&vendor_id) {
            Some(entry) => {
                entry.ticks.fetch_add(1, Ordering::Relaxed);
                Arc::clone(&entry.sink)
            }
            None => return false,
        };
        sink(tick);
        true
    }

    /// Ticks generated (or pushed) per live registration.
    pub fn tick_counts(&self) -> HashMap<i64, u64> {
        self.generators
            .lock()
            .iter()
            .map(|(id, e)| (*id, e.ticks.load(Ordering::Relaxed)))
            .collect()
    }

    fn block(&self) {
        let ms = self.call_delay_ms.load(Ordering::Relaxed);
        if ms > 0 {
            thread::sleep(Duration::from_millis(ms));
        }
    }

    fn synthetic_tick(code: &str, seq: i64) -> QuoteTick {
        let base = base_price(code);
        let price = osc(base, seq);
        QuoteTick {
            stock_code: code.to_string(),
            time: now_ms(),
            last_price: price,
            open: base,
            high: base + 0.1,
            low: base - 0.1,
            pre_close: base,
            volume: 100 + (seq % 5) * 10,
            amount: price * (100 + (seq % 5) * 10) as f64,
            bid_price: vec![price - 0.01, price - 0.02, price - 0.03, price - 0.04, price - 0.05],
            ask_price: vec![price + 0.01, price + 0.02, price + 0.03, price + 0.04, price + 0.05],
            bid_vol: vec![500, 400, 300, 200, 100],
            ask_vol: vec![500, 400, 300, 200, 100],
        }
    }

    fn register(&self, codes: Vec<String>, sink: TickSink) -> i64 {
        let vendor_id = self.next_registration.fetch_add(1, Ordering::Relaxed);
        let stop = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU64::new(0));
        if !self.tick_interval.is_zero() {
            let stop_flag = Arc::clone(&stop);
            let counter = Arc::clone(&ticks);
            let interval = self.tick_interval;
            let gen_codes = codes.clone();
            let gen_sink = Arc::clone(&sink);
            thread::spawn(move || {
                let mut seq: i64 = 1;
                while !stop_flag.load(Ordering::Relaxed) {
                    thread::sleep(interval);
                    if stop_flag.load(Ordering::Relaxed) {
                        break;
                    }
                    for code in &gen_codes {
                        gen_sink(Self::synthetic_tick(code, seq));
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                    seq += 1;
                }
                debug!(registration = vendor_id, "sim tick generator stopped");
            });
        }
        self.generators.lock().insert(vendor_id, GeneratorEntry { stop, sink, codes, ticks });
        vendor_id
    }

    fn table_for(code: &str, fields: &[String], rows: usize) -> FieldTable {
        let base = base_price(code);
        let day_ms: i64 = 86_400_000;
        let end = now_ms() - now_ms() % day_ms;
        let index: Vec<i64> = (0..rows).map(|i| end - (rows - 1 - i) as i64 * day_ms).collect();
        let values = fields
            .iter()
            .map(|field| {
                (0..rows as i64)
                    .map(|i| match field.as_str() {
                        "open" => Cell::F64(osc(base, i)),
                        "high" => Cell::F64(osc(base, i) + 0.1),
                        "low" => Cell::F64(osc(base, i) - 0.1),
                        "close" => Cell::F64(osc(base, i + 1)),
                        "volume" => Cell::I64(100_000 + (i % 7) * 10_000),
                        "amount" => Cell::F64(osc(base, i) * (100_000 + (i % 7) * 10_000) as f64),
                        "suspended" => Cell::Bool(false),
                        _ => Cell::Null,
                    })
                    .collect()
            })
            .collect();
        FieldTable { fields: fields.to_vec(), index, values }
    }
}

impl Drop for SimData {
    fn drop(&mut self) {
        for (_, entry) in self.generators.lock().drain() {
            entry.stop.store(true, Ordering::Relaxed);
        }
    }
}

const DEFAULT_KLINE_FIELDS: [&str; 6] = ["open", "high", "low", "close", "volume", "amount"];

impl XtData for SimData {
    fn get_market_data(
        &self,
        fields: &[String],
        stock_codes: &[String],
        _period: &str,
        _start_time: &str,
        _end_time: &str,
        _dividend_type: &str,
        _fill_data: bool,
    ) -> Result<HashMap<String, FieldTable>, XtError> {
        self.block();
        let fields: Vec<String> = if fields.is_empty() {
            DEFAULT_KLINE_FIELDS.iter().map(|s| s.to_string()).collect()
        } else {
            fields.to_vec()
        };
        Ok(stock_codes
            .iter()
            .map(|code| (code.clone(), Self::table_for(code, &fields, 30)))
            .collect())
    }

    fn download_history_data(
        &self,
        _stock_code: &str,
        _period: &str,
        _start_time: &str,
        _end_time: &str,
    ) -> Result<(), XtError> {
        self.block();
        Ok(())
    }

    fn get_financial_data(
        &self,
        stock_codes: &[String],
        tables: &[String],
        _start_time: &str,
        _end_time: &str,
    ) -> Result<HashMap<String, HashMap<String, FieldTable>>, XtError> {
        self.block();
        let fields: Vec<String> =
            ["m_anntime", "revenue", "net_profit"].iter().map(|s| s.to_string()).collect();
        Ok(stock_codes
            .iter()
            .map(|code| {
                let per_table = tables
                    .iter()
                    .map(|t| (t.clone(), Self::table_for(code, &fields, 4)))
                    .collect();
                (code.clone(), per_table)
            })
            .collect())
    }

    fn download_financial_data(
        &self,
        _stock_codes: &[String],
        _tables: &[String],
    ) -> Result<(), XtError> {
        self.block();
        Ok(())
    }

    fn get_sector_list(&self) -> Result<Vec<String>, XtError> {
        self.block();
        let mut names: Vec<String> = self.sectors.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn get_stock_list_in_sector(&self, sector_name: &str) -> Result<Vec<String>, XtError> {
        self.block();
        self.sectors
            .lock()
            .get(sector_name)
            .cloned()
            .ok_or_else(|| XtError::UnknownInstrument(sector_name.to_string()))
    }

    fn create_sector(
        &self,
        _parent_node: &str,
        sector_name: &str,
        overwrite: bool,
    ) -> Result<(), XtError> {
        self.block();
        let mut sectors = self.sectors.lock();
        if sectors.contains_key(sector_name) && !overwrite {
            return Err(XtError::Call(-1));
        }
        sectors.insert(sector_name.to_string(), Vec::new());
        Ok(())
    }

    fn add_sector(&self, sector_name: &str, stock_codes: &[String]) -> Result<(), XtError> {
        self.block();
        let mut sectors = self.sectors.lock();
        let entry = sectors.entry(sector_name.to_string()).or_default();
        for code in stock_codes {
            if !entry.contains(code) {
                entry.push(code.clone());
            }
        }
        Ok(())
    }

    fn remove_stock_from_sector(
        &self,
        sector_name: &str,
        stock_codes: &[String],
    ) -> Result<(), XtError> {
        self.block();
        if let Some(entry) = self.sectors.lock().get_mut(sector_name) {
            entry.retain(|c| !stock_codes.contains(c));
        }
        Ok(())
    }

    fn remove_sector(&self, sector_name: &str) -> Result<(), XtError> {
        self.block();
        self.sectors.lock().remove(sector_name);
        Ok(())
    }

    fn reset_sector(&self, sector_name: &str, stock_codes: &[String]) -> Result<(), XtError> {
        self.block();
        self.sectors.lock().insert(sector_name.to_string(), stock_codes.to_vec());
        Ok(())
    }

    fn get_index_weight(&self, index_code: &str) -> Result<HashMap<String, f64>, XtError> {
        self.block();
        let members = ["000001.SZ", "000002.SZ", "600036.SH", "600048.SH"];
        let seed = base_price(index_code);
        let mut weights: HashMap<String, f64> = members
            .iter()
            .enumerate()
            .map(|(i, code)| (code.to_string(), (seed + i as f64).rem_euclid(10.0) + 1.0))
            .collect();
        let total: f64 = weights.values().sum();
        for w in weights.values_mut() {
            *w /= total;
        }
        Ok(weights)
    }

    fn get_trading_calendar(&self, _market: &str, year: i32) -> Result<Vec<String>, XtError> {
        self.block();
        let holidays = self.get_holidays()?;
        let mut days = Vec::new();
        let mut date = chrono::NaiveDate::from_ymd_opt(year, 1, 1).ok_or(XtError::NoData)?;
        while date.year() == year {
            let formatted = date.format("%Y%m%d").to_string();
            let weekday = date.weekday().num_days_from_monday();
            if weekday < 5 && !holidays.contains(&formatted) {
                days.push(formatted);
            }
            date = date.succ_opt().ok_or(XtError::NoData)?;
        }
        Ok(days)
    }

    fn get_instrument_detail(&self, stock_code: &str) -> Result<XtInstrumentDetail, XtError> {
        self.block();
        let (body, exchange) = stock_code
            .rsplit_once('.')
            .ok_or_else(|| XtError::UnknownInstrument(stock_code.to_string()))?;
        Ok(XtInstrumentDetail {
            stock_code: stock_code.to_string(),
            stock_name: format!("Stock {body}"),
            exchange: exchange.to_string(),
            instrument_type: "stock".into(),
            open_date: "20100101".into(),
            total_volume: 1_000_000_000,
            float_volume: 600_000_000,
            price_tick: 0.01,
            is_trading: true,
        })
    }

    fn get_instrument_type(&self, _stock_code: &str) -> Result<Vec<String>, XtError> {
        self.block();
        Ok(vec!["stock".to_string()])
    }

    fn get_holidays(&self) -> Result<Vec<String>, XtError> {
        self.block();
        Ok(["20250101", "20250501", "20251001", "20260101", "20260501", "20261001"]
            .iter()
            .map(|s| s.to_string())
            .collect())
    }

    fn get_divid_factors(
        &self,
        stock_code: &str,
        _start_time: &str,
        _end_time: &str,
    ) -> Result<FieldTable, XtError> {
        self.block();
        let fields: Vec<String> =
            ["interest", "stock_bonus", "stock_gift", "allot_num", "allot_price"]
                .iter()
                .map(|s| s.to_string())
                .collect();
        Ok(Self::table_for(stock_code, &fields, 2))
    }

    fn get_full_tick(
        &self,
        stock_codes: &[String],
    ) -> Result<HashMap<String, QuoteTick>, XtError> {
        self.block();
        Ok(stock_codes
            .iter()
            .map(|code| (code.clone(), Self::synthetic_tick(code, 1)))
            .collect())
    }

    fn get_l2_quote(&self, stock_codes: &[String]) -> Result<HashMap<String, FieldTable>, XtError> {
        self.block();
        let fields: Vec<String> =
            ["price", "volume", "bid_1", "ask_1"].iter().map(|s| s.to_string()).collect();
        Ok(stock_codes
            .iter()
            .map(|code| (code.clone(), Self::table_for(code, &fields, 10)))
            .collect())
    }

    fn get_l2_order(&self, stock_codes: &[String]) -> Result<HashMap<String, FieldTable>, XtError> {
        self.block();
        let fields: Vec<String> =
            ["price", "volume", "entrust_type"].iter().map(|s| s.to_string()).collect();
        Ok(stock_codes
            .iter()
            .map(|code| (code.clone(), Self::table_for(code, &fields, 10)))
            .collect())
    }

    fn get_l2_transaction(
        &self,
        stock_codes: &[String],
    ) -> Result<HashMap<String, FieldTable>, XtError> {
        self.block();
        let fields: Vec<String> =
            ["price", "volume", "trade_flag"].iter().map(|s| s.to_string()).collect();
        Ok(stock_codes
            .iter()
            .map(|code| (code.clone(), Self::table_for(code, &fields, 10)))
            .collect())
    }

    fn download_sector_data(&self) -> Result<(), XtError> {
        self.block();
        Ok(())
    }

    fn download_index_weight(&self, _index_codes: &[String]) -> Result<(), XtError> {
        self.block();
        Ok(())
    }

    fn download_holiday_data(&self) -> Result<(), XtError> {
        self.block();
        Ok(())
    }

    fn subscribe_quote(
        &self,
        stock_codes: &[String],
        _period: &str,
        _dividend_type: &str,
        sink: TickSink,
    ) -> Result<i64, XtError> {
        self.block();
        Ok(self.register(stock_codes.to_vec(), sink))
    }

    fn subscribe_whole_quote(&self, markets: &[String], sink: TickSink) -> Result<i64, XtError> {
        self.block();
        // A fixed universe per market keeps the stream bounded and
        // deterministic.
        let codes: Vec<String> = markets
            .iter()
            .flat_map(|market| match market.as_str() {
                "SH" => vec!["600036.SH".to_string(), "600048.SH".to_string()],
                "SZ" => vec!["000001.SZ".to_string(), "000002.SZ".to_string()],
                _ => Vec::new(),
            })
            .collect();
        Ok(self.register(codes, sink))
    }

    fn unsubscribe_quote(&self, vendor_id: i64) {
        if let Some(entry) = self.generators.lock().remove(&vendor_id) {
            entry.stop.store(true, Ordering::Relaxed);
            debug!(
                registration = vendor_id,
                codes = entry.codes.len(),
                ticks = entry.ticks.load(Ordering::Relaxed),
                "sim registration dropped"
            );
        }
    }

    fn quote_registration_count(&self) -> usize {
        self.generators.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl XtTraderCallback for Recorder {
        fn on_connected(&self) {
            self.events.lock().push("connected".into());
        }
        fn on_disconnected(&self) {
            self.events.lock().push("disconnected".into());
        }
        fn on_account_status(&self, _: &XtAccountStatus) {
            self.events.lock().push("account_status".into());
        }
        fn on_stock_asset(&self, _: &XtAsset) {}
        fn on_stock_order(&self, order: &XtOrder) {
            self.events.lock().push(format!("order:{}", order.order_status));
        }
        fn on_stock_trade(&self, _: &XtTrade) {}
        fn on_stock_position(&self, _: &XtPosition) {}
        fn on_order_error(&self, _: &XtOrderError) {}
        fn on_cancel_error(&self, _: &XtCancelError) {}
        fn on_order_async_response(&self, resp: &XtAsyncResponse) {
            self.events.lock().push(format!("async_order:{}", resp.seq));
        }
        fn on_cancel_async_response(&self, resp: &XtAsyncResponse) {
            self.events.lock().push(format!("async_cancel:{}", resp.seq));
        }
    }

    fn connected_trader() -> (SimTrader, Arc<Recorder>) {
        let trader = SimTrader::new("session_test");
        let recorder = Arc::new(Recorder::default());
        trader.register_callback(recorder.clone());
        trader.start();
        assert_eq!(trader.connect(), XT_OK);
        (trader, recorder)
    }

    #[test]
    fn connect_can_be_forced_to_fail() {
        let trader = SimTrader::new("s");
        trader.set_connect_result(-151);
        assert_eq!(trader.connect(), -151);
        assert!(trader.query_stock_asset(&StockAccount::new("a")).is_err());
    }

    #[test]
    fn async_order_echoes_sequence() {
        let (trader, recorder) = connected_trader();
        trader.set_async_ack_delay(Duration::from_millis(10));
        let rc = trader.order_stock_async(
            &StockAccount::new("a1"),
            "000001.SZ",
            STOCK_BUY,
            100,
            FIX_PRICE,
            13.5,
            "default",
            "",
            42,
        );
        assert_eq!(rc, XT_OK);
        thread::sleep(Duration::from_millis(100));
        let events = recorder.events.lock().clone();
        assert!(events.iter().any(|e| e == "async_order:42"), "events: {events:?}");
    }

    #[test]
    fn order_fills_and_appears_in_trades() {
        let (trader, _recorder) = connected_trader();
        let account = StockAccount::new("a1");
        let order_id =
            trader.order_stock(&account, "000001.SZ", STOCK_BUY, 200, FIX_PRICE, 12.0, "s", "");
        assert!(order_id > 0);
        let trades = trader.query_stock_trades(&account).unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].order_id, order_id);
        assert_eq!(trades[0].traded_volume, 200);
    }

    #[test]
    fn manual_tick_push_reaches_sink() {
        let data = SimData::new(Duration::ZERO);
        let (tx, rx) = mpsc::channel();
        let sink: TickSink = Arc::new(move |tick: QuoteTick| {
            let _ = tx.send(tick);
        });
        let id = data
            .subscribe_quote(&["000001.SZ".to_string()], "1d", "none", sink)
            .unwrap();
        assert!(data.push_tick(id, SimData::synthetic_tick("000001.SZ", 7)));
        let tick = rx.recv_timeout(Duration::from_millis(200)).unwrap();
        assert_eq!(tick.stock_code, "000001.SZ");
        data.unsubscribe_quote(id);
        assert_eq!(data.quote_registration_count(), 0);
        assert!(!data.push_tick(id, SimData::synthetic_tick("000001.SZ", 8)));
    }

    #[test]
    fn market_data_table_is_field_major() {
        let data = SimData::new(Duration::ZERO);
        let tables = data
            .get_market_data(&[], &["600036.SH".to_string()], "1d", "", "", "none", true)
            .unwrap();
        let table = &tables["600036.SH"];
        assert_eq!(table.fields.len(), DEFAULT_KLINE_FIELDS.len());
        assert_eq!(table.values.len(), table.fields.len());
        assert!(table.values.iter().all(|col| col.len() == table.index.len()));
    }

    #[test]
    fn trading_calendar_skips_weekends_and_holidays() {
        let data = SimData::new(Duration::ZERO);
        let days = data.get_trading_calendar("SH", 2025).unwrap();
        assert!(!days.contains(&"20250101".to_string()));
        // 2025-01-04 is a Saturday.
        assert!(!days.contains(&"20250104".to_string()));
        assert!(days.contains(&"20250102".to_string()));
    }
}
