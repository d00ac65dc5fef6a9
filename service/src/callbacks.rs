//! Trading-callback dispatcher.
//!
//! Receives vendor-thread callbacks and carries them into the
//! request-serving runtime. Each subscriber owns a bounded broadcast ring:
//! the vendor-side send never blocks, a full ring overwrites its oldest
//! entry and the reader observes the gap as a lag count. Within one account
//! the delivery order equals the vendor delivery order; across accounts no
//! total order is promised.

use crate::model::trading::{OrderSide, OrderStatus, OrderType};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;
use xtgate_qmtlink as qmt;

/// History records replayed to a fresh subscriber.
pub const HISTORY_REPLAY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackKind {
    Connected,
    Disconnected,
    AccountStatus,
    Asset,
    Order,
    Trade,
    Position,
    OrderError,
    CancelError,
    AsyncOrder,
    AsyncCancel,
}

/// Immutable record of one vendor callback.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallbackRecord {
    pub callback_type: CallbackKind,
    /// Empty for connection-level events.
    pub account_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
    pub data: serde_json::Value,
}

impl CallbackRecord {
    pub fn new(
        callback_type: CallbackKind,
        account_id: impl Into<String>,
        seq: Option<i64>,
        data: serde_json::Value,
    ) -> Self {
        Self { callback_type, account_id: account_id.into(), timestamp: Utc::now(), seq, data }
    }
}

struct SubscriberSlot {
    /// `None` receives everything; otherwise only records whose account
    /// matches.
    filter: Option<String>,
    tx: broadcast::Sender<CallbackRecord>,
}

impl SubscriberSlot {
    fn matches(&self, record: &CallbackRecord) -> bool {
        match &self.filter {
            None => true,
            Some(account) => record.account_id == *account,
        }
    }
}

struct Inner {
    history: VecDeque<CallbackRecord>,
    subscribers: Vec<SubscriberSlot>,
}

/// A live subscription to the callback stream.
#[derive(Debug)]
pub struct CallbackSubscription {
    /// Most recent matching history, oldest first, at most
    /// [`HISTORY_REPLAY_LIMIT`] records.
    pub replay: Vec<CallbackRecord>,
    pub receiver: broadcast::Receiver<CallbackRecord>,
}

pub struct CallbackDispatcher {
    inner: Mutex<Inner>,
    /// Ring capacity per subscriber.
    queue_capacity: usize,
    history_capacity: usize,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl fmt::Debug for CallbackDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("CallbackDispatcher")
            .field("subscribers", &inner.subscribers.len())
            .field("history", &inner.history.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl CallbackDispatcher {
    pub fn new(queue_capacity: usize, history_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                history: VecDeque::with_capacity(history_capacity),
                subscribers: Vec::new(),
            }),
            queue_capacity: queue_capacity.max(1),
            history_capacity: history_capacity.max(1),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Registers a subscriber and synchronously replays the most recent
    /// matching history so reconnecting clients see state immediately.
    pub fn subscribe(&self, account_filter: Option<String>) -> CallbackSubscription {
        let (tx, receiver) = broadcast::channel(self.queue_capacity);
        let mut inner = self.inner.lock();
        let slot = SubscriberSlot { filter: account_filter, tx };
        let matching: Vec<CallbackRecord> =
            inner.history.iter().filter(|r| slot.matches(r)).cloned().collect();
        let replay =
            matching[matching.len().saturating_sub(HISTORY_REPLAY_LIMIT)..].to_vec();
        inner.subscribers.push(slot);
        CallbackSubscription { replay, receiver }
    }

    /// Delivers one record. Called from vendor threads; never blocks.
    pub fn dispatch(&self, record: CallbackRecord) {
        if self.closed.load(Ordering::Relaxed) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(kind = ?record.callback_type, "dispatcher closed; callback dropped");
            return;
        }
        let mut inner = self.inner.lock();
        if inner.history.len() == self.history_capacity {
            inner.history.pop_front();
        }
        inner.history.push_back(record.clone());
        // A send error means every receiver is gone; prune those slots.
        inner.subscribers.retain(|slot| {
            if !slot.matches(&record) {
                return slot.tx.receiver_count() > 0;
            }
            slot.tx.send(record.clone()).is_ok()
        });
    }

    /// Most recent matching records, oldest first.
    pub fn recent(&self, account_filter: Option<&str>, limit: usize) -> Vec<CallbackRecord> {
        let inner = self.inner.lock();
        let matching: Vec<CallbackRecord> = inner
            .history
            .iter()
            .filter(|r| account_filter.is_none_or(|a| r.account_id == a))
            .cloned()
            .collect();
        matching[matching.len().saturating_sub(limit)..].to_vec()
    }

    /// Stops delivery; subsequent callbacks are dropped and counted.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.inner.lock().subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// One packing function per callback kind, exhaustive over the vendor
// fields the gateway exposes. No other code runs on vendor threads.
impl qmt::XtTraderCallback for CallbackDispatcher {
    fn on_connected(&self) {
        self.dispatch(CallbackRecord::new(
            CallbackKind::Connected,
            "",
            None,
            json!({ "status": "connected" }),
        ));
    }

    fn on_disconnected(&self) {
        self.dispatch(CallbackRecord::new(
            CallbackKind::Disconnected,
            "",
            None,
            json!({ "status": "disconnected" }),
        ));
    }

    fn on_account_status(&self, status: &qmt::XtAccountStatus) {
        self.dispatch(CallbackRecord::new(
            CallbackKind::AccountStatus,
            status.account_id.clone(),
            None,
            json!({ "account_id": status.account_id, "status": status.status }),
        ));
    }

    fn on_stock_asset(&self, asset: &qmt::XtAsset) {
        self.dispatch(CallbackRecord::new(
            CallbackKind::Asset,
            asset.account_id.clone(),
            None,
            json!({
                "account_id": asset.account_id,
                "total_asset": asset.total_asset,
                "market_value": asset.market_value,
                "cash": asset.cash,
                "frozen_cash": asset.frozen_cash,
                "available_cash": asset.cash - asset.frozen_cash,
            }),
        ));
    }

    fn on_stock_order(&self, order: &qmt::XtOrder) {
        self.dispatch(CallbackRecord::new(
            CallbackKind::Order,
            order.account_id.clone(),
            None,
            json!({
                "account_id": order.account_id,
                "order_id": order.order_id.to_string(),
                "order_sysid": order.order_sysid,
                "stock_code": order.stock_code,
                "stock_name": order.stock_name,
                "side": OrderSide::from_vendor(order.order_type),
                "order_type": OrderType::from_vendor(order.price_type),
                "volume": order.order_volume,
                "price": order.price,
                "status": OrderStatus::from_vendor(order.order_status),
                "status_msg": order.status_msg,
                "filled_volume": order.traded_volume,
                "filled_amount": order.traded_amount,
            }),
        ));
    }

    fn on_stock_trade(&self, trade: &qmt::XtTrade) {
        self.dispatch(CallbackRecord::new(
            CallbackKind::Trade,
            trade.account_id.clone(),
            None,
            json!({
                "account_id": trade.account_id,
                "trade_id": trade.traded_id,
                "order_id": trade.order_id.to_string(),
                "order_sysid": trade.order_sysid,
                "stock_code": trade.stock_code,
                "stock_name": trade.stock_name,
                "side": OrderSide::from_vendor(trade.order_type),
                "volume": trade.traded_volume,
                "price": trade.traded_price,
                "amount": trade.traded_amount,
                "commission": trade.commission,
            }),
        ));
    }

    fn on_stock_position(&self, position: &qmt::XtPosition) {
        let market_price = if position.volume > 0 {
            position.market_value / position.volume as f64
        } else {
            0.0
        };
        self.dispatch(CallbackRecord::new(
            CallbackKind::Position,
            position.account_id.clone(),
            None,
            json!({
                "account_id": position.account_id,
                "stock_code": position.stock_code,
                "stock_name": position.stock_name,
                "volume": position.volume,
                "available_volume": position.can_use_volume,
                "frozen_volume": position.frozen_volume,
                "cost_price": position.open_price,
                "market_price": market_price,
                "market_value": position.market_value,
                "profit_loss": position.profit,
            }),
        ));
    }

    fn on_order_error(&self, error: &qmt::XtOrderError) {
        self.dispatch(CallbackRecord::new(
            CallbackKind::OrderError,
            error.account_id.clone(),
            None,
            json!({
                "account_id": error.account_id,
                "order_id": error.order_id.to_string(),
                "error_id": error.error_id,
                "error_msg": error.error_msg,
            }),
        ));
    }

    fn on_cancel_error(&self, error: &qmt::XtCancelError) {
        self.dispatch(CallbackRecord::new(
            CallbackKind::CancelError,
            error.account_id.clone(),
            None,
            json!({
                "account_id": error.account_id,
                "order_id": error.order_id.to_string(),
                "error_id": error.error_id,
                "error_msg": error.error_msg,
            }),
        ));
    }

    fn on_order_async_response(&self, response: &qmt::XtAsyncResponse) {
        self.dispatch(CallbackRecord::new(
            CallbackKind::AsyncOrder,
            response.account_id.clone(),
            Some(response.seq),
            json!({
                "account_id": response.account_id,
                "order_id": response.order_id.to_string(),
                "seq": response.seq,
                "error_msg": response.error_msg,
            }),
        ));
    }

    fn on_cancel_async_response(&self, response: &qmt::XtAsyncResponse) {
        self.dispatch(CallbackRecord::new(
            CallbackKind::AsyncCancel,
            response.account_id.clone(),
            Some(response.seq),
            json!({
                "account_id": response.account_id,
                "order_id": response.order_id.to_string(),
                "seq": response.seq,
                "error_msg": response.error_msg,
            }),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    fn record(kind: CallbackKind, account: &str, n: i64) -> CallbackRecord {
        CallbackRecord::new(kind, account, None, json!({ "n": n }))
    }

    #[tokio::test]
    async fn per_account_order_is_preserved() {
        let dispatcher = CallbackDispatcher::new(100, 100);
        let mut sub = dispatcher.subscribe(Some("A".into()));
        dispatcher.dispatch(record(CallbackKind::Order, "A", 1));
        dispatcher.dispatch(record(CallbackKind::Trade, "A", 2));
        dispatcher.dispatch(record(CallbackKind::Order, "B", 99));
        dispatcher.dispatch(record(CallbackKind::Order, "A", 3));
        dispatcher.dispatch(record(CallbackKind::Trade, "A", 4));

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(sub.receiver.recv().await.unwrap().data["n"].as_i64().unwrap());
        }
        assert_eq!(seen, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn account_filter_excludes_other_accounts() {
        let dispatcher = CallbackDispatcher::new(100, 100);
        let mut sub = dispatcher.subscribe(Some("A".into()));
        dispatcher.dispatch(record(CallbackKind::Order, "B", 1));
        dispatcher.dispatch(record(CallbackKind::Order, "A", 2));
        let got = sub.receiver.recv().await.unwrap();
        assert_eq!(got.account_id, "A");
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn global_subscriber_sees_everything() {
        let dispatcher = CallbackDispatcher::new(100, 100);
        let mut sub = dispatcher.subscribe(None);
        dispatcher.dispatch(record(CallbackKind::Order, "A", 1));
        dispatcher.dispatch(record(CallbackKind::Order, "B", 2));
        assert_eq!(sub.receiver.recv().await.unwrap().account_id, "A");
        assert_eq!(sub.receiver.recv().await.unwrap().account_id, "B");
    }

    #[tokio::test]
    async fn slow_subscriber_drops_oldest_not_newest() {
        let capacity = 8;
        let dispatcher = CallbackDispatcher::new(capacity, 100);
        let mut sub = dispatcher.subscribe(None);
        for n in 0..50 {
            dispatcher.dispatch(record(CallbackKind::Order, "A", n));
        }
        match sub.receiver.recv().await {
            Err(RecvError::Lagged(missed)) => assert_eq!(missed, 50 - capacity as u64),
            other => panic!("expected lag, got {other:?}"),
        }
        // The retained window is the most recent `capacity` records.
        let next = sub.receiver.recv().await.unwrap();
        assert_eq!(next.data["n"].as_i64().unwrap(), 50 - capacity as i64);
    }

    #[test]
    fn replay_is_bounded_and_most_recent() {
        let dispatcher = CallbackDispatcher::new(100, 100);
        for n in 0..25 {
            dispatcher.dispatch(record(CallbackKind::Order, "A", n));
        }
        let sub = dispatcher.subscribe(Some("A".into()));
        assert_eq!(sub.replay.len(), HISTORY_REPLAY_LIMIT);
        let ns: Vec<i64> =
            sub.replay.iter().map(|r| r.data["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, (15..25).collect::<Vec<_>>());
    }

    #[test]
    fn history_ring_is_bounded() {
        let dispatcher = CallbackDispatcher::new(100, 5);
        for n in 0..20 {
            dispatcher.dispatch(record(CallbackKind::Order, "A", n));
        }
        let recent = dispatcher.recent(None, 100);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].data["n"].as_i64().unwrap(), 15);
    }

    #[test]
    fn closed_dispatcher_counts_drops() {
        let dispatcher = CallbackDispatcher::new(100, 100);
        dispatcher.close();
        dispatcher.dispatch(record(CallbackKind::Order, "A", 1));
        dispatcher.dispatch(record(CallbackKind::Trade, "A", 2));
        assert_eq!(dispatcher.dropped_count(), 2);
        assert!(dispatcher.recent(None, 10).is_empty());
    }

    #[tokio::test]
    async fn dropped_receiver_is_pruned_on_next_dispatch() {
        let dispatcher = CallbackDispatcher::new(100, 100);
        let sub = dispatcher.subscribe(None);
        assert_eq!(dispatcher.subscriber_count(), 1);
        drop(sub);
        dispatcher.dispatch(record(CallbackKind::Order, "A", 1));
        assert_eq!(dispatcher.subscriber_count(), 0);
    }
}
