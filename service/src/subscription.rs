//! Quote-subscription multiplexer.
//!
//! One vendor-side registration per gateway subscription; incoming ticks
//! are fanned out to every attached client stream through a bounded
//! broadcast ring. The vendor tick thread only stamps activity and sends:
//! a full ring overwrites its oldest entry, so a slow stream loses old
//! ticks (counted) while fast streams are untouched. Ticks are
//! live-forward only; a new attacher starts from the next tick.

use crate::executor::BlockingExecutor;
use crate::model::data::{AdjustType, Period};
use crate::symbol;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;
use xtgate_core::config::{SubscriptionConfig, TimeoutConfig, TimeoutFamily};
use xtgate_core::{GatewayError, GatewayResult, Mode};
use xtgate_qmtlink::{QuoteTick, TickSink, XtData};

use crate::map_xt_err;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionKind {
    #[default]
    PerSymbol,
    WholeMarket,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionRequest {
    #[serde(default)]
    pub stock_codes: Vec<String>,
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub adjust_type: Option<AdjustType>,
    #[serde(default)]
    pub kind: SubscriptionKind,
    /// Whole-market only: markets to cover, e.g. `["SH", "SZ"]`.
    #[serde(default)]
    pub markets: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionInfo {
    pub subscription_id: String,
    pub kind: SubscriptionKind,
    pub stock_codes: Vec<String>,
    pub period: String,
    pub adjust_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubscriptionStatus {
    #[serde(flatten)]
    pub info: SubscriptionInfo,
    pub attached_streams: usize,
    pub total_ticks: u64,
    pub dropped_ticks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

struct SubEntry {
    info: SubscriptionInfo,
    vendor_id: i64,
    tx: broadcast::Sender<Arc<QuoteTick>>,
    /// Epoch milliseconds of the latest tick; 0 = never.
    last_activity: Arc<AtomicI64>,
    total_ticks: Arc<AtomicU64>,
    dropped_ticks: Arc<AtomicU64>,
}

/// What a stream read produced.
#[derive(Debug)]
pub enum StreamEvent {
    Tick(Arc<QuoteTick>),
    /// The ring overwrote `n` ticks this reader never saw.
    Lagged(u64),
    /// The subscription was removed; the stream is over.
    Closed,
}

/// Reader half of one attached client stream.
#[derive(Debug)]
pub struct QuoteStream {
    pub subscription_id: String,
    rx: broadcast::Receiver<Arc<QuoteTick>>,
    dropped: Arc<AtomicU64>,
}

impl QuoteStream {
    pub async fn next(&mut self) -> StreamEvent {
        match self.rx.recv().await {
            Ok(tick) => StreamEvent::Tick(tick),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                self.dropped.fetch_add(n, Ordering::Relaxed);
                debug!(subscription_id = %self.subscription_id, lagged = n, "slow stream dropped ticks");
                StreamEvent::Lagged(n)
            }
            Err(broadcast::error::RecvError::Closed) => StreamEvent::Closed,
        }
    }
}

pub struct SubscriptionManager {
    data: Arc<dyn XtData>,
    mode: Mode,
    config: SubscriptionConfig,
    timeouts: TimeoutConfig,
    executor: BlockingExecutor,
    subs: Mutex<HashMap<String, SubEntry>>,
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("subscriptions", &self.subs.lock().len())
            .finish()
    }
}

impl SubscriptionManager {
    pub fn new(
        data: Arc<dyn XtData>,
        mode: Mode,
        config: SubscriptionConfig,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            data,
            mode,
            config,
            timeouts,
            executor: BlockingExecutor::new(),
            subs: Mutex::new(HashMap::new()),
        }
    }

    fn deadline(&self) -> std::time::Duration {
        self.timeouts.duration(TimeoutFamily::Subscription)
    }

    /// Creates a subscription and registers it with the vendor exactly
    /// once. Whole-market registration is refused unless enabled by
    /// configuration.
    pub async fn subscribe(&self, request: SubscriptionRequest) -> GatewayResult<SubscriptionInfo> {
        match request.kind {
            SubscriptionKind::PerSymbol => symbol::validate_stock_codes(&request.stock_codes)?,
            SubscriptionKind::WholeMarket => {
                if !self.config.whole_quote_enabled {
                    return Err(GatewayError::ModeRefused {
                        op: "subscribe_whole_quote",
                        mode: self.mode.as_str(),
                    });
                }
                if request.markets.is_empty() {
                    return Err(GatewayError::InvalidArgument(
                        "markets must not be empty for whole-market subscriptions".into(),
                    ));
                }
            }
        }
        if self.subs.lock().len() >= self.config.max_subscriptions {
            return Err(GatewayError::InvalidArgument(format!(
                "subscription limit reached ({})",
                self.config.max_subscriptions
            )));
        }

        let subscription_id = format!("sub_{}", Uuid::new_v4().simple());
        let (tx, _) = broadcast::channel(self.config.max_queue_size);
        let last_activity = Arc::new(AtomicI64::new(0));
        let total_ticks = Arc::new(AtomicU64::new(0));

        // The sink is the only code the vendor tick thread runs: stamp
        // activity, count, send into the ring. Never blocks.
        let sink: TickSink = {
            let tx = tx.clone();
            let last_activity = Arc::clone(&last_activity);
            let total_ticks = Arc::clone(&total_ticks);
            Arc::new(move |tick: QuoteTick| {
                last_activity.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
                total_ticks.fetch_add(1, Ordering::Relaxed);
                let _ = tx.send(Arc::new(tick));
            })
        };

        let data = Arc::clone(&self.data);
        let req = request.clone();
        let period = request.period.as_str().to_string();
        let vendor_id = self
            .executor
            .run("subscribe_quote", self.deadline(), move || {
                let result = match req.kind {
                    SubscriptionKind::PerSymbol => data.subscribe_quote(
                        &req.stock_codes,
                        &period,
                        req.adjust_type.unwrap_or_default().as_str(),
                        sink,
                    ),
                    SubscriptionKind::WholeMarket => {
                        data.subscribe_whole_quote(&req.markets, sink)
                    }
                };
                result.map_err(map_xt_err)
            })
            .await?;

        let info = SubscriptionInfo {
            subscription_id: subscription_id.clone(),
            kind: request.kind,
            stock_codes: match request.kind {
                SubscriptionKind::PerSymbol => request.stock_codes,
                SubscriptionKind::WholeMarket => request.markets,
            },
            period: request.period.as_str().into(),
            adjust_type: request.adjust_type.unwrap_or_default().as_str().into(),
            created_at: Utc::now(),
        };
        self.subs.lock().insert(
            subscription_id.clone(),
            SubEntry {
                info: info.clone(),
                vendor_id,
                tx,
                last_activity,
                total_ticks,
                dropped_ticks: Arc::new(AtomicU64::new(0)),
            },
        );
        info!(subscription_id, kind = ?info.kind, vendor_id, "subscription registered");
        Ok(info)
    }

    /// Removes a subscription, unregisters at the vendor and terminates
    /// every attached stream. `Ok(false)` when the identifier is unknown.
    pub async fn unsubscribe(&self, subscription_id: &str) -> GatewayResult<bool> {
        let entry = match self.subs.lock().remove(subscription_id) {
            Some(entry) => entry,
            None => return Ok(false),
        };
        let data = Arc::clone(&self.data);
        let vendor_id = entry.vendor_id;
        self.executor
            .run("unsubscribe_quote", self.deadline(), move || {
                data.unsubscribe_quote(vendor_id);
                Ok(())
            })
            .await?;
        info!(subscription_id, vendor_id, "subscription removed");
        // Dropping `entry.tx` here closes every attached stream.
        Ok(true)
    }

    /// Attaches a client stream. Streams receive ticks from now on; the
    /// backlog accumulated before attach is not replayed.
    pub fn attach(&self, subscription_id: &str) -> GatewayResult<QuoteStream> {
        let subs = self.subs.lock();
        let entry = subs
            .get(subscription_id)
            .ok_or_else(|| GatewayError::InvalidArgument(format!(
                "subscription not found: {subscription_id}"
            )))?;
        if entry.tx.receiver_count() >= self.config.max_streams_per_sub {
            return Err(GatewayError::InvalidArgument(format!(
                "stream limit reached for subscription {subscription_id} ({})",
                self.config.max_streams_per_sub
            )));
        }
        Ok(QuoteStream {
            subscription_id: subscription_id.to_string(),
            rx: entry.tx.subscribe(),
            dropped: Arc::clone(&entry.dropped_ticks),
        })
    }

    pub fn get(&self, subscription_id: &str) -> Option<SubscriptionStatus> {
        self.subs.lock().get(subscription_id).map(Self::status_of)
    }

    pub fn list(&self) -> Vec<SubscriptionStatus> {
        let mut all: Vec<SubscriptionStatus> =
            self.subs.lock().values().map(Self::status_of).collect();
        all.sort_by(|a, b| a.info.created_at.cmp(&b.info.created_at));
        all
    }

    fn status_of(entry: &SubEntry) -> SubscriptionStatus {
        let ms = entry.last_activity.load(Ordering::Relaxed);
        SubscriptionStatus {
            info: entry.info.clone(),
            attached_streams: entry.tx.receiver_count(),
            total_ticks: entry.total_ticks.load(Ordering::Relaxed),
            dropped_ticks: entry.dropped_ticks.load(Ordering::Relaxed),
            last_activity: (ms > 0).then(|| DateTime::from_timestamp_millis(ms)).flatten(),
        }
    }

    pub fn len(&self) -> usize {
        self.subs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.lock().is_empty()
    }

    /// Vendor-side unregistration of everything, for shutdown.
    pub fn shutdown(&self) {
        let entries: Vec<SubEntry> =
            self.subs.lock().drain().map(|(_, entry)| entry).collect();
        for entry in entries {
            self.data.unsubscribe_quote(entry.vendor_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use xtgate_qmtlink::SimData;

    fn manager(config: SubscriptionConfig) -> (Arc<SimData>, SubscriptionManager) {
        // Zero interval: ticks only flow when the test pushes them.
        let data = Arc::new(SimData::new(Duration::ZERO));
        let manager = SubscriptionManager::new(
            Arc::clone(&data) as Arc<dyn XtData>,
            Mode::Sim,
            config,
            TimeoutConfig::default(),
        );
        (data, manager)
    }

    fn per_symbol_request(codes: &[&str]) -> SubscriptionRequest {
        SubscriptionRequest {
            stock_codes: codes.iter().map(|c| c.to_string()).collect(),
            period: Period::Tick,
            adjust_type: None,
            kind: SubscriptionKind::PerSymbol,
            markets: Vec::new(),
        }
    }

    fn tick(code: &str, n: i64) -> QuoteTick {
        QuoteTick { stock_code: code.into(), time: n, last_price: 10.0, ..Default::default() }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn identifiers_are_unique_and_registrations_match() {
        let (data, manager) = manager(SubscriptionConfig::default());
        let a = manager.subscribe(per_symbol_request(&["000001.SZ"])).await.unwrap();
        let b = manager.subscribe(per_symbol_request(&["000002.SZ"])).await.unwrap();
        assert_ne!(a.subscription_id, b.subscription_id);
        // One vendor registration per live subscription.
        assert_eq!(data.quote_registration_count(), 2);
        assert_eq!(manager.len(), 2);

        assert!(manager.unsubscribe(&a.subscription_id).await.unwrap());
        assert_eq!(data.quote_registration_count(), 1);
        assert_eq!(manager.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unsubscribe_round_trip_restores_registry() {
        let (_, manager) = manager(SubscriptionConfig::default());
        assert_eq!(manager.len(), 0);
        let info = manager.subscribe(per_symbol_request(&["000001.SZ"])).await.unwrap();
        assert_eq!(manager.len(), 1);
        assert!(manager.unsubscribe(&info.subscription_id).await.unwrap());
        assert_eq!(manager.len(), 0);
        assert!(!manager.unsubscribe(&info.subscription_id).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn whole_market_refused_when_disabled() {
        let (_, manager) = manager(SubscriptionConfig::default());
        let err = manager
            .subscribe(SubscriptionRequest {
                stock_codes: Vec::new(),
                period: Period::Tick,
                adjust_type: None,
                kind: SubscriptionKind::WholeMarket,
                markets: vec!["SH".into()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ModeRefused { op: "subscribe_whole_quote", .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn whole_market_allowed_when_enabled() {
        let config = SubscriptionConfig { whole_quote_enabled: true, ..Default::default() };
        let (data, manager) = manager(config);
        let info = manager
            .subscribe(SubscriptionRequest {
                stock_codes: Vec::new(),
                period: Period::Tick,
                adjust_type: None,
                kind: SubscriptionKind::WholeMarket,
                markets: vec!["SH".into(), "SZ".into()],
            })
            .await
            .unwrap();
        assert_eq!(info.kind, SubscriptionKind::WholeMarket);
        assert_eq!(data.quote_registration_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ticks_flow_to_attached_streams() {
        let (data, manager) = manager(SubscriptionConfig::default());
        let info = manager.subscribe(per_symbol_request(&["000001.SZ"])).await.unwrap();
        let mut stream = manager.attach(&info.subscription_id).unwrap();
        data.push_tick(1, tick("000001.SZ", 1));
        match stream.next().await {
            StreamEvent::Tick(t) => assert_eq!(t.stock_code, "000001.SZ"),
            other => panic!("expected tick, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_stream_drops_oldest_and_counts() {
        // Power-of-two capacity keeps the ring arithmetic exact.
        let config = SubscriptionConfig { max_queue_size: 1024, ..Default::default() };
        let (data, manager) = manager(config);
        let info = manager.subscribe(per_symbol_request(&["000001.SZ"])).await.unwrap();
        let mut stream = manager.attach(&info.subscription_id).unwrap();

        // A consumer that never reads while 2048 ticks arrive.
        for n in 0..2048 {
            data.push_tick(1, tick("000001.SZ", n));
        }

        // The first read reports the overwritten backlog.
        match stream.next().await {
            StreamEvent::Lagged(n) => assert!(n >= 1000, "lagged {n}"),
            other => panic!("expected lag, got {other:?}"),
        }
        let status = manager.get(&info.subscription_id).unwrap();
        assert_eq!(status.total_ticks, 2048);
        assert!(status.dropped_ticks >= 1000);

        // At most the ring capacity remains readable.
        let mut remaining = 0;
        loop {
            match tokio::time::timeout(Duration::from_millis(50), stream.next()).await {
                Ok(StreamEvent::Tick(_)) => remaining += 1,
                _ => break,
            }
        }
        assert!(remaining <= 1024, "remaining {remaining}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fast_stream_unaffected_by_slow_sibling() {
        let config = SubscriptionConfig { max_queue_size: 16, ..Default::default() };
        let (data, manager) = manager(config);
        let info = manager.subscribe(per_symbol_request(&["000001.SZ"])).await.unwrap();
        let _slow = manager.attach(&info.subscription_id).unwrap();
        let mut fast = manager.attach(&info.subscription_id).unwrap();

        for n in 0..200 {
            data.push_tick(1, tick("000001.SZ", n));
            // The fast reader keeps up tick for tick.
            match fast.next().await {
                StreamEvent::Tick(t) => assert_eq!(t.time, n),
                other => panic!("fast stream disturbed at {n}: {other:?}"),
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unsubscribe_terminates_attached_streams() {
        let (_, manager) = manager(SubscriptionConfig::default());
        let info = manager.subscribe(per_symbol_request(&["000001.SZ"])).await.unwrap();
        let mut stream = manager.attach(&info.subscription_id).unwrap();
        assert!(manager.unsubscribe(&info.subscription_id).await.unwrap());
        assert!(matches!(stream.next().await, StreamEvent::Closed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn attach_respects_stream_limit() {
        let config = SubscriptionConfig { max_streams_per_sub: 2, ..Default::default() };
        let (_, manager) = manager(config);
        let info = manager.subscribe(per_symbol_request(&["000001.SZ"])).await.unwrap();
        let _a = manager.attach(&info.subscription_id).unwrap();
        let _b = manager.attach(&info.subscription_id).unwrap();
        assert!(manager.attach(&info.subscription_id).is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn detach_frees_a_stream_slot() {
        let config = SubscriptionConfig { max_streams_per_sub: 1, ..Default::default() };
        let (_, manager) = manager(config);
        let info = manager.subscribe(per_symbol_request(&["000001.SZ"])).await.unwrap();
        let stream = manager.attach(&info.subscription_id).unwrap();
        assert!(manager.attach(&info.subscription_id).is_err());
        drop(stream);
        assert!(manager.attach(&info.subscription_id).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn subscription_limit_is_enforced() {
        let config = SubscriptionConfig { max_subscriptions: 1, ..Default::default() };
        let (_, manager) = manager(config);
        manager.subscribe(per_symbol_request(&["000001.SZ"])).await.unwrap();
        let err = manager.subscribe(per_symbol_request(&["000002.SZ"])).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn invalid_codes_never_reach_the_vendor() {
        let (data, manager) = manager(SubscriptionConfig::default());
        let err = manager.subscribe(per_symbol_request(&["bogus"])).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
        assert_eq!(data.quote_registration_count(), 0);
    }
}
