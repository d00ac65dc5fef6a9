//! Session registry.
//!
//! One entry per connected account. While a session exists its vendor
//! handle is live and its callback registration active; the registry only
//! stores and hands out sessions, the connect/teardown choreography lives
//! in the trading service.

use crate::model::trading::AccountInfo;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use xtgate_core::{GatewayError, GatewayResult};
use xtgate_qmtlink::{StockAccount, XtTrader};

#[derive(Debug)]
pub struct Session {
    pub session_id: String,
    pub account_id: String,
    /// Vendor client handle. Only ever invoked via the blocking executor;
    /// treated as non-reentrant per handle.
    pub trader: Arc<dyn XtTrader>,
    pub account: StockAccount,
    pub connected_at: DateTime<Utc>,
    /// Last-known account summary, refreshed by asset queries.
    pub account_info: Mutex<AccountInfo>,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.lock().insert(session.session_id.clone(), session);
    }

    pub fn get(&self, session_id: &str) -> GatewayResult<Arc<Session>> {
        self.sessions
            .lock()
            .get(session_id)
            .cloned()
            .ok_or_else(|| GatewayError::SessionNotFound(session_id.to_string()))
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().remove(session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.lock().contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Drains every session, for shutdown teardown.
    pub fn drain(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().drain().map(|(_, s)| s).collect()
    }
}
