//! Layered gateway configuration.
//!
//! One YAML file holds the shared settings plus a `modes:` table with one
//! overlay per operational mode; `APP_MODE` selects both the [`Mode`] and
//! the overlay applied on top of the shared values. A missing file yields
//! the defaults, a malformed file is a fatal startup error.

use crate::mode::Mode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "XTGATE_CONFIG";
/// Default configuration file consulted when [`CONFIG_ENV_VAR`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed reading config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed parsing config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub app: AppConfig,
    pub logging: LoggingConfig,
    pub vendor: VendorConfig,
    pub subscription: SubscriptionConfig,
    pub security: SecurityConfig,
    pub timeouts: TimeoutConfig,
    pub rpc: RpcConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { name: "xtgate".into(), host: "0.0.0.0".into(), port: 8000 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into(), json: false }
    }
}

/// Vendor-core attachment settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VendorConfig {
    /// `userdata_mini` directory the QMT client constructor requires.
    pub qmt_userdata_path: Option<PathBuf>,
    /// Worker threads executing blocking vendor calls.
    pub executor_workers: usize,
    /// Tick cadence of the simulated connector.
    pub sim_tick_interval_ms: u64,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self { qmt_userdata_path: None, executor_workers: 50, sim_tick_interval_ms: 500 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Capacity of every per-stream and per-subscriber ring.
    pub max_queue_size: usize,
    /// Live quote subscriptions per process.
    pub max_subscriptions: usize,
    /// Attached client streams per subscription.
    pub max_streams_per_sub: usize,
    pub heartbeat_interval_secs: u64,
    pub heartbeat_timeout_secs: u64,
    /// Whether whole-market subscriptions may be registered at all.
    pub whole_quote_enabled: bool,
    /// Trading-callback records retained for late joiners.
    pub callback_history: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            max_subscriptions: 100,
            max_streams_per_sub: 32,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 60,
            whole_quote_enabled: false,
            callback_history: 100,
        }
    }
}

impl SubscriptionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Bearer-key allow-list. Empty disables authentication.
    pub api_keys: Vec<String>,
}

/// Per-operation-family deadlines, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub default: f64,
    pub market_data: f64,
    pub financial_data: f64,
    pub download: f64,
    pub trading: f64,
    pub subscription: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default: 30.0,
            market_data: 60.0,
            financial_data: 60.0,
            download: 300.0,
            trading: 30.0,
            subscription: 60.0,
        }
    }
}

/// Which deadline a handler family runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutFamily {
    Default,
    MarketData,
    FinancialData,
    Download,
    Trading,
    Subscription,
}

impl TimeoutConfig {
    pub fn duration(&self, family: TimeoutFamily) -> Duration {
        let secs = match family {
            TimeoutFamily::Default => self.default,
            TimeoutFamily::MarketData => self.market_data,
            TimeoutFamily::FinancialData => self.financial_data,
            TimeoutFamily::Download => self.download,
            TimeoutFamily::Trading => self.trading,
            TimeoutFamily::Subscription => self.subscription,
        };
        Duration::from_secs_f64(secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self { enabled: true, host: "0.0.0.0".into(), port: 50051 }
    }
}

/// Per-mode overrides applied on top of the shared settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModeOverlay {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub api_keys: Option<Vec<String>>,
    pub qmt_userdata_path: Option<PathBuf>,
    pub whole_quote_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ModesSection {
    #[serde(default)]
    modes: HashMap<String, ModeOverlay>,
}

impl Settings {
    /// Loads settings for `mode` from `path`, falling back to the
    /// [`CONFIG_ENV_VAR`] / [`DEFAULT_CONFIG_FILE`] lookup when `path` is
    /// `None`. A missing file is not an error.
    pub fn load(path: Option<&Path>, mode: Mode) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var(CONFIG_ENV_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE)),
        };
        if !path.exists() {
            return Ok(Settings::default());
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
        Self::from_yaml(&raw, mode).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Parses the shared settings and applies the overlay for `mode`.
    pub fn from_yaml(raw: &str, mode: Mode) -> Result<Self, serde_yaml::Error> {
        let mut settings: Settings = serde_yaml::from_str(raw)?;
        let sections: ModesSection = serde_yaml::from_str(raw)?;
        if let Some(overlay) = sections.modes.get(mode.as_str()) {
            settings.apply(overlay);
        }
        Ok(settings)
    }

    fn apply(&mut self, overlay: &ModeOverlay) {
        if let Some(host) = &overlay.host {
            self.app.host = host.clone();
        }
        if let Some(port) = overlay.port {
            self.app.port = port;
        }
        if let Some(level) = &overlay.log_level {
            self.logging.level = level.clone();
        }
        if let Some(keys) = &overlay.api_keys {
            self.security.api_keys = keys.clone();
        }
        if let Some(path) = &overlay.qmt_userdata_path {
            self.vendor.qmt_userdata_path = Some(path.clone());
        }
        if let Some(enabled) = overlay.whole_quote_enabled {
            self.subscription.whole_quote_enabled = enabled;
        }
    }

    /// Whether bearer-key authentication is active.
    pub fn auth_enabled(&self) -> bool {
        !self.security.api_keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
app:
  name: xtgate
  port: 8000
timeouts:
  market_data: 45
subscription:
  max_queue_size: 500
modes:
  sim:
    port: 8001
  live_rw:
    port: 9000
    api_keys: ["k1", "k2"]
    whole_quote_enabled: true
    qmt_userdata_path: "C:/qmt/userdata_mini"
"#;

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.vendor.executor_workers, 50);
        assert_eq!(s.subscription.max_queue_size, 1000);
        assert_eq!(s.subscription.callback_history, 100);
        assert_eq!(s.subscription.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(s.timeouts.duration(TimeoutFamily::Download), Duration::from_secs(300));
        assert!(!s.subscription.whole_quote_enabled);
        assert!(!s.auth_enabled());
    }

    #[test]
    fn mode_overlay_is_applied() {
        let sim = Settings::from_yaml(SAMPLE, Mode::Sim).unwrap();
        assert_eq!(sim.app.port, 8001);
        assert!(!sim.auth_enabled());

        let rw = Settings::from_yaml(SAMPLE, Mode::LiveRw).unwrap();
        assert_eq!(rw.app.port, 9000);
        assert_eq!(rw.security.api_keys, vec!["k1".to_string(), "k2".to_string()]);
        assert!(rw.subscription.whole_quote_enabled);
        assert!(rw.vendor.qmt_userdata_path.is_some());
    }

    #[test]
    fn shared_values_survive_overlay() {
        let rw = Settings::from_yaml(SAMPLE, Mode::LiveRw).unwrap();
        assert_eq!(rw.timeouts.market_data, 45.0);
        assert_eq!(rw.subscription.max_queue_size, 500);
        assert_eq!(rw.app.name, "xtgate");
    }

    #[test]
    fn unknown_mode_section_is_ignored() {
        let ro = Settings::from_yaml(SAMPLE, Mode::LiveRo).unwrap();
        assert_eq!(ro.app.port, 8000);
    }
}
