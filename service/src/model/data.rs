//! Market/reference-data DTOs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Candle period accepted by the market-data endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum Period {
    #[serde(rename = "tick")]
    Tick,
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[default]
    #[serde(rename = "1d")]
    Day,
    #[serde(rename = "1w")]
    Week,
    #[serde(rename = "1mon")]
    Month,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Tick => "tick",
            Period::Min1 => "1m",
            Period::Min5 => "5m",
            Period::Min15 => "15m",
            Period::Min30 => "30m",
            Period::Hour1 => "1h",
            Period::Day => "1d",
            Period::Week => "1w",
            Period::Month => "1mon",
        }
    }

    pub fn all() -> Vec<&'static str> {
        vec!["tick", "1m", "5m", "15m", "30m", "1h", "1d", "1w", "1mon"]
    }
}

/// Dividend adjustment applied to candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdjustType {
    #[default]
    None,
    Front,
    Back,
}

impl AdjustType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustType::None => "none",
            AdjustType::Front => "front",
            AdjustType::Back => "back",
        }
    }
}

/// One transposed table row: `time` plus the widened field values.
pub type Row = serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketDataRequest {
    pub stock_codes: Vec<String>,
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub adjust_type: Option<AdjustType>,
    #[serde(default = "default_true")]
    pub fill_data: bool,
    /// Skip the vendor download step and read the local store only.
    #[serde(default)]
    pub disable_download: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketDataResponse {
    pub stock_code: String,
    pub data: Vec<Row>,
    pub fields: Vec<String>,
    pub period: String,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FinancialDataRequest {
    pub stock_codes: Vec<String>,
    pub table_list: Vec<String>,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub disable_download: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FinancialDataResponse {
    pub stock_code: String,
    pub tables: HashMap<String, Vec<Row>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SectorRequest {
    pub sector_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SectorResponse {
    pub sector_name: String,
    pub stock_list: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateSectorRequest {
    #[serde(default)]
    pub parent_node: String,
    pub sector_name: String,
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SectorStocksRequest {
    pub sector_name: String,
    pub stock_list: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexWeightRequest {
    pub index_code: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexWeightEntry {
    pub stock_code: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexWeightResponse {
    pub index_code: String,
    pub weights: Vec<IndexWeightEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradingCalendarResponse {
    pub year: i32,
    pub trading_days: Vec<String>,
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstrumentInfo {
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

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstrumentTypeInfo {
    pub stock_code: String,
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HolidayInfo {
    pub holidays: Vec<String>,
}

/// Plain symbol-batch request (full tick, level-2 endpoints).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CodesRequest {
    pub stock_codes: Vec<String>,
}

/// Historical tick query: candles at tick resolution.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TickDataRequest {
    pub stock_codes: Vec<String>,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FullKlineRequest {
    pub stock_codes: Vec<String>,
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DividFactorsRequest {
    pub stock_code: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadHistoryRequest {
    pub stock_code: String,
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadHistoryBatchRequest {
    pub stock_codes: Vec<String>,
    #[serde(default)]
    pub period: Period,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadFinancialRequest {
    pub stock_codes: Vec<String>,
    #[serde(default)]
    pub table_list: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadIndexWeightRequest {
    pub index_codes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PeriodListResponse {
    pub periods: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataDirResponse {
    pub data_dir: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_wire_names() {
        assert_eq!(serde_json::to_string(&Period::Day).unwrap(), "\"1d\"");
        assert_eq!(serde_json::from_str::<Period>("\"1mon\"").unwrap(), Period::Month);
        for p in Period::all() {
            assert!(serde_json::from_str::<Period>(&format!("\"{p}\"")).is_ok(), "{p}");
        }
    }

    #[test]
    fn market_request_defaults() {
        let req: MarketDataRequest =
            serde_json::from_str(r#"{"stock_codes":["000001.SZ"]}"#).unwrap();
        assert_eq!(req.period, Period::Day);
        assert!(req.fill_data);
        assert!(!req.disable_download);
        assert!(req.fields.is_none());
    }
}
