//! Market/reference-data service.
//!
//! Point queries make one executor round-trip under their family deadline.
//! Range queries trigger the vendor download primitive first (unless the
//! caller disables it) under the download budget, then the retrieval
//! primitive under the market-data budget. Tabular vendor payloads are
//! transposed into per-row records with floats widened to `f64` and
//! booleans/counts widened to `i64`. Batch reads fail whole on the first
//! sub-failure; callers retry the failing subset themselves.

use crate::executor::BlockingExecutor;
use crate::map_xt_err;
use crate::model::data::*;
use crate::symbol;
use itertools::Itertools;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use xtgate_core::config::{TimeoutConfig, TimeoutFamily};
use xtgate_core::GatewayResult;
use xtgate_qmtlink::{Cell, FieldTable, QuoteTick, XtData};

pub struct DataService {
    data: Arc<dyn XtData>,
    executor: BlockingExecutor,
    timeouts: TimeoutConfig,
    data_dir: Option<String>,
}

impl fmt::Debug for DataService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataService").field("data_dir", &self.data_dir).finish()
    }
}

/// Widens one vendor cell for the wire: floats to `f64`, booleans and
/// counts to `i64`.
fn widen(cell: &Cell) -> Value {
    match cell {
        Cell::F64(v) => json!(v),
        Cell::I64(v) => json!(v),
        Cell::Bool(v) => json!(i64::from(*v)),
        Cell::Str(v) => json!(v),
        Cell::Null => Value::Null,
    }
}

/// Transposes a field-major vendor table into per-row records keyed by
/// field name, one record per timestamp.
pub fn transpose(table: &FieldTable) -> Vec<Row> {
    table
        .index
        .iter()
        .enumerate()
        .map(|(row, timestamp)| {
            let mut record = serde_json::Map::with_capacity(table.fields.len() + 1);
            record.insert("time".into(), json!(timestamp));
            for (col, field) in table.fields.iter().enumerate() {
                let cell =
                    table.values.get(col).and_then(|values| values.get(row)).unwrap_or(&Cell::Null);
                record.insert(field.clone(), widen(cell));
            }
            Value::Object(record)
        })
        .collect()
}

impl DataService {
    pub fn new(data: Arc<dyn XtData>, timeouts: TimeoutConfig, data_dir: Option<String>) -> Self {
        Self { data, executor: BlockingExecutor::new(), timeouts, data_dir }
    }

    fn deadline(&self, family: TimeoutFamily) -> std::time::Duration {
        self.timeouts.duration(family)
    }

    // ------------------------------------------------------------------
    // Range queries
    // ------------------------------------------------------------------

    pub async fn get_market_data(
        &self,
        request: MarketDataRequest,
    ) -> GatewayResult<Vec<MarketDataResponse>> {
        symbol::validate_stock_codes(&request.stock_codes)?;
        let fields = request
            .fields
            .clone()
            .unwrap_or_else(|| {
                ["open", "high", "low", "close", "volume", "amount"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            });
        let mut responses = Vec::with_capacity(request.stock_codes.len());
        for stock_code in &request.stock_codes {
            if !request.disable_download {
                let data = Arc::clone(&self.data);
                let code = stock_code.clone();
                let period = request.period.as_str();
                let (start, end) = (request.start_date.clone(), request.end_date.clone());
                self.executor
                    .run("download_history_data", self.deadline(TimeoutFamily::Download), move || {
                        data.download_history_data(&code, period, &start, &end).map_err(map_xt_err)
                    })
                    .await?;
            }
            let data = Arc::clone(&self.data);
            let code = stock_code.clone();
            let query_fields = fields.clone();
            let period = request.period.as_str();
            let (start, end) = (request.start_date.clone(), request.end_date.clone());
            let adjust = request.adjust_type.unwrap_or_default().as_str();
            let fill = request.fill_data;
            let tables = self
                .executor
                .run("get_market_data", self.deadline(TimeoutFamily::MarketData), move || {
                    data.get_market_data(
                        &query_fields,
                        &[code.clone()],
                        period,
                        &start,
                        &end,
                        adjust,
                        fill,
                    )
                    .map_err(map_xt_err)
                })
                .await?;
            let rows = tables.get(stock_code).map(transpose).unwrap_or_default();
            responses.push(MarketDataResponse {
                stock_code: stock_code.clone(),
                data: rows,
                fields: fields.clone(),
                period: request.period.as_str().into(),
                start_date: request.start_date.clone(),
                end_date: request.end_date.clone(),
            });
        }
        Ok(responses)
    }

    pub async fn get_financial_data(
        &self,
        request: FinancialDataRequest,
    ) -> GatewayResult<Vec<FinancialDataResponse>> {
        symbol::validate_stock_codes(&request.stock_codes)?;
        if !request.disable_download {
            let data = Arc::clone(&self.data);
            let codes = request.stock_codes.clone();
            let tables = request.table_list.clone();
            self.executor
                .run("download_financial_data", self.deadline(TimeoutFamily::Download), move || {
                    data.download_financial_data(&codes, &tables).map_err(map_xt_err)
                })
                .await?;
        }
        let data = Arc::clone(&self.data);
        let codes = request.stock_codes.clone();
        let table_list = request.table_list.clone();
        let (start, end) = (request.start_date.clone(), request.end_date.clone());
        let raw = self
            .executor
            .run("get_financial_data", self.deadline(TimeoutFamily::FinancialData), move || {
                data.get_financial_data(&codes, &table_list, &start, &end).map_err(map_xt_err)
            })
            .await?;
        Ok(request
            .stock_codes
            .iter()
            .map(|code| FinancialDataResponse {
                stock_code: code.clone(),
                tables: raw
                    .get(code)
                    .map(|per_table| {
                        per_table.iter().map(|(name, t)| (name.clone(), transpose(t))).collect()
                    })
                    .unwrap_or_default(),
            })
            .collect())
    }

    pub async fn get_tick_data(
        &self,
        request: TickDataRequest,
    ) -> GatewayResult<Vec<MarketDataResponse>> {
        self.get_market_data(MarketDataRequest {
            stock_codes: request.stock_codes,
            period: Period::Tick,
            start_date: request.start_date,
            end_date: request.end_date,
            fields: None,
            adjust_type: None,
            fill_data: false,
            disable_download: false,
        })
        .await
    }

    pub async fn get_full_kline(
        &self,
        request: FullKlineRequest,
    ) -> GatewayResult<Vec<MarketDataResponse>> {
        // Local-store read: no download step.
        self.get_market_data(MarketDataRequest {
            stock_codes: request.stock_codes,
            period: request.period,
            start_date: request.start_date,
            end_date: request.end_date,
            fields: None,
            adjust_type: None,
            fill_data: true,
            disable_download: true,
        })
        .await
    }

    pub async fn get_divid_factors(
        &self,
        request: DividFactorsRequest,
    ) -> GatewayResult<Vec<Row>> {
        symbol::validate_stock_code(&request.stock_code)?;
        let data = Arc::clone(&self.data);
        let table = self
            .executor
            .run("get_divid_factors", self.deadline(TimeoutFamily::MarketData), move || {
                data.get_divid_factors(&request.stock_code, &request.start_date, &request.end_date)
                    .map_err(map_xt_err)
            })
            .await?;
        Ok(transpose(&table))
    }

    pub async fn get_full_tick(
        &self,
        request: CodesRequest,
    ) -> GatewayResult<HashMap<String, QuoteTick>> {
        symbol::validate_stock_codes(&request.stock_codes)?;
        let data = Arc::clone(&self.data);
        self.executor
            .run("get_full_tick", self.deadline(TimeoutFamily::MarketData), move || {
                data.get_full_tick(&request.stock_codes).map_err(map_xt_err)
            })
            .await
    }

    async fn l2_batch(
        &self,
        op: &'static str,
        request: CodesRequest,
        call: fn(&dyn XtData, &[String]) -> Result<HashMap<String, FieldTable>, xtgate_qmtlink::XtError>,
    ) -> GatewayResult<HashMap<String, Vec<Row>>> {
        symbol::validate_stock_codes(&request.stock_codes)?;
        let data = Arc::clone(&self.data);
        let tables = self
            .executor
            .run(op, self.deadline(TimeoutFamily::MarketData), move || {
                call(data.as_ref(), &request.stock_codes).map_err(map_xt_err)
            })
            .await?;
        Ok(tables.iter().map(|(code, table)| (code.clone(), transpose(table))).collect())
    }

    pub async fn get_l2_quote(
        &self,
        request: CodesRequest,
    ) -> GatewayResult<HashMap<String, Vec<Row>>> {
        self.l2_batch("get_l2_quote", request, |d, codes| d.get_l2_quote(codes)).await
    }

    pub async fn get_l2_order(
        &self,
        request: CodesRequest,
    ) -> GatewayResult<HashMap<String, Vec<Row>>> {
        self.l2_batch("get_l2_order", request, |d, codes| d.get_l2_order(codes)).await
    }

    pub async fn get_l2_transaction(
        &self,
        request: CodesRequest,
    ) -> GatewayResult<HashMap<String, Vec<Row>>> {
        self.l2_batch("get_l2_transaction", request, |d, codes| d.get_l2_transaction(codes)).await
    }

    // ------------------------------------------------------------------
    // Point queries
    // ------------------------------------------------------------------

    pub async fn get_sector_list(&self) -> GatewayResult<Vec<SectorResponse>> {
        let data = Arc::clone(&self.data);
        self.executor
            .run("get_sector_list", self.deadline(TimeoutFamily::Default), move || {
                let names = data.get_sector_list().map_err(map_xt_err)?;
                names
                    .into_iter()
                    .map(|sector_name| {
                        let stock_list =
                            data.get_stock_list_in_sector(&sector_name).map_err(map_xt_err)?;
                        Ok(SectorResponse { sector_name, stock_list })
                    })
                    .collect()
            })
            .await
    }

    pub async fn get_sector_stocks(&self, request: SectorRequest) -> GatewayResult<SectorResponse> {
        let data = Arc::clone(&self.data);
        self.executor
            .run("get_stock_list_in_sector", self.deadline(TimeoutFamily::Default), move || {
                let stock_list =
                    data.get_stock_list_in_sector(&request.sector_name).map_err(map_xt_err)?;
                Ok(SectorResponse { sector_name: request.sector_name, stock_list })
            })
            .await
    }

    pub async fn create_sector(&self, request: CreateSectorRequest) -> GatewayResult<()> {
        let data = Arc::clone(&self.data);
        self.executor
            .run("create_sector", self.deadline(TimeoutFamily::Default), move || {
                data.create_sector(&request.parent_node, &request.sector_name, request.overwrite)
                    .map_err(map_xt_err)
            })
            .await
    }

    pub async fn add_sector_stocks(&self, request: SectorStocksRequest) -> GatewayResult<()> {
        let data = Arc::clone(&self.data);
        self.executor
            .run("add_sector", self.deadline(TimeoutFamily::Default), move || {
                data.add_sector(&request.sector_name, &request.stock_list).map_err(map_xt_err)
            })
            .await
    }

    pub async fn remove_sector_stocks(&self, request: SectorStocksRequest) -> GatewayResult<()> {
        let data = Arc::clone(&self.data);
        self.executor
            .run("remove_stock_from_sector", self.deadline(TimeoutFamily::Default), move || {
                data.remove_stock_from_sector(&request.sector_name, &request.stock_list)
                    .map_err(map_xt_err)
            })
            .await
    }

    pub async fn remove_sector(&self, request: SectorRequest) -> GatewayResult<()> {
        let data = Arc::clone(&self.data);
        self.executor
            .run("remove_sector", self.deadline(TimeoutFamily::Default), move || {
                data.remove_sector(&request.sector_name).map_err(map_xt_err)
            })
            .await
    }

    pub async fn reset_sector(&self, request: SectorStocksRequest) -> GatewayResult<()> {
        let data = Arc::clone(&self.data);
        self.executor
            .run("reset_sector", self.deadline(TimeoutFamily::Default), move || {
                data.reset_sector(&request.sector_name, &request.stock_list).map_err(map_xt_err)
            })
            .await
    }

    pub async fn get_index_weight(
        &self,
        request: IndexWeightRequest,
    ) -> GatewayResult<IndexWeightResponse> {
        symbol::validate_stock_code(&request.index_code)?;
        let data = Arc::clone(&self.data);
        let code = request.index_code.clone();
        let weights = self
            .executor
            .run("get_index_weight", self.deadline(TimeoutFamily::Default), move || {
                data.get_index_weight(&code).map_err(map_xt_err)
            })
            .await?;
        let weights = weights
            .into_iter()
            .map(|(stock_code, weight)| IndexWeightEntry { stock_code, weight })
            .sorted_by(|a, b| b.weight.total_cmp(&a.weight))
            .collect();
        Ok(IndexWeightResponse { index_code: request.index_code, weights })
    }

    pub async fn get_trading_calendar(&self, year: i32) -> GatewayResult<TradingCalendarResponse> {
        let data = Arc::clone(&self.data);
        let trading_days = self
            .executor
            .run("get_trading_calendar", self.deadline(TimeoutFamily::Default), move || {
                data.get_trading_calendar("SH", year).map_err(map_xt_err)
            })
            .await?;
        Ok(TradingCalendarResponse { year, count: trading_days.len(), trading_days })
    }

    pub async fn get_instrument_info(&self, stock_code: &str) -> GatewayResult<InstrumentInfo> {
        symbol::validate_stock_code(stock_code)?;
        let data = Arc::clone(&self.data);
        let code = stock_code.to_string();
        let detail = self
            .executor
            .run("get_instrument_detail", self.deadline(TimeoutFamily::Default), move || {
                data.get_instrument_detail(&code).map_err(map_xt_err)
            })
            .await?;
        Ok(InstrumentInfo {
            stock_code: detail.stock_code,
            stock_name: detail.stock_name,
            exchange: detail.exchange,
            instrument_type: detail.instrument_type,
            open_date: detail.open_date,
            total_volume: detail.total_volume,
            float_volume: detail.float_volume,
            price_tick: detail.price_tick,
            is_trading: detail.is_trading,
        })
    }

    pub async fn get_instrument_type(&self, stock_code: &str) -> GatewayResult<InstrumentTypeInfo> {
        symbol::validate_stock_code(stock_code)?;
        let data = Arc::clone(&self.data);
        let code = stock_code.to_string();
        let types = self
            .executor
            .run("get_instrument_type", self.deadline(TimeoutFamily::Default), move || {
                data.get_instrument_type(&code).map_err(map_xt_err)
            })
            .await?;
        Ok(InstrumentTypeInfo { stock_code: stock_code.to_string(), types })
    }

    pub async fn get_holidays(&self) -> GatewayResult<HolidayInfo> {
        let data = Arc::clone(&self.data);
        let holidays = self
            .executor
            .run("get_holidays", self.deadline(TimeoutFamily::Default), move || {
                data.get_holidays().map_err(map_xt_err)
            })
            .await?;
        Ok(HolidayInfo { holidays })
    }

    pub fn get_period_list(&self) -> PeriodListResponse {
        PeriodListResponse { periods: Period::all().iter().map(|s| s.to_string()).collect() }
    }

    pub fn get_data_dir(&self) -> DataDirResponse {
        DataDirResponse { data_dir: self.data_dir.clone().unwrap_or_default() }
    }

    // ------------------------------------------------------------------
    // Download triggers
    // ------------------------------------------------------------------

    pub async fn download_history(
        &self,
        request: DownloadHistoryRequest,
    ) -> GatewayResult<DownloadResponse> {
        symbol::validate_stock_code(&request.stock_code)?;
        let data = Arc::clone(&self.data);
        self.executor
            .run("download_history_data", self.deadline(TimeoutFamily::Download), move || {
                data.download_history_data(
                    &request.stock_code,
                    request.period.as_str(),
                    &request.start_date,
                    &request.end_date,
                )
                .map_err(map_xt_err)
            })
            .await?;
        Ok(DownloadResponse { success: true, message: "history downloaded".into() })
    }

    pub async fn download_history_batch(
        &self,
        request: DownloadHistoryBatchRequest,
    ) -> GatewayResult<DownloadResponse> {
        symbol::validate_stock_codes(&request.stock_codes)?;
        let data = Arc::clone(&self.data);
        let count = request.stock_codes.len();
        self.executor
            .run("download_history_data_batch", self.deadline(TimeoutFamily::Download), move || {
                for code in &request.stock_codes {
                    data.download_history_data(
                        code,
                        request.period.as_str(),
                        &request.start_date,
                        &request.end_date,
                    )
                    .map_err(map_xt_err)?;
                }
                Ok(())
            })
            .await?;
        Ok(DownloadResponse {
            success: true,
            message: format!("history downloaded for {count} symbols"),
        })
    }

    pub async fn download_financial(
        &self,
        request: DownloadFinancialRequest,
    ) -> GatewayResult<DownloadResponse> {
        symbol::validate_stock_codes(&request.stock_codes)?;
        let data = Arc::clone(&self.data);
        self.executor
            .run("download_financial_data", self.deadline(TimeoutFamily::Download), move || {
                data.download_financial_data(&request.stock_codes, &request.table_list)
                    .map_err(map_xt_err)
            })
            .await?;
        Ok(DownloadResponse { success: true, message: "financial tables downloaded".into() })
    }

    pub async fn download_sector(&self) -> GatewayResult<DownloadResponse> {
        let data = Arc::clone(&self.data);
        self.executor
            .run("download_sector_data", self.deadline(TimeoutFamily::Download), move || {
                data.download_sector_data().map_err(map_xt_err)
            })
            .await?;
        Ok(DownloadResponse { success: true, message: "sector data downloaded".into() })
    }

    pub async fn download_index_weight(
        &self,
        request: DownloadIndexWeightRequest,
    ) -> GatewayResult<DownloadResponse> {
        symbol::validate_stock_codes(&request.index_codes)?;
        let data = Arc::clone(&self.data);
        self.executor
            .run("download_index_weight", self.deadline(TimeoutFamily::Download), move || {
                data.download_index_weight(&request.index_codes).map_err(map_xt_err)
            })
            .await?;
        Ok(DownloadResponse { success: true, message: "index weights downloaded".into() })
    }

    pub async fn download_holiday(&self) -> GatewayResult<DownloadResponse> {
        let data = Arc::clone(&self.data);
        self.executor
            .run("download_holiday_data", self.deadline(TimeoutFamily::Download), move || {
                data.download_holiday_data().map_err(map_xt_err)
            })
            .await?;
        Ok(DownloadResponse { success: true, message: "holiday data downloaded".into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use xtgate_qmtlink::SimData;

    fn service() -> DataService {
        DataService::new(
            Arc::new(SimData::new(Duration::ZERO)),
            TimeoutConfig::default(),
            Some("/qmt/userdata_mini/datadir".into()),
        )
    }

    #[test]
    fn widening_table() {
        assert_eq!(widen(&Cell::F64(1.5)), json!(1.5));
        assert_eq!(widen(&Cell::I64(7)), json!(7));
        assert_eq!(widen(&Cell::Bool(true)), json!(1));
        assert_eq!(widen(&Cell::Bool(false)), json!(0));
        assert_eq!(widen(&Cell::Str("x".into())), json!("x"));
        assert_eq!(widen(&Cell::Null), Value::Null);
    }

    #[test]
    fn transpose_turns_columns_into_rows() {
        let table = FieldTable {
            fields: vec!["close".into(), "volume".into(), "suspended".into()],
            index: vec![100, 200],
            values: vec![
                vec![Cell::F64(10.0), Cell::F64(10.5)],
                vec![Cell::I64(1000), Cell::I64(2000)],
                vec![Cell::Bool(false), Cell::Bool(true)],
            ],
        };
        let rows = transpose(&table);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["time"], json!(100));
        assert_eq!(rows[0]["close"], json!(10.0));
        assert_eq!(rows[1]["volume"], json!(2000));
        assert_eq!(rows[1]["suspended"], json!(1));
    }

    #[test]
    fn transpose_pads_ragged_tables_with_null() {
        let table = FieldTable {
            fields: vec!["close".into()],
            index: vec![1, 2, 3],
            values: vec![vec![Cell::F64(1.0)]],
        };
        let rows = transpose(&table);
        assert_eq!(rows[2]["close"], Value::Null);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn market_data_returns_rows_per_symbol() {
        let responses = service()
            .get_market_data(MarketDataRequest {
                stock_codes: vec!["000001.SZ".into(), "600036.SH".into()],
                period: Period::Day,
                start_date: "20250101".into(),
                end_date: "20250201".into(),
                fields: None,
                adjust_type: None,
                fill_data: true,
                disable_download: false,
            })
            .await
            .unwrap();
        assert_eq!(responses.len(), 2);
        assert!(!responses[0].data.is_empty());
        assert_eq!(responses[0].period, "1d");
        let row = &responses[0].data[0];
        assert!(row.get("time").is_some() && row.get("close").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn batch_fails_whole_on_invalid_symbol() {
        let err = service()
            .get_market_data(MarketDataRequest {
                stock_codes: vec!["000001.SZ".into(), "bogus".into()],
                period: Period::Day,
                start_date: String::new(),
                end_date: String::new(),
                fields: None,
                adjust_type: None,
                fill_data: true,
                disable_download: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, xtgate_core::GatewayError::InvalidArgument(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn financial_tables_are_grouped_per_symbol() {
        let responses = service()
            .get_financial_data(FinancialDataRequest {
                stock_codes: vec!["000001.SZ".into()],
                table_list: vec!["Balance".into(), "Income".into()],
                start_date: String::new(),
                end_date: String::new(),
                disable_download: false,
            })
            .await
            .unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].tables.len(), 2);
        assert!(responses[0].tables.contains_key("Income"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sector_write_round_trip() {
        let svc = service();
        svc.create_sector(CreateSectorRequest {
            parent_node: String::new(),
            sector_name: "watchlist".into(),
            overwrite: true,
        })
        .await
        .unwrap();
        svc.add_sector_stocks(SectorStocksRequest {
            sector_name: "watchlist".into(),
            stock_list: vec!["000001.SZ".into(), "600036.SH".into()],
        })
        .await
        .unwrap();
        let sector = svc
            .get_sector_stocks(SectorRequest { sector_name: "watchlist".into() })
            .await
            .unwrap();
        assert_eq!(sector.stock_list.len(), 2);

        svc.remove_sector_stocks(SectorStocksRequest {
            sector_name: "watchlist".into(),
            stock_list: vec!["000001.SZ".into()],
        })
        .await
        .unwrap();
        let sector = svc
            .get_sector_stocks(SectorRequest { sector_name: "watchlist".into() })
            .await
            .unwrap();
        assert_eq!(sector.stock_list, vec!["600036.SH".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn index_weights_are_sorted_descending() {
        let response = service()
            .get_index_weight(IndexWeightRequest { index_code: "000300.SH".into() })
            .await
            .unwrap();
        assert!(!response.weights.is_empty());
        assert!(response
            .weights
            .windows(2)
            .all(|w| w[0].weight >= w[1].weight));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn calendar_counts_match() {
        let response = service().get_trading_calendar(2025).await.unwrap();
        assert_eq!(response.count, response.trading_days.len());
        assert!(response.count > 200);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn full_tick_covers_every_symbol() {
        let ticks = service()
            .get_full_tick(CodesRequest {
                stock_codes: vec!["000001.SZ".into(), "000002.SZ".into()],
            })
            .await
            .unwrap();
        assert_eq!(ticks.len(), 2);
        assert!(ticks["000001.SZ"].last_price > 0.0);
    }
}
