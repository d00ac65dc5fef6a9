//! Trading DTOs and the vendor-constant conversions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xtgate_qmtlink as qmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Security,
    Credit,
    Future,
    StockOption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Vendor side constant for **order_stock**.
    pub fn to_vendor(self) -> i32 {
        match self {
            OrderSide::Buy => qmt::STOCK_BUY,
            OrderSide::Sell => qmt::STOCK_SELL,
        }
    }

    pub fn from_vendor(order_type: i32) -> Option<Self> {
        match order_type {
            qmt::STOCK_BUY => Some(OrderSide::Buy),
            qmt::STOCK_SELL => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    #[default]
    Limit,
    Stop,
    StopLimit,
}

impl OrderType {
    /// Vendor price-type constant; everything that is not a plain limit
    /// order goes out at the latest price.
    pub fn to_vendor(self) -> i32 {
        match self {
            OrderType::Limit => qmt::FIX_PRICE,
            _ => qmt::LATEST_PRICE,
        }
    }

    pub fn from_vendor(price_type: i32) -> Self {
        if price_type == qmt::FIX_PRICE {
            OrderType::Limit
        } else {
            OrderType::Market
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Submitted,
    PartialFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Collapses the vendor's 48..=57 status bytes; unknown codes are
    /// reported as `PENDING`.
    pub fn from_vendor(status: i32) -> Self {
        match status {
            qmt::ORDER_STATUS_UNREPORTED => OrderStatus::Pending,
            qmt::ORDER_STATUS_WAIT_REPORTING
            | qmt::ORDER_STATUS_REPORTED
            | qmt::ORDER_STATUS_REPORTED_CANCEL => OrderStatus::Submitted,
            qmt::ORDER_STATUS_PART_SUCC_CANCEL
            | qmt::ORDER_STATUS_PART_CANCEL
            | qmt::ORDER_STATUS_PART_SUCC => OrderStatus::PartialFilled,
            qmt::ORDER_STATUS_CANCELLED => OrderStatus::Cancelled,
            qmt::ORDER_STATUS_SUCCEEDED => OrderStatus::Filled,
            qmt::ORDER_STATUS_JUNK => OrderStatus::Rejected,
            _ => OrderStatus::Pending,
        }
    }
}

/// Why a response was fabricated instead of executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimReason {
    /// The process runs without a vendor core.
    SimMode,
    /// The operational mode forbids the mutation.
    ModeRefused,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectRequest {
    pub account_id: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub client_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_info: Option<AccountInfo>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountInfo {
    pub account_id: String,
    pub account_type: AccountType,
    pub account_name: String,
    pub status: String,
    pub balance: f64,
    pub available_balance: f64,
    pub frozen_balance: f64,
    pub market_value: f64,
    pub total_asset: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssetInfo {
    pub total_asset: f64,
    pub market_value: f64,
    pub cash: f64,
    pub frozen_cash: f64,
    pub available_cash: f64,
    pub profit_loss: f64,
    pub profit_loss_ratio: f64,
}

impl From<&qmt::XtAsset> for AssetInfo {
    fn from(asset: &qmt::XtAsset) -> Self {
        Self {
            total_asset: asset.total_asset,
            market_value: asset.market_value,
            cash: asset.cash,
            frozen_cash: asset.frozen_cash,
            available_cash: asset.cash - asset.frozen_cash,
            profit_loss: asset.profit,
            profit_loss_ratio: if asset.total_asset > 0.0 {
                asset.profit / asset.total_asset
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PositionInfo {
    pub stock_code: String,
    pub stock_name: String,
    pub volume: i64,
    pub available_volume: i64,
    pub frozen_volume: i64,
    pub cost_price: f64,
    pub market_price: f64,
    pub market_value: f64,
    pub profit_loss: f64,
    pub profit_loss_ratio: f64,
}

impl From<&qmt::XtPosition> for PositionInfo {
    fn from(pos: &qmt::XtPosition) -> Self {
        let market_price =
            if pos.volume > 0 { pos.market_value / pos.volume as f64 } else { 0.0 };
        let cost_basis = pos.open_price * pos.volume as f64;
        Self {
            stock_code: pos.stock_code.clone(),
            stock_name: pos.stock_name.clone(),
            volume: pos.volume,
            available_volume: pos.can_use_volume,
            frozen_volume: pos.frozen_volume,
            cost_price: pos.open_price,
            market_price,
            market_value: pos.market_value,
            profit_loss: pos.profit,
            profit_loss_ratio: if cost_basis > 0.0 { pos.profit / cost_basis } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderRequest {
    pub stock_code: String,
    pub side: OrderSide,
    #[serde(default)]
    pub order_type: OrderType,
    pub volume: i64,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub strategy_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub stock_code: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub volume: i64,
    pub price: Option<f64>,
    pub status: OrderStatus,
    pub submitted_time: DateTime<Utc>,
    #[serde(default)]
    pub filled_volume: i64,
    #[serde(default)]
    pub filled_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_price: Option<f64>,
    /// Diagnostic: the order never reached the vendor.
    #[serde(default)]
    pub simulated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sim_reason: Option<SimReason>,
}

impl From<&qmt::XtOrder> for OrderResponse {
    fn from(order: &qmt::XtOrder) -> Self {
        Self {
            order_id: order.order_id.to_string(),
            stock_code: order.stock_code.clone(),
            side: OrderSide::from_vendor(order.order_type).unwrap_or(OrderSide::Buy),
            order_type: OrderType::from_vendor(order.price_type),
            volume: order.order_volume,
            price: Some(order.price),
            status: OrderStatus::from_vendor(order.order_status),
            submitted_time: DateTime::from_timestamp(order.order_time, 0)
                .unwrap_or_else(Utc::now),
            filled_volume: order.traded_volume,
            filled_amount: order.traded_amount,
            average_price: (order.traded_volume > 0).then_some(order.traded_price),
            simulated: false,
            sim_reason: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CancelOrderRequest {
    pub order_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub order_id: String,
    #[serde(default)]
    pub simulated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sim_reason: Option<SimReason>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradeInfo {
    pub trade_id: String,
    pub order_id: String,
    pub stock_code: String,
    pub side: OrderSide,
    pub volume: i64,
    pub price: f64,
    pub amount: f64,
    pub trade_time: DateTime<Utc>,
    pub commission: f64,
}

impl From<&qmt::XtTrade> for TradeInfo {
    fn from(trade: &qmt::XtTrade) -> Self {
        Self {
            trade_id: trade.traded_id.clone(),
            order_id: trade.order_id.to_string(),
            stock_code: trade.stock_code.clone(),
            side: OrderSide::from_vendor(trade.order_type).unwrap_or(OrderSide::Buy),
            volume: trade.traded_volume,
            price: trade.traded_price,
            amount: trade.traded_amount,
            trade_time: DateTime::from_timestamp(trade.traded_time, 0).unwrap_or_else(Utc::now),
            commission: trade.commission,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskInfo {
    pub position_ratio: f64,
    pub cash_ratio: f64,
    pub max_drawdown: f64,
    pub var_95: f64,
    pub var_99: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyInfo {
    pub strategy_name: String,
    pub strategy_type: String,
    pub status: String,
    pub created_time: DateTime<Utc>,
    pub last_update_time: DateTime<Utc>,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AsyncOrderResponse {
    pub success: bool,
    pub message: String,
    pub seq: i64,
    pub stock_code: String,
    pub side: OrderSide,
    pub volume: i64,
    pub price: Option<f64>,
    #[serde(default)]
    pub simulated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sim_reason: Option<SimReason>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AsyncCancelRequest {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_sysid: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AsyncCancelResponse {
    pub success: bool,
    pub message: String,
    pub seq: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub simulated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sim_reason: Option<SimReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_status_table() {
        let expected = [
            (48, OrderStatus::Pending),
            (49, OrderStatus::Submitted),
            (50, OrderStatus::Submitted),
            (51, OrderStatus::Submitted),
            (52, OrderStatus::PartialFilled),
            (53, OrderStatus::PartialFilled),
            (54, OrderStatus::Cancelled),
            (55, OrderStatus::PartialFilled),
            (56, OrderStatus::Filled),
            (57, OrderStatus::Rejected),
        ];
        for (code, status) in expected {
            assert_eq!(OrderStatus::from_vendor(code), status, "code {code}");
        }
        // Unknown codes collapse to PENDING.
        assert_eq!(OrderStatus::from_vendor(0), OrderStatus::Pending);
        assert_eq!(OrderStatus::from_vendor(99), OrderStatus::Pending);
    }

    #[test]
    fn wire_names_match_the_api() {
        assert_eq!(serde_json::to_string(&OrderStatus::PartialFilled).unwrap(), "\"PARTIAL_FILLED\"");
        assert_eq!(serde_json::to_string(&OrderSide::Buy).unwrap(), "\"BUY\"");
        assert_eq!(serde_json::to_string(&SimReason::ModeRefused).unwrap(), "\"mode_refused\"");
    }

    #[test]
    fn order_request_defaults_to_limit() {
        let req: OrderRequest = serde_json::from_str(
            r#"{"stock_code":"000001.SZ","side":"BUY","volume":100,"price":13.5}"#,
        )
        .unwrap();
        assert_eq!(req.order_type, OrderType::Limit);
        assert_eq!(req.side.to_vendor(), xtgate_qmtlink::STOCK_BUY);
    }
}
