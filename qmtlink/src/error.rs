//! Vendor result codes and errors, unified between the simulated connector
//! and real-SDK implementations.

/// Raw result type of the vendor's status-returning calls (**connect**,
/// **subscribe**, **cancel_order_stock**, the async submits). Zero means
/// success, anything else is a vendor error code passed through verbatim.
pub type XtResult = i32;

pub const XT_OK: XtResult = 0;

// Order-status bytes as reported in **order_status** (ASCII digits '0'..'9'
// offset into the 48..57 range).
pub const ORDER_STATUS_UNREPORTED: i32 = 48;
pub const ORDER_STATUS_WAIT_REPORTING: i32 = 49;
pub const ORDER_STATUS_REPORTED: i32 = 50;
pub const ORDER_STATUS_REPORTED_CANCEL: i32 = 51;
pub const ORDER_STATUS_PART_SUCC_CANCEL: i32 = 52;
pub const ORDER_STATUS_PART_CANCEL: i32 = 53;
pub const ORDER_STATUS_CANCELLED: i32 = 54;
pub const ORDER_STATUS_PART_SUCC: i32 = 55;
pub const ORDER_STATUS_SUCCEEDED: i32 = 56;
pub const ORDER_STATUS_JUNK: i32 = 57;

// Side constants of **order_stock** (vendor `xtconstant` values).
pub const STOCK_BUY: i32 = 23;
pub const STOCK_SELL: i32 = 24;

// Price-type constants of **order_stock**.
pub const FIX_PRICE: i32 = 11;
pub const LATEST_PRICE: i32 = 5;

/// Unified vendor-facing error (**XtError**).
///
/// Connector implementations raise these; the service layer converts them
/// into the gateway taxonomy at the call site.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XtError {
    #[error("vendor client not connected")]
    NotConnected,
    #[error("vendor connect failed, code {0}")]
    ConnectFailed(XtResult),
    #[error("account subscribe failed, code {0}")]
    SubscribeFailed(XtResult),
    #[error("vendor call failed, code {0}")]
    Call(XtResult),
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),
    #[error("no data returned for request")]
    NoData,
}

impl XtError {
    /// The numeric vendor code, when the error carries one.
    pub fn code(&self) -> Option<XtResult> {
        match self {
            XtError::ConnectFailed(c) | XtError::SubscribeFailed(c) | XtError::Call(c) => Some(*c),
            _ => None,
        }
    }
}
