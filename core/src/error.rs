//! Transport-independent error taxonomy.
//!
//! Services raise [`GatewayError`]s; the transport layer translates them
//! once, at the boundary, via [`GatewayError::http_status`] and
//! [`GatewayError::rpc_code`]. Vendor calls are never retried by the
//! gateway.

use std::time::Duration;
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Error kinds surfaced to callers, independent of transport.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Malformed DTO, unknown symbol format, missing required field.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// API key missing or not in the configured allow-list.
    #[error("missing or invalid API key")]
    Unauthenticated,

    /// Session identifier not registered.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Operation not permitted in the current operational mode.
    #[error("operation '{op}' refused in {mode} mode")]
    ModeRefused { op: &'static str, mode: &'static str },

    /// Vendor connect/subscribe failed; non-retriable from the gateway.
    #[error("vendor core unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Vendor call returned an error code; the code is passed verbatim.
    #[error("vendor error {code}: {message}")]
    Vendor { code: i64, message: String },

    /// Per-operation deadline expired. The vendor worker keeps running,
    /// its result is discarded.
    #[error("operation '{op}' timed out after {deadline:?}")]
    Timeout { op: &'static str, deadline: Duration },

    /// Any unclassified failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Canonical RPC status codes carried in every framed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RpcCode {
    Ok = 0,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    FailedPrecondition = 9,
    Internal = 13,
    Unauthenticated = 16,
}

impl GatewayError {
    /// HTTP status for the error-mapping table.
    pub fn http_status(&self) -> u16 {
        match self {
            GatewayError::InvalidArgument(_) => 400,
            GatewayError::Unauthenticated => 401,
            GatewayError::SessionNotFound(_) => 400,
            GatewayError::ModeRefused { .. } => 400,
            GatewayError::Timeout { .. } => 504,
            GatewayError::UpstreamUnavailable(_)
            | GatewayError::Vendor { .. }
            | GatewayError::Internal(_) => 500,
        }
    }

    /// RPC status for the error-mapping table.
    pub fn rpc_code(&self) -> RpcCode {
        match self {
            GatewayError::InvalidArgument(_) => RpcCode::InvalidArgument,
            GatewayError::Unauthenticated => RpcCode::Unauthenticated,
            GatewayError::SessionNotFound(_) | GatewayError::ModeRefused { .. } => {
                RpcCode::FailedPrecondition
            }
            GatewayError::Timeout { .. } => RpcCode::DeadlineExceeded,
            GatewayError::UpstreamUnavailable(_)
            | GatewayError::Vendor { .. }
            | GatewayError::Internal(_) => RpcCode::Internal,
        }
    }

    /// Shorthand for symbol-format rejections.
    pub fn invalid_symbol(code: &str) -> Self {
        GatewayError::InvalidArgument(format!("invalid stock code: {code}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_errors() -> Vec<GatewayError> {
        vec![
            GatewayError::InvalidArgument("bad".into()),
            GatewayError::Unauthenticated,
            GatewayError::SessionNotFound("session_x".into()),
            GatewayError::ModeRefused { op: "submit_order", mode: "live_ro" },
            GatewayError::UpstreamUnavailable("connect rc=-1".into()),
            GatewayError::Vendor { code: -61, message: "rejected".into() },
            GatewayError::Timeout { op: "get_market_data", deadline: Duration::from_secs(60) },
            GatewayError::Internal("panic".into()),
        ]
    }

    #[test]
    fn http_mapping_table() {
        let statuses: Vec<u16> = sample_errors().iter().map(|e| e.http_status()).collect();
        assert_eq!(statuses, vec![400, 401, 400, 400, 500, 500, 504, 500]);
    }

    #[test]
    fn rpc_mapping_table() {
        let codes: Vec<RpcCode> = sample_errors().iter().map(|e| e.rpc_code()).collect();
        assert_eq!(
            codes,
            vec![
                RpcCode::InvalidArgument,
                RpcCode::Unauthenticated,
                RpcCode::FailedPrecondition,
                RpcCode::FailedPrecondition,
                RpcCode::Internal,
                RpcCode::Internal,
                RpcCode::DeadlineExceeded,
                RpcCode::Internal,
            ]
        );
    }

    #[test]
    fn vendor_code_passed_verbatim() {
        let err = GatewayError::Vendor { code: -2147483640, message: "no license".into() };
        assert!(err.to_string().contains("-2147483640"));
    }
}
