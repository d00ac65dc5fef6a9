//! Stock-code format validation.
//!
//! Applied before any vendor call so malformed symbols are rejected in the
//! request path instead of surfacing as opaque vendor errors.

use xtgate_core::{GatewayError, GatewayResult};

const KNOWN_EXCHANGES: [&str; 3] = ["SH", "SZ", "BJ"];

/// `BODY.SUFFIX` with a non-empty numeric body and a known exchange suffix.
pub fn is_valid_stock_code(code: &str) -> bool {
    match code.rsplit_once('.') {
        Some((body, suffix)) => {
            !body.is_empty()
                && body.bytes().all(|b| b.is_ascii_digit())
                && KNOWN_EXCHANGES.contains(&suffix)
        }
        None => false,
    }
}

/// Rejects `code` with `invalid-argument` unless it passes the format check.
pub fn validate_stock_code(code: &str) -> GatewayResult<()> {
    if is_valid_stock_code(code) {
        Ok(())
    } else {
        Err(GatewayError::invalid_symbol(code))
    }
}

/// Validates a whole batch; the first offender fails the call.
pub fn validate_stock_codes(codes: &[String]) -> GatewayResult<()> {
    if codes.is_empty() {
        return Err(GatewayError::InvalidArgument("stock_codes must not be empty".into()));
    }
    codes.iter().try_for_each(|code| validate_stock_code(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_standard_codes() {
        for code in ["000001.SZ", "600036.SH", "830799.BJ"] {
            assert!(is_valid_stock_code(code), "{code}");
        }
    }

    #[test]
    fn rejects_malformed_codes() {
        for code in ["000001", "000001.XX", "ABC.SZ", ".SZ", "000001.sz", "000001.SZ.SH"] {
            assert!(!is_valid_stock_code(code), "{code}");
        }
    }

    #[test]
    fn empty_batch_is_invalid() {
        assert!(validate_stock_codes(&[]).is_err());
    }
}
