#![forbid(unsafe_code)]
#![warn(unused, missing_debug_implementations, rust_2018_idioms)]

//! Concurrency substrate of the xtgate gateway.
//!
//! Everything between the transports and the vendor core lives here: the
//! [`executor::BlockingExecutor`] that keeps vendor calls off the
//! request-serving runtime, the [`session::SessionRegistry`], the
//! [`trading::TradingService`] and [`data::DataService`] wrappers, the
//! [`subscription::SubscriptionManager`] quote fan-out and the
//! [`callbacks::CallbackDispatcher`] that carries vendor-thread events into
//! the runtime.

pub mod callbacks;
pub mod data;
pub mod executor;
pub mod model;
pub mod session;
pub mod subscription;
pub mod symbol;
pub mod trading;

use xtgate_core::GatewayError;
use xtgate_qmtlink::XtError;

/// Maps a vendor-level error into the gateway taxonomy.
///
/// Lives here because neither error type may know about the other: the
/// vendor crate stays transport-free and the core crate stays vendor-free.
pub fn map_xt_err(err: XtError) -> GatewayError {
    match err {
        XtError::NotConnected => GatewayError::UpstreamUnavailable(err.to_string()),
        XtError::ConnectFailed(_) | XtError::SubscribeFailed(_) => {
            GatewayError::UpstreamUnavailable(err.to_string())
        }
        XtError::Call(code) => {
            GatewayError::Vendor { code: code.into(), message: err.to_string() }
        }
        XtError::UnknownInstrument(ref code) => GatewayError::invalid_symbol(code),
        XtError::NoData => GatewayError::Vendor { code: -1, message: err.to_string() },
        _ => GatewayError::Internal(err.to_string()),
    }
}
