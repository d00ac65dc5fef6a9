#![forbid(unsafe_code)]
#![warn(unused, rust_2018_idioms)]

//! Transport layer of the xtgate gateway.
//!
//! Three surfaces over one service layer: the `/api/v1` HTTP+JSON API, the
//! length-prefixed framed RPC socket, and the two WebSocket push channels
//! (quote subscriptions and trading-event callbacks).

pub mod http;
pub mod rpc;
pub mod state;
pub mod ws;

pub use state::AppState;
