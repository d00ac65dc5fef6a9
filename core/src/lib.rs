#![forbid(unsafe_code)]
#![warn(unused, missing_debug_implementations, rust_2018_idioms)]

//! Shared foundation for the xtgate gateway.
//!
//! Holds everything the other crates agree on before any vendor call is
//! made: the layered [`config::Settings`], the three-valued operational
//! [`mode::Mode`] and its guard, the transport-independent
//! [`error::GatewayError`] taxonomy, and the tracing bootstrap.

pub mod config;
pub mod error;
pub mod logging;
pub mod mode;

pub use config::Settings;
pub use error::{GatewayError, GatewayResult};
pub use mode::{Gate, Mode, OpClass};
