//! Tracing bootstrap.
//!
//! Two flavours, picked by configuration: human-readable for interactive
//! runs, JSON for aggregators. `RUST_LOG` overrides the configured level,
//! e.g. `RUST_LOG=xtgate_service=debug,info`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_filter(default_level: &str) -> tracing_subscriber::filter::EnvFilter {
    tracing_subscriber::filter::EnvFilter::builder()
        .with_default_directive(
            default_level
                .parse()
                .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .from_env_lossy()
}

/// Initialises human-readable logging.
pub fn init_logging(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(tracing_subscriber::fmt::layer())
        .init()
}

/// Initialises JSON logging.
pub fn init_json_logging(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .init()
}
