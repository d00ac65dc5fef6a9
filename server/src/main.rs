//! Gateway entry point.
//!
//! Builds the runtime by hand so the blocking pool that executes vendor
//! calls is sized from configuration, then serves the HTTP and RPC
//! surfaces until ctrl-c. Exit code 0 on clean shutdown, non-zero on any
//! fatal startup error.

use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use xtgate_core::{logging, Mode, Settings};
use xtgate_server::{http, rpc, AppState};

fn main() -> ExitCode {
    let mode = Mode::from_env();
    let settings = match Settings::load(None, mode) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("fatal: {err}");
            return ExitCode::FAILURE;
        }
    };
    if settings.logging.json {
        logging::init_json_logging(&settings.logging.level);
    } else {
        logging::init_logging(&settings.logging.level);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .max_blocking_threads(settings.vendor.executor_workers.max(1))
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed building runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(settings, mode));
    // Bounded drain: outstanding vendor calls get a grace period, then the
    // pool is torn down regardless (the SDK is not cancel-safe, so a hung
    // call must not hold shutdown hostage).
    runtime.shutdown_timeout(std::time::Duration::from_secs(10));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "fatal");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings, mode: Mode) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(Arc::new(settings), mode);
    info!(mode = %mode, workers = state.settings.vendor.executor_workers, "starting xtgate");

    let rpc_task = if state.settings.rpc.enabled {
        let addr = format!("{}:{}", state.settings.rpc.host, state.settings.rpc.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        Some(tokio::spawn(rpc::serve(state.clone(), listener)))
    } else {
        None
    };

    let addr = format!("{}:{}", state.settings.app.host, state.settings.app.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "http listening");
    axum::serve(listener, http::router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = rpc_task {
        task.abort();
    }
    state.shutdown().await;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
