//! Blocking-call executor.
//!
//! The vendor SDK is synchronous and must never run on the request-serving
//! runtime. Every vendor call is shipped to the blocking worker pool (sized
//! via the runtime's `max_blocking_threads`, configured from
//! `vendor.executor_workers`) and awaited under the caller's deadline. Pool
//! saturation queues the call rather than failing fast: vendor calls are
//! not idempotent, so shedding would lose work the caller cannot retry.
//!
//! Cancellation contract: when the deadline expires the caller observes
//! `timeout` immediately, but the worker keeps running until the vendor
//! call returns (the SDK is not cancel-safe) and its result is discarded.

use std::time::Duration;
use tracing::error;
use xtgate_core::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct BlockingExecutor;

impl BlockingExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Runs `call` on a blocking worker, failing with
    /// [`GatewayError::Timeout`] once `deadline` elapses.
    pub async fn run<T, F>(&self, op: &'static str, deadline: Duration, call: F) -> GatewayResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> GatewayResult<T> + Send + 'static,
    {
        match tokio::time::timeout(deadline, tokio::task::spawn_blocking(call)).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                error!(op, error = %join_err, "vendor worker panicked");
                Err(GatewayError::Internal(format!("vendor worker failed for '{op}'")))
            }
            Err(_) => {
                error!(op, ?deadline, "vendor call exceeded deadline; discarding its result");
                Err(GatewayError::Timeout { op, deadline })
            }
        }
    }
}
