//! Scheduled trigger and the inert HTTP surface.

use axum::{http::StatusCode, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::driver::{RunDriver, RunSummary};

/// Body returned for any direct request.
pub const NOT_HANDLED: &str = "This worker does not handle direct requests.";

/// Router answering health checks and refusing everything else.
#[must_use]
pub fn router() -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .fallback(|| async { (StatusCode::OK, NOT_HANDLED) })
}

/// Run one pass on its own task so neither an error nor a panic escapes.
///
/// Returns the summary when the pass completed.
pub async fn run_guarded(driver: Arc<RunDriver>) -> Option<RunSummary> {
    let handle = tokio::spawn(async move { driver.run().await });

    match handle.await {
        Ok(Ok(summary)) => {
            if !summary.failures.is_empty() {
                warn!(
                    failed = summary.failures.len(),
                    "Some time entries could not be reconciled"
                );
            }
            Some(summary)
        }
        Ok(Err(e)) => {
            error!(error = %e, "Error processing time entries");
            None
        }
        Err(e) => {
            error!(error = %e, "Reconciliation pass panicked");
            None
        }
    }
}

/// Run a pass every `every`, starting immediately. Passes never overlap: a
/// slow pass delays the next tick instead of running beside it.
pub async fn run_schedule(driver: Arc<RunDriver>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = every.as_secs(), "Reconciliation schedule started");
    loop {
        ticker.tick().await;
        run_guarded(driver.clone()).await;
    }
}
