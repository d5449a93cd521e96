//! Background inactivity sweep loop for `kindred serve`.
//!
//! Runs [`InactivitySweeper::sweep`](kindred_core::chat::sweeper::InactivitySweeper::sweep)
//! every `sweeper.interval_minutes` until the cancellation token fires.
//! A failed pass is logged and the loop keeps going.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::state::ConcreteSweeper;

/// Sweep period for the configured interval. Zero is treated as one minute.
pub fn sweep_period(interval_minutes: u64) -> Duration {
    Duration::from_secs(interval_minutes.max(1) * 60)
}

/// Spawn the sweep loop on the runtime.
pub fn spawn_sweep_loop(sweeper: Arc<ConcreteSweeper>, cancel: CancellationToken) -> JoinHandle<()> {
    let period = sweep_period(sweeper.settings().interval_minutes);
    tokio::spawn(run_sweep_loop(sweeper, period, cancel))
}

async fn run_sweep_loop(sweeper: Arc<ConcreteSweeper>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately; the first sweep runs one period after startup.
    ticker.tick().await;

    tracing::info!(period_secs = period.as_secs(), "Inactivity sweeper started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match sweeper.sweep(chrono::Utc::now()).await {
                    Ok(report) => tracing::debug!(?report, "Scheduled sweep finished"),
                    Err(err) => tracing::warn!(error = %err, "Scheduled sweep failed"),
                }
            }
        }
    }

    tracing::info!("Inactivity sweeper stopped");
}
