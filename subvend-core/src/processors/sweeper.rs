//! Expiry and retention sweep processors.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::matcher::DepositMatcher;

/// Deletes expired open deposit orders after notifying their owners,
/// freeing their unique amounts for reuse.
pub struct ExpirySweeper {
    matcher: Arc<DepositMatcher>,
    interval: Duration,
}

impl ExpirySweeper {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

    pub fn new(matcher: Arc<DepositMatcher>, interval: Duration) -> Self {
        Self { matcher, interval }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "ExpirySweeper started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("ExpirySweeper received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match self.matcher.sweep_expired().await {
                        Ok(swept) if swept > 0 => info!(swept, "Expired deposit orders swept"),
                        Ok(_) => debug!("No expired deposit orders"),
                        Err(e) => error!(error = %e, "Expiry sweep failed"),
                    }
                }
            }
        }

        info!("ExpirySweeper shutdown complete");
    }
}

/// Purges closed-order audit rows past the retention horizon. Storage
/// hygiene only.
pub struct RetentionSweeper {
    matcher: Arc<DepositMatcher>,
    interval: Duration,
}

impl RetentionSweeper {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(86_400);

    pub fn new(matcher: Arc<DepositMatcher>, interval: Duration) -> Self {
        Self { matcher, interval }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "RetentionSweeper started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("RetentionSweeper received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.matcher.sweep_retention().await {
                        error!(error = %e, "Retention sweep failed");
                    }
                }
            }
        }

        info!("RetentionSweeper shutdown complete");
    }
}
