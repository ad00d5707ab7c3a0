//! DepositPoller processor.
//!
//! Fires the matcher's poll-and-match cycle on a fixed interval: fetch
//! inbound transfers from the chain indexer, credit every one that matches
//! an open order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::matcher::DepositMatcher;

pub struct DepositPoller {
    matcher: Arc<DepositMatcher>,
    interval: Duration,
}

impl DepositPoller {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

    pub fn new(matcher: Arc<DepositMatcher>, interval: Duration) -> Self {
        Self { matcher, interval }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "DepositPoller started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("DepositPoller received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match self.matcher.poll_and_match().await {
                        Ok(credited) if credited > 0 => {
                            info!(credited, "Deposit poll credited transfers");
                        }
                        Ok(_) => debug!("Deposit poll found nothing to credit"),
                        Err(e) => error!(error = %e, "Deposit poll failed"),
                    }
                }
            }
        }

        info!("DepositPoller shutdown complete");
    }
}
