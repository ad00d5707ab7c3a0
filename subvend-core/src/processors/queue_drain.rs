//! QueueDrain processor.
//!
//! Drains the fulfillment queue on a short interval with a bounded batch
//! size. The interval loop is the drain-in-progress guard: a pass must
//! finish before the next tick fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::queue::FulfillmentQueue;

pub struct QueueDrain {
    queue: Arc<FulfillmentQueue>,
    interval: Duration,
    max_tasks: u32,
}

impl QueueDrain {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);
    pub const DEFAULT_MAX_TASKS: u32 = 5;

    pub fn new(queue: Arc<FulfillmentQueue>, interval: Duration, max_tasks: u32) -> Self {
        Self {
            queue,
            interval,
            max_tasks,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval = ?self.interval,
            max_tasks = self.max_tasks,
            "QueueDrain started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("QueueDrain received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    let processed = self.queue.drain(self.max_tasks).await;
                    if processed > 0 {
                        info!(processed, "Drain pass processed tasks");
                    } else {
                        debug!("Drain pass found no pending tasks");
                    }
                }
            }
        }

        info!("QueueDrain shutdown complete");
    }
}
