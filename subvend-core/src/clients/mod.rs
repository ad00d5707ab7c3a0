//! Outbound HTTP adapters for the external collaborators, plus the shared
//! rate gate and retry schedule they all use.

pub mod indexer;
pub mod provider;
pub mod wallet;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

/// Retries per outbound HTTP operation.
pub const MAX_HTTP_RETRIES: u32 = 3;

/// Simultaneous outbound calls allowed across provider and indexer traffic;
/// keeps us under provider-side throttling.
pub const MAX_CONCURRENT_CALLS: usize = 5;

/// Bounded-concurrency gate shared by the HTTP adapters.
pub type ApiGate = Arc<Semaphore>;

pub fn api_gate() -> ApiGate {
    Arc::new(Semaphore::new(MAX_CONCURRENT_CALLS))
}

/// Exponential backoff: 2 s, 4 s, 8 s, ... for attempt 0, 1, 2, ...
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64 << attempt.min(5))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_two_seconds() {
        assert_eq!(backoff_delay(0), Duration::from_secs(2));
        assert_eq!(backoff_delay(1), Duration::from_secs(4));
        assert_eq!(backoff_delay(2), Duration::from_secs(8));
        // Capped so a runaway attempt counter cannot sleep forever.
        assert_eq!(backoff_delay(10), Duration::from_secs(64));
    }
}
