//! User-facing notifications.
//!
//! All pipeline outcomes reach the user through the narrow [`Notifier`]
//! trait. Delivery is best-effort: a `Blocked` verdict is terminal and never
//! retried, any other failure is retried up to 3 attempts with exponential
//! backoff, then dropped silently.

pub mod bot_api;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, warn};

use subvend_sdk::objects::AccountId;

use crate::clients::backoff_delay;

pub use bot_api::BotApiNotifier;

const MAX_NOTIFY_ATTEMPTS: u32 = 3;

/// Delivery verdict for one notification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The recipient blocked the sender; retrying cannot help.
    Blocked,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("notification rejected with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, account: AccountId, text: &str) -> Result<Delivery, NotifyError>;
}

/// Retry-wrapped notification sender shared by the matcher and the queue.
#[derive(Clone)]
pub struct Notifications {
    notifier: Arc<dyn Notifier>,
}

impl Notifications {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Notify one account, bounded retries. Never fails the caller.
    pub async fn user(&self, account: AccountId, text: &str) {
        for attempt in 0..MAX_NOTIFY_ATTEMPTS {
            match self.notifier.notify(account, text).await {
                Ok(Delivery::Delivered) => return,
                Ok(Delivery::Blocked) => {
                    warn!(%account, "Recipient blocked notifications, giving up");
                    return;
                }
                Err(e) => {
                    warn!(
                        %account,
                        attempt = attempt + 1,
                        error = %e,
                        "Notification attempt failed"
                    );
                    if attempt + 1 < MAX_NOTIFY_ATTEMPTS {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }
        }
        error!(%account, "Notification dropped after {MAX_NOTIFY_ATTEMPTS} attempts");
    }

    /// Notify every admin account.
    pub async fn admins(&self, admins: &[AccountId], text: &str) {
        for admin in admins {
            self.user(*admin, text).await;
        }
    }
}
