//! Deposit matching engine.
//!
//! Turns a requested top-up amount into a collision-free on-chain payment
//! target, then reconciles chain activity against open orders. Correlation
//! is by exact amount only - the transfer protocol carries no reference
//! field - so uniqueness is enforced at allocation time, where it can be,
//! rather than at matching time, where amount-only matching would be
//! ambiguous.

use std::sync::Arc;

use rand::Rng;
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use uuid::Uuid;

use subvend_sdk::config::ShopConfig;
use subvend_sdk::objects::{AccountId, DepositInstructions};

use crate::clients::indexer::{ChainIndexer, IndexerError};
use crate::config::ConfigStore;
use crate::notify::Notifications;
use crate::store::{NewDepositOrder, Store, StoreError};

/// Offset bounds, in ten-thousandths of the unit: 0.0010 ..= 0.0100.
const MIN_OFFSET_UNITS: i64 = 10;
const MAX_OFFSET_UNITS: i64 = 100;
const OFFSET_SCALE: u32 = 4;

/// Re-rolls before giving up on allocating a unique amount.
const MAX_ALLOCATION_ATTEMPTS: u32 = 16;

#[derive(Debug, thiserror::Error)]
pub enum DepositError {
    #[error("deposit amount must be positive")]
    InvalidAmount,

    #[error("too many pending deposit orders; complete or cancel one first")]
    TooManyPendingOrders,

    #[error("could not allocate a unique deposit amount")]
    AmountAllocation,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Indexer(#[from] IndexerError),
}

/// Tunables for the matcher; defaults match production behavior.
#[derive(Debug, Clone)]
pub struct MatcherSettings {
    /// Payment window before an open order expires.
    pub expiry: time::Duration,
    /// Trailing window queried on each indexer poll.
    pub poll_window: time::Duration,
    /// How long matched/canceled audit rows are kept.
    pub retention: time::Duration,
    /// Open orders allowed per account.
    pub max_open_orders: u32,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            expiry: time::Duration::minutes(20),
            poll_window: time::Duration::seconds(700),
            retention: time::Duration::days(7),
            max_open_orders: 3,
        }
    }
}

pub struct DepositMatcher {
    store: Arc<dyn Store>,
    indexer: Arc<dyn ChainIndexer>,
    notifications: Notifications,
    shop: ConfigStore<ShopConfig>,
    settings: MatcherSettings,
}

impl DepositMatcher {
    pub fn new(
        store: Arc<dyn Store>,
        indexer: Arc<dyn ChainIndexer>,
        notifications: Notifications,
        shop: ConfigStore<ShopConfig>,
        settings: MatcherSettings,
    ) -> Self {
        Self {
            store,
            indexer,
            notifications,
            shop,
            settings,
        }
    }

    /// Create a deposit order with a disambiguated unique amount.
    pub async fn create_order(
        &self,
        account: AccountId,
        username: &str,
        requested: Decimal,
    ) -> Result<DepositInstructions, DepositError> {
        if requested <= Decimal::ZERO {
            return Err(DepositError::InvalidAmount);
        }

        self.store.touch_account(account, username).await?;

        let open = self.store.open_order_count(account).await?;
        if open >= self.settings.max_open_orders {
            return Err(DepositError::TooManyPendingOrders);
        }

        let pay_to = self.shop.read().await.payment_address.clone();
        let created_at = time::OffsetDateTime::now_utc();
        let expires_at = created_at + self.settings.expiry;

        // The unique amount is reserved by insertion; a collision with
        // another open order re-rolls the offset.
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let order = NewDepositOrder {
                order_token: Uuid::new_v4(),
                account_id: account,
                requested_amount: requested,
                amount: disambiguated_amount(requested),
                created_at,
                expires_at,
            };
            match self.store.try_insert_deposit_order(&order).await {
                Ok(()) => {
                    info!(
                        %account,
                        order_token = %order.order_token,
                        amount = %order.amount,
                        "Deposit order created"
                    );
                    return Ok(DepositInstructions {
                        order_token: order.order_token,
                        pay_to,
                        amount: order.amount,
                        requested_amount: requested,
                        created_at,
                        expires_at,
                    });
                }
                Err(StoreError::AmountInUse(amount)) => {
                    warn!(%account, %amount, "Unique amount collision, re-rolling");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(DepositError::AmountAllocation)
    }

    /// Cancel an order if it is still open.
    pub async fn cancel_order(&self, order_token: Uuid) -> Result<bool, DepositError> {
        let canceled = self.store.cancel_deposit_order(order_token).await?;
        info!(%order_token, canceled, "Deposit order cancel requested");
        Ok(canceled)
    }

    /// Poll the chain indexer and credit every transfer that matches an open
    /// order. Returns the number of credits issued.
    ///
    /// A transfer observed twice finds no open order on the second pass and
    /// is a no-op; the credit and the status flip are one transaction inside
    /// the store.
    pub async fn poll_and_match(&self) -> Result<u32, DepositError> {
        let (address, admins) = {
            let cfg = self.shop.read().await;
            (cfg.payment_address.clone(), cfg.admins.clone())
        };
        let now = time::OffsetDateTime::now_utc();
        let since = now - self.settings.poll_window;

        let events = self.indexer.incoming_transfers(&address, since).await?;

        let mut credited = 0u32;
        for event in events {
            match self.store.credit_matching_order(event.amount, now).await {
                Ok(Some(matched)) => {
                    credited += 1;
                    info!(
                        account = %matched.account_id,
                        order_token = %matched.order_token,
                        amount = %matched.amount,
                        "Deposit matched and credited"
                    );
                    self.notifications
                        .user(
                            matched.account_id,
                            &format!(
                                "Deposit received: {} credited to your balance. \
                                 New balance: {}.",
                                matched.amount, matched.new_balance
                            ),
                        )
                        .await;
                    self.notifications
                        .admins(
                            &admins,
                            &format!(
                                "Account {} deposited {}.",
                                matched.account_id, matched.amount
                            ),
                        )
                        .await;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(amount = %event.amount, error = %e, "Failed to credit matched transfer");
                }
            }
        }
        Ok(credited)
    }

    /// Notify owners of expired open orders and delete them, freeing their
    /// unique amounts for reuse.
    pub async fn sweep_expired(&self) -> Result<u32, DepositError> {
        let now = time::OffsetDateTime::now_utc();
        let expired = self.store.expired_open_orders(now).await?;

        let mut swept = 0u32;
        for order in expired {
            self.notifications
                .user(
                    order.account_id,
                    &format!(
                        "Your deposit order {} expired and was removed. \
                         You can create a new one at any time.",
                        order.order_token
                    ),
                )
                .await;
            match self.store.delete_deposit_order(order.order_token).await {
                Ok(()) => {
                    swept += 1;
                    info!(order_token = %order.order_token, "Expired deposit order removed");
                }
                Err(e) => {
                    error!(order_token = %order.order_token, error = %e, "Failed to delete expired order");
                }
            }
        }
        Ok(swept)
    }

    /// Storage hygiene: purge closed-order audit rows past the retention
    /// horizon. Not correctness-critical.
    pub async fn sweep_retention(&self) -> Result<u64, DepositError> {
        let cutoff = time::OffsetDateTime::now_utc() - self.settings.retention;
        let purged = self.store.purge_closed_orders_before(cutoff).await?;
        if purged > 0 {
            info!(purged, "Purged closed deposit orders past retention");
        }
        Ok(purged)
    }
}

/// Requested amount plus a small random offset, rounded to 4 decimal
/// places. The offset keeps concurrently-open orders from ever sharing an
/// exact amount.
fn disambiguated_amount(requested: Decimal) -> Decimal {
    let offset_units = rand::rng().random_range(MIN_OFFSET_UNITS..=MAX_OFFSET_UNITS);
    (requested + Decimal::new(offset_units, OFFSET_SCALE)).round_dp(OFFSET_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_stay_in_band() {
        let base = Decimal::new(10, 0);
        let min = Decimal::new(MIN_OFFSET_UNITS, OFFSET_SCALE);
        let max = Decimal::new(MAX_OFFSET_UNITS, OFFSET_SCALE);
        for _ in 0..200 {
            let amount = disambiguated_amount(base);
            let offset = amount - base;
            assert!(offset >= min, "offset {offset} below band");
            assert!(offset <= max, "offset {offset} above band");
            assert!(amount.scale() <= OFFSET_SCALE);
        }
    }
}
