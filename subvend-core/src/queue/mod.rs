//! Fulfillment queue.
//!
//! A durable, FIFO work queue of purchase intents with a single logical
//! consumer. The drain loop advances each claimed task through a
//! bounded-retry state machine; the ledger is debited only after the
//! provider confirms success, so failures never require refunds - at worst
//! the balance is left untouched and the task retries or terminally fails.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use subvend_sdk::config::ShopConfig;
use subvend_sdk::objects::{AccountId, Tier};

use crate::config::ConfigStore;
use crate::entities::PurchaseOutcome;
use crate::entities::fulfillment_task::FulfillmentTask;
use crate::fulfill::{FulfillError, Fulfiller, Settlement};
use crate::notify::Notifications;
use crate::store::{SettleOutcome, Store, StoreError};

/// Task attempts before a terminal failure. Distinct from HTTP-level
/// retries: one `fulfill` call is one attempt, whatever happens inside.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum PurchaseError {
    /// Reported synchronously at enqueue time; never retried automatically.
    #[error("insufficient funds: balance {available}, price {required}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("recipient must not be empty")]
    InvalidSubject,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct FulfillmentQueue {
    store: Arc<dyn Store>,
    fulfiller: Arc<dyn Fulfiller>,
    notifications: Notifications,
    shop: ConfigStore<ShopConfig>,
    max_retries: u32,
}

impl FulfillmentQueue {
    pub fn new(
        store: Arc<dyn Store>,
        fulfiller: Arc<dyn Fulfiller>,
        notifications: Notifications,
        shop: ConfigStore<ShopConfig>,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            fulfiller,
            notifications,
            shop,
            max_retries,
        }
    }

    /// Append a purchase intent after an optimistic balance pre-check
    /// against the tier's nominal price. The authoritative check happens
    /// again at debit time under the row lock.
    pub async fn enqueue(
        &self,
        account: AccountId,
        username: &str,
        subject: &str,
        tier: Tier,
    ) -> Result<i64, PurchaseError> {
        let subject = subject.trim().trim_start_matches('@');
        if subject.is_empty() {
            return Err(PurchaseError::InvalidSubject);
        }

        self.store.touch_account(account, username).await?;

        let nominal = self.shop.read().await.prices.price(tier);
        let balance = self.store.balance(account).await?;
        if balance < nominal {
            return Err(PurchaseError::InsufficientFunds {
                required: nominal,
                available: balance,
            });
        }

        let task_id = self.store.enqueue_task(account, subject, tier).await?;
        info!(%account, task_id, subject, %tier, "Purchase task enqueued");
        Ok(task_id)
    }

    /// Claim and process tasks until none remain or `max_tasks` is reached.
    /// One task's failure never aborts the rest of the pass.
    pub async fn drain(&self, max_tasks: u32) -> u32 {
        let mut processed = 0u32;
        while processed < max_tasks {
            let task = match self.store.claim_next_task().await {
                Ok(Some(task)) => task,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Failed to claim next task");
                    break;
                }
            };
            info!(
                task_id = task.id,
                account = task.account_id,
                subject = %task.subject,
                retry_count = task.retry_count,
                "Processing fulfillment task"
            );
            self.process_task(task).await;
            processed += 1;
        }
        processed
    }

    async fn process_task(&self, task: FulfillmentTask) {
        let (prices, support, admins) = {
            let cfg = self.shop.read().await;
            (
                cfg.prices.clone(),
                cfg.support_contact.clone(),
                cfg.admins.clone(),
            )
        };

        let tier = match task.tier() {
            Ok(tier) => tier,
            Err(e) => {
                self.abort_with_entry(&task, &e.to_string()).await;
                self.notifications
                    .user(
                        task.account(),
                        &format!(
                            "Task {}: this purchase could not be processed. \
                             Please contact {support}.",
                            task.id
                        ),
                    )
                    .await;
                return;
            }
        };

        // A task claimed at the cap is terminally failed without touching
        // the provider.
        if task.retry_count >= self.max_retries as i32 {
            if let Err(e) = self.store.abort_task(task.id, "retry limit reached").await {
                error!(task_id = task.id, error = %e, "Failed to abort capped task");
            }
            self.notifications
                .user(
                    task.account(),
                    &format!(
                        "Task {}: activating {tier} for @{} failed: retry limit reached. \
                         Please contact {support}.",
                        task.id, task.subject
                    ),
                )
                .await;
            return;
        }

        // Authoritative balance re-check. Insufficient funds is not a queue
        // failure - retrying cannot change the outcome until the user
        // deposits more, so the attempt counter is left alone.
        let nominal = prices.price(tier);
        let balance = match self.store.balance(task.account()).await {
            Ok(balance) => balance,
            Err(e) => {
                self.attempt_failed(&task, tier, &e.to_string(), &support)
                    .await;
                return;
            }
        };
        if balance < nominal {
            self.abort_with_entry(&task, "insufficient funds").await;
            self.notifications
                .user(
                    task.account(),
                    &format!(
                        "Task {}: purchase aborted - balance {balance} is below the \
                         {tier} price {nominal}. Your balance was not charged. \
                         Top up and order again.",
                        task.id
                    ),
                )
                .await;
            return;
        }

        match self.fulfiller.fulfill(&task.subject, tier).await {
            Ok(settlement) => {
                self.apply_settlement(&task, tier, settlement, &support)
                    .await;
            }
            Err(err) => {
                if let FulfillError::TreasuryUnderfunded {
                    needed,
                    available,
                    address,
                } = &err
                {
                    self.notifications
                        .admins(
                            &admins,
                            &format!(
                                "Treasury underfunded: {available} available, {needed} \
                                 needed. Fund {address}; the task will retry."
                            ),
                        )
                        .await;
                }

                if err.is_retryable() {
                    self.attempt_failed(&task, tier, &err.to_string(), &support)
                        .await;
                } else {
                    self.abort_with_entry(&task, &err.to_string()).await;
                    self.notifications
                        .user(
                            task.account(),
                            &format!(
                                "Task {}: activating {tier} for @{} failed: {err}. \
                                 Your balance was not charged.",
                                task.id, task.subject
                            ),
                        )
                        .await;
                }
            }
        }
    }

    /// Provider succeeded; settle against the ledger exactly once.
    async fn apply_settlement(
        &self,
        task: &FulfillmentTask,
        tier: Tier,
        settlement: Settlement,
        support: &str,
    ) {
        let settled = match self.store.is_settled(&settlement.settlement_id).await {
            Ok(settled) => settled,
            Err(e) => {
                self.attempt_failed(task, tier, &e.to_string(), support).await;
                return;
            }
        };
        if settled {
            self.finish_duplicate(task, tier, &settlement.settlement_id)
                .await;
            return;
        }

        match self.store.settle_task(task, &settlement).await {
            Ok(SettleOutcome::Settled {
                entry_id,
                new_balance,
            }) => {
                info!(
                    task_id = task.id,
                    settlement_id = %settlement.settlement_id,
                    cost = %settlement.cost,
                    %new_balance,
                    "Task settled"
                );
                self.notifications
                    .user(
                        task.account(),
                        &format!(
                            "Task {}: {tier} activated for @{}. Charged {}. \
                             New balance: {new_balance}. Order {entry_id}.",
                            task.id, task.subject, settlement.cost
                        ),
                    )
                    .await;
            }
            Ok(SettleOutcome::DuplicateSettlement) => {
                // Lost the insert race to a concurrent settlement of the
                // same id; nothing was charged.
                self.finish_duplicate(task, tier, &settlement.settlement_id)
                    .await;
            }
            Err(StoreError::InsufficientFunds {
                required,
                available,
            }) => {
                warn!(
                    task_id = task.id,
                    %required,
                    %available,
                    "Realized cost exceeds balance at debit time"
                );
                self.abort_with_entry(task, "insufficient funds at settlement")
                    .await;
                self.notifications
                    .user(
                        task.account(),
                        &format!(
                            "Task {}: purchase aborted - the realized cost {required} \
                             exceeds your balance {available}. Your balance was not \
                             charged. Please contact {support}.",
                            task.id
                        ),
                    )
                    .await;
            }
            Err(e) => {
                self.attempt_failed(task, tier, &e.to_string(), support).await;
            }
        }
    }

    /// The settlement id is already registered: record a zero-charge audit
    /// entry, complete the task, tell the owner nothing was charged.
    async fn finish_duplicate(&self, task: &FulfillmentTask, tier: Tier, settlement_id: &str) {
        info!(
            task_id = task.id,
            settlement_id,
            "Settlement already registered, treating as duplicate"
        );
        let entry_id = match self
            .store
            .record_purchase_entry(task, PurchaseOutcome::Duplicate, Decimal::ZERO)
            .await
        {
            Ok(entry_id) => entry_id,
            Err(e) => {
                error!(task_id = task.id, error = %e, "Failed to record duplicate entry");
                String::new()
            }
        };
        if let Err(e) = self.store.complete_task(task.id).await {
            error!(task_id = task.id, error = %e, "Failed to complete duplicate task");
        }
        self.notifications
            .user(
                task.account(),
                &format!(
                    "Task {}: @{} already has {tier} active - no charge was made. \
                     Order {entry_id}.",
                    task.id, task.subject
                ),
            )
            .await;
    }

    /// One attempt failed: requeue below the cap, terminally fail at it.
    /// The owner hears about terminal failures only.
    async fn attempt_failed(&self, task: &FulfillmentTask, tier: Tier, error: &str, support: &str) {
        let attempts = task.retry_count + 1;
        if attempts >= self.max_retries as i32 {
            if let Err(e) = self.store.fail_task(task.id, error).await {
                error!(task_id = task.id, error = %e, "Failed to fail task");
            }
            if let Err(e) = self
                .store
                .record_purchase_entry(task, PurchaseOutcome::Failed, Decimal::ZERO)
                .await
            {
                error!(task_id = task.id, error = %e, "Failed to record failure entry");
            }
            self.notifications
                .user(
                    task.account(),
                    &format!(
                        "Task {}: activating {tier} for @{} failed: {error}. \
                         Your balance was not charged. Please contact {support}.",
                        task.id, task.subject
                    ),
                )
                .await;
        } else {
            if let Err(e) = self.store.requeue_task(task.id, error).await {
                error!(task_id = task.id, error = %e, "Failed to requeue task");
            }
            info!(task_id = task.id, attempts, "Task requeued for retry");
        }
    }

    /// Terminal failure that does not count as an attempt.
    async fn abort_with_entry(&self, task: &FulfillmentTask, reason: &str) {
        if let Err(e) = self.store.abort_task(task.id, reason).await {
            error!(task_id = task.id, error = %e, "Failed to abort task");
        }
        if let Err(e) = self
            .store
            .record_purchase_entry(task, PurchaseOutcome::Failed, Decimal::ZERO)
            .await
        {
            error!(task_id = task.id, error = %e, "Failed to record abort entry");
        }
    }
}
