//! Storage layer.
//!
//! All five durable tables live behind the [`Store`] trait. Operations the
//! pipeline needs to be atomic - matching a transfer to an order, settling a
//! task - are single trait methods so each backend owns its transaction
//! boundary: [`PgStore`] composes sqlx transactions with row locks,
//! [`MemStore`] serializes everything behind one mutex with the same
//! conditional-update semantics.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use subvend_sdk::objects::{AccountId, Tier};

use crate::entities::PurchaseOutcome;
use crate::entities::fulfillment_task::FulfillmentTask;
use crate::entities::purchase_ledger::PurchaseLedgerEntry;
use crate::fulfill::Settlement;

pub use memory::MemStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Recoverable, user-visible condition: the debit would push the balance
    /// below zero. Never retried automatically.
    #[error("insufficient funds: balance {available}, required {required}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    /// The unique amount collided with another open order; re-roll the
    /// offset and try again.
    #[error("deposit amount {0} already reserved by an open order")]
    AmountInUse(Decimal),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A deposit order about to be persisted as `open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDepositOrder {
    pub order_token: Uuid,
    pub account_id: AccountId,
    pub requested_amount: Decimal,
    pub amount: Decimal,
    pub created_at: time::OffsetDateTime,
    pub expires_at: time::OffsetDateTime,
}

/// Result of crediting an inbound transfer against an open order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedDeposit {
    pub order_token: Uuid,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub new_balance: Decimal,
}

/// An open order past its expiry, due for notification and deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredOrder {
    pub order_token: Uuid,
    pub account_id: AccountId,
    pub amount: Decimal,
}

/// Outcome of [`Store::settle_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Debit applied, settlement recorded, task completed.
    Settled {
        entry_id: String,
        new_balance: Decimal,
    },
    /// The settlement id lost an insert race; nothing was charged and the
    /// whole transaction was rolled back.
    DuplicateSettlement,
}

#[async_trait]
pub trait Store: Send + Sync {
    // -- accounts / ledger ------------------------------------------------

    /// Create the account lazily on first contact, or refresh its name.
    async fn touch_account(&self, account: AccountId, username: &str) -> Result<(), StoreError>;

    /// Point-in-time balance for display; no lock taken.
    async fn balance(&self, account: AccountId) -> Result<Decimal, StoreError>;

    /// Apply a signed delta under the account's row lock. Fails with
    /// [`StoreError::InsufficientFunds`] when the result would be negative.
    async fn adjust_balance(
        &self,
        account: AccountId,
        delta: Decimal,
    ) -> Result<Decimal, StoreError>;

    // -- deposit orders ---------------------------------------------------

    async fn open_order_count(&self, account: AccountId) -> Result<u32, StoreError>;

    /// Insert an open order, reserving its unique amount. Fails with
    /// [`StoreError::AmountInUse`] on a collision with another open order.
    async fn try_insert_deposit_order(&self, order: &NewDepositOrder) -> Result<(), StoreError>;

    /// Cancel an order if still open; returns whether anything changed.
    async fn cancel_deposit_order(&self, order_token: Uuid) -> Result<bool, StoreError>;

    /// Atomically match an inbound transfer amount against the oldest open
    /// order carrying it: order -> matched, owner credited, all in one
    /// transaction. Returns `None` when no open order carries the amount, so
    /// a transfer observed twice credits exactly once.
    async fn credit_matching_order(
        &self,
        amount: Decimal,
        now: time::OffsetDateTime,
    ) -> Result<Option<MatchedDeposit>, StoreError>;

    async fn expired_open_orders(
        &self,
        now: time::OffsetDateTime,
    ) -> Result<Vec<ExpiredOrder>, StoreError>;

    /// Delete one order, freeing its unique amount for reuse.
    async fn delete_deposit_order(&self, order_token: Uuid) -> Result<(), StoreError>;

    /// Drop matched/canceled audit rows older than the retention horizon.
    async fn purge_closed_orders_before(
        &self,
        cutoff: time::OffsetDateTime,
    ) -> Result<u64, StoreError>;

    // -- fulfillment queue ------------------------------------------------

    async fn enqueue_task(
        &self,
        account: AccountId,
        subject: &str,
        tier: Tier,
    ) -> Result<i64, StoreError>;

    /// Claim the oldest pending task (FIFO by creation time), flipping it to
    /// processing under a row lock.
    async fn claim_next_task(&self) -> Result<Option<FulfillmentTask>, StoreError>;

    /// Failed attempt below the cap: back to pending, `retry_count + 1`.
    async fn requeue_task(&self, task_id: i64, error: &str) -> Result<(), StoreError>;

    /// Failed attempt at the cap: terminal, `retry_count + 1`.
    async fn fail_task(&self, task_id: i64, error: &str) -> Result<(), StoreError>;

    /// Terminal failure without an attempt; `retry_count` untouched.
    async fn abort_task(&self, task_id: i64, error: &str) -> Result<(), StoreError>;

    async fn complete_task(&self, task_id: i64) -> Result<(), StoreError>;

    async fn task(&self, task_id: i64) -> Result<Option<FulfillmentTask>, StoreError>;

    // -- idempotency registry ---------------------------------------------

    async fn is_settled(&self, settlement_id: &str) -> Result<bool, StoreError>;

    /// Atomically: debit the realized cost under the account row lock,
    /// insert the settlement record (unique on settlement id), append the
    /// succeeded ledger entry, and mark the task completed. A duplicate
    /// settlement id rolls everything back and reports
    /// [`SettleOutcome::DuplicateSettlement`].
    async fn settle_task(
        &self,
        task: &FulfillmentTask,
        settlement: &Settlement,
    ) -> Result<SettleOutcome, StoreError>;

    // -- purchase ledger --------------------------------------------------

    /// Append an audit entry for a non-settling outcome (failure or
    /// duplicate); returns the entry id.
    async fn record_purchase_entry(
        &self,
        task: &FulfillmentTask,
        outcome: PurchaseOutcome,
        amount: Decimal,
    ) -> Result<String, StoreError>;

    /// Purchase history, paginated, newest first. Pages are 1-based.
    async fn purchase_history(
        &self,
        account: AccountId,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<PurchaseLedgerEntry>, StoreError>;
}
