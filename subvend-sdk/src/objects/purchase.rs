//! Purchase request, queue status and history types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AccountId, Tier};

/// Lifecycle of a fulfillment task.
///
/// `Completed` and `Failed` are terminal; a failed attempt below the retry
/// cap cycles back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Outcome of one fulfillment attempt, as recorded in the purchase ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseOutcome {
    Succeeded,
    Failed,
    /// The settlement id was already registered; nothing was charged.
    Duplicate,
}

/// Request body for enqueueing a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseRequest {
    pub account_id: AccountId,
    /// Display name of the purchasing account.
    pub username: String,
    /// Recipient identity the subscription is activated for.
    pub subject: String,
    pub tier: Tier,
}

/// Response after a purchase intent is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueuedTask {
    pub task_id: i64,
}

/// Point-in-time balance, for display only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceView {
    pub account_id: AccountId,
    pub balance: Decimal,
}

/// One purchase ledger row, newest first in history pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseHistoryEntry {
    pub entry_id: String,
    pub subject: String,
    pub tier: Tier,
    pub outcome: PurchaseOutcome,
    /// Amount charged; zero for failed and duplicate attempts.
    pub amount: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

/// A page of purchase history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub page: u32,
    pub entries: Vec<PurchaseHistoryEntry>,
}
