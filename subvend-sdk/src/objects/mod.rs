pub mod admin;
pub mod deposit;
pub mod purchase;
pub mod tier;

use serde::{Deserialize, Serialize};

pub use admin::{AdjustBalanceRequest, UpdateAddressRequest, UpdatePricesRequest};
pub use deposit::{CreateDepositRequest, DepositInstructions, DepositStatus};
pub use purchase::{
    BalanceView, CreatePurchaseRequest, EnqueuedTask, HistoryPage, PurchaseHistoryEntry,
    PurchaseOutcome, TaskStatus,
};
pub use tier::{Tier, TierPrices};

/// Opaque account identity assigned by the chat frontend.
///
/// Accounts are created lazily on first contact and never deleted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for AccountId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}
