pub mod account;
pub mod deposit_order;
pub mod fulfillment_task;
pub mod purchase_ledger;
pub mod settlement_record;

use subvend_sdk::objects::{
    DepositStatus as SdkDepositStatus, PurchaseOutcome as SdkPurchaseOutcome,
    TaskStatus as SdkTaskStatus,
};

/// Deposit order status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see
/// `subvend_sdk::objects::DepositStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum DepositOrderStatus {
    Open,
    Matched,
    Canceled,
}

/// Fulfillment task status for database operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Purchase ledger outcome for database operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum PurchaseOutcome {
    Succeeded,
    Failed,
    Duplicate,
}

impl From<DepositOrderStatus> for SdkDepositStatus {
    fn from(value: DepositOrderStatus) -> Self {
        match value {
            DepositOrderStatus::Open => SdkDepositStatus::Open,
            DepositOrderStatus::Matched => SdkDepositStatus::Matched,
            DepositOrderStatus::Canceled => SdkDepositStatus::Canceled,
        }
    }
}

impl From<TaskStatus> for SdkTaskStatus {
    fn from(value: TaskStatus) -> Self {
        match value {
            TaskStatus::Pending => SdkTaskStatus::Pending,
            TaskStatus::Processing => SdkTaskStatus::Processing,
            TaskStatus::Completed => SdkTaskStatus::Completed,
            TaskStatus::Failed => SdkTaskStatus::Failed,
        }
    }
}

impl From<PurchaseOutcome> for SdkPurchaseOutcome {
    fn from(value: PurchaseOutcome) -> Self {
        match value {
            PurchaseOutcome::Succeeded => SdkPurchaseOutcome::Succeeded,
            PurchaseOutcome::Failed => SdkPurchaseOutcome::Failed,
            PurchaseOutcome::Duplicate => SdkPurchaseOutcome::Duplicate,
        }
    }
}

impl From<SdkPurchaseOutcome> for PurchaseOutcome {
    fn from(value: SdkPurchaseOutcome) -> Self {
        match value {
            SdkPurchaseOutcome::Succeeded => PurchaseOutcome::Succeeded,
            SdkPurchaseOutcome::Failed => PurchaseOutcome::Failed,
            SdkPurchaseOutcome::Duplicate => PurchaseOutcome::Duplicate,
        }
    }
}
